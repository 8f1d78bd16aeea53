//! The scanning session.
//!
//! A [`ScannerSession`] owns the roster for one event. It loads the roster
//! once when opened, runs every decoded value through the state machine,
//! asks a [`BibPrompt`] for a bib on each new sign-in and writes the roster
//! back after every mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{stdin_lines, ScanSource, ScannerHandle};
use crate::checkin::{confirm_bib, CheckIn, LastScan, Notice, PendingEntry, ScanOutcome, ScanPolicy};
use crate::error::{Error, Result};
use crate::roster::Roster;
use crate::storage::RosterStore;

/// Chooses the bib for a pending sign-in.
#[async_trait::async_trait]
pub trait BibPrompt: Send {
    /// Return the bib to assign, or `None` to abandon the sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt's input fails.
    async fn request_bib(
        &mut self,
        pending: &PendingEntry,
        suggestion: &str,
    ) -> Result<Option<String>>;
}

/// Prompts for a bib on a line-oriented input.
///
/// An empty answer takes the suggestion; `-`, `skip` or end of input abandons
/// the sign-in. A pending answer is cancelled by dropping the
/// [`request_bib`](BibPrompt::request_bib) future.
#[derive(Debug)]
pub struct LinePrompt {
    lines: mpsc::Receiver<String>,
}

impl LinePrompt {
    /// Prompt on standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            lines: stdin_lines(),
        }
    }

    /// Prompt on any buffered reader. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
        Self { lines: rx }
    }
}

#[async_trait::async_trait]
impl BibPrompt for LinePrompt {
    async fn request_bib(
        &mut self,
        pending: &PendingEntry,
        suggestion: &str,
    ) -> Result<Option<String>> {
        let identity = pending.identity();
        print!(
            "Bib for {} ({}, license {}) [{suggestion}]: ",
            identity.name, identity.company, identity.license
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = self.lines.recv().await else {
            return Ok(None);
        };
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(Some(suggestion.to_string()));
        }
        if answer == "-" || answer.eq_ignore_ascii_case("skip") {
            return Ok(None);
        }
        Ok(Some(answer.to_string()))
    }
}

/// Always accepts the suggested bib.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoBib;

#[async_trait::async_trait]
impl BibPrompt for AutoBib {
    async fn request_bib(
        &mut self,
        _pending: &PendingEntry,
        suggestion: &str,
    ) -> Result<Option<String>> {
        Ok(Some(suggestion.to_string()))
    }
}

/// Always answers with the same bib.
#[derive(Debug, Clone)]
pub struct FixedBib(
    /// The bib to assign.
    pub String,
);

#[async_trait::async_trait]
impl BibPrompt for FixedBib {
    async fn request_bib(
        &mut self,
        _pending: &PendingEntry,
        _suggestion: &str,
    ) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Receives the notices a session produces.
pub trait Notifier: Send {
    /// Show one notice.
    fn notify(&mut self, notice: &Notice);
}

/// Prints notices to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, notice: &Notice) {
        println!("{notice}");
    }
}

impl Notifier for Vec<Notice> {
    fn notify(&mut self, notice: &Notice) {
        self.push(notice.clone());
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Decoded values received.
    pub scans: u64,
    /// Repeats ignored inside the debounce window.
    pub debounced: u64,
    /// Payloads that failed to decode.
    pub rejected: u64,
    /// New entries appended.
    pub signed_in: u64,
    /// Entries signed out.
    pub signed_out: u64,
    /// Too-soon and already-signed-out scans.
    pub refused: u64,
    /// Pending sign-ins that never got a bib.
    pub abandoned: u64,
}

/// One scanning session for one event.
#[derive(Debug)]
pub struct ScannerSession<S> {
    store: S,
    event: String,
    roster: Roster,
    checkin: CheckIn,
    bib_start: u32,
    stats: SessionStats,
}

impl<S: RosterStore> ScannerSession<S> {
    /// Open a session, loading the roster from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if `event` is blank, or a storage
    /// error if the roster cannot be loaded.
    pub fn open(store: S, event: &str, policy: ScanPolicy) -> Result<Self> {
        let event = event.trim();
        if event.is_empty() {
            return Err(Error::MissingField { field: "event" });
        }
        let roster = store.load_roster()?;
        debug!(event, entries = roster.len(), "Session opened");
        Ok(Self {
            store,
            event: event.to_string(),
            roster,
            checkin: CheckIn::new(policy),
            bib_start: 1,
            stats: SessionStats::default(),
        })
    }

    /// Resume the debounce memory from an earlier run.
    #[must_use]
    pub fn with_last_scan(mut self, last_scan: Option<LastScan>) -> Self {
        self.checkin = CheckIn::with_last_scan(self.checkin.policy(), last_scan);
        self
    }

    /// Set the bib suggested for an empty roster.
    #[must_use]
    pub fn with_bib_start(mut self, bib_start: u32) -> Self {
        self.bib_start = bib_start;
        self
    }

    /// The event name new entries are stamped with.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The in-memory roster.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The debounce memory.
    #[must_use]
    pub fn last_scan(&self) -> Option<&LastScan> {
        self.checkin.last_scan()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A warning when the roster holds entries stamped with another event.
    ///
    /// Lookups span the whole roster, so a badge signed out at an earlier
    /// event scans as "already signed out" until the roster is reset.
    #[must_use]
    pub fn foreign_entries_notice(&self) -> Option<Notice> {
        let foreign = self
            .roster
            .entries()
            .iter()
            .filter(|entry| entry.event != self.event)
            .count();
        if foreign == 0 {
            return None;
        }
        debug!(event = %self.event, foreign, "Roster holds entries from other events");
        Some(Notice::warning(format!(
            "The roster holds {foreign} entr{} from other events. \
             Export and reset it before scanning for {}",
            if foreign == 1 { "y" } else { "ies" },
            self.event
        )))
    }

    /// Process one decoded value at `now`.
    ///
    /// Returns the notice to show, or `None` for a debounced repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the bib prompt fails or the roster cannot be
    /// saved. Rejected scans are notices, not errors.
    pub async fn handle_scan<P>(
        &mut self,
        raw: &str,
        now: DateTime<Utc>,
        prompt: &mut P,
    ) -> Result<Option<Notice>>
    where
        P: BibPrompt + ?Sized,
    {
        self.stats.scans += 1;
        let outcome = self.checkin.process(raw, &self.event, now, &mut self.roster);

        if let ScanOutcome::PendingSignIn(pending) = outcome {
            return self.sign_in(pending, prompt).await.map(Some);
        }

        match &outcome {
            ScanOutcome::Debounced => self.stats.debounced += 1,
            ScanOutcome::Rejected { reason } => {
                warn!(%reason, "Rejected scan");
                self.stats.rejected += 1;
            }
            ScanOutcome::TooSoon { .. } | ScanOutcome::AlreadySignedOut { .. } => {
                self.stats.refused += 1;
            }
            ScanOutcome::SignedOut(_) => {
                self.stats.signed_out += 1;
                self.store.save_roster(&self.roster)?;
            }
            ScanOutcome::PendingSignIn(_) => {}
        }
        Ok(outcome.notice())
    }

    async fn sign_in<P>(&mut self, pending: PendingEntry, prompt: &mut P) -> Result<Notice>
    where
        P: BibPrompt + ?Sized,
    {
        let suggestion = self.roster.suggest_bib(self.bib_start);
        let name = pending.identity().name.clone();

        let Some(bib) = prompt.request_bib(&pending, &suggestion).await? else {
            info!("Sign-in for {name} abandoned");
            self.stats.abandoned += 1;
            return Ok(Notice::info(format!("Sign-in for {name} cancelled")));
        };

        let notice = match confirm_bib(&mut self.roster, pending, &bib) {
            Ok(entry) => Notice::success(format!(
                "{} signed in with bib {}",
                entry.name, entry.bib
            )),
            Err(e @ (Error::EmptyBib | Error::AlreadyActive { .. })) => {
                warn!(error = %e, "Sign-in for {name} refused");
                self.stats.abandoned += 1;
                return Ok(Notice::error(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        self.stats.signed_in += 1;
        self.store.save_roster(&self.roster)?;
        Ok(notice)
    }

    /// Drain `source` until it runs dry or `handle` is stopped.
    ///
    /// The source is always stopped before returning. A clean run closes with
    /// a "Scanner stopped" notice.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot start, if it fails while
    /// running (reported when it is stopped), or if a scan fails with an
    /// error (see [`handle_scan`](Self::handle_scan)). A scan error wins
    /// over a source error.
    pub async fn run<Src, P, N>(
        &mut self,
        source: &mut Src,
        prompt: &mut P,
        notifier: &mut N,
        handle: &ScannerHandle,
        capacity: usize,
    ) -> Result<SessionStats>
    where
        Src: ScanSource + ?Sized,
        P: BibPrompt + ?Sized,
        N: Notifier + ?Sized,
    {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        source.start(tx).await?;
        info!(event = %self.event, source = source.name(), "Scanner started");
        notifier.notify(&Notice::info(format!("Scanning for {}", self.event)));

        let result = loop {
            let scan = tokio::select! {
                biased;
                () = handle.stopped() => break Ok(()),
                scan = rx.recv() => scan,
            };
            let Some(scan) = scan else {
                break Ok(());
            };

            // A stop while waiting on the bib prompt abandons the sign-in.
            let handled = tokio::select! {
                biased;
                () = handle.stopped() => break Ok(()),
                handled = self.handle_scan(&scan.text, scan.decoded_at, prompt) => handled,
            };
            match handled {
                Ok(Some(notice)) => notifier.notify(&notice),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };

        let stopped = source.stop().await;
        result.and(stopped)?;
        info!(event = %self.event, scans = self.stats.scans, "Scanner stopped");
        notifier.notify(&Notice::info("Scanner stopped"));
        Ok(self.stats)
    }
}
