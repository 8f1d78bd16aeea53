//! Check-in state machine.
//!
//! [`CheckIn::process`] turns one decoded QR string into a [`ScanOutcome`]
//! against a roster. The only roster mutation it performs itself is setting
//! the finish time of an active entry; new sign-ins come back as a
//! [`PendingEntry`] and reach the roster through [`confirm_bib`] once a bib
//! has been chosen.
//!
//! The current time is always passed in, so the debounce window and the
//! minimum-duration gate are fully deterministic.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::payload::IdentityPayload;
use crate::roster::{Entry, Roster};

/// Default debounce window in seconds.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;

/// Default minimum time between sign-in and sign-out in seconds.
pub const DEFAULT_MIN_DURATION_SECS: u64 = 10;

/// Timing policy for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Identical raw text seen again within this window is ignored.
    pub debounce_window: Duration,
    /// Re-scans of an active entry inside this span do not sign it out.
    pub min_duration: Duration,
}

impl ScanPolicy {
    /// Build a policy from whole seconds.
    #[must_use]
    pub fn from_secs(debounce_secs: u64, min_duration_secs: u64) -> Self {
        Self {
            debounce_window: secs(debounce_secs),
            min_duration: secs(min_duration_secs),
        }
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_DEBOUNCE_SECS, DEFAULT_MIN_DURATION_SECS)
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

/// The last raw text the scanner decoded, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastScan {
    /// Raw decoded text.
    pub raw: String,
    /// When it was decoded.
    pub at: DateTime<Utc>,
}

/// A new sign-in waiting for a bib.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    identity: IdentityPayload,
    event: String,
    start_time: DateTime<Utc>,
}

impl PendingEntry {
    /// The scanned identity.
    #[must_use]
    pub fn identity(&self) -> &IdentityPayload {
        &self.identity
    }

    /// Event the candidate is signing in to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Sign-in time, fixed when the code was scanned.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Turn the candidate into a roster entry carrying `bib`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyBib`] if `bib` is blank.
    pub fn confirm(self, bib: &str) -> Result<Entry> {
        let bib = bib.trim();
        if bib.is_empty() {
            return Err(Error::EmptyBib);
        }
        let IdentityPayload {
            name,
            company,
            license,
        } = self.identity;
        Ok(Entry {
            name,
            company,
            license,
            bib: bib.to_string(),
            event: self.event,
            start_time: self.start_time,
            finish_time: None,
        })
    }
}

/// Result of feeding one decoded string to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Same raw text inside the debounce window; nothing happened.
    Debounced,

    /// The payload could not be decoded.
    Rejected {
        /// Why decoding failed.
        reason: String,
    },

    /// Unknown license; waiting for a bib.
    PendingSignIn(PendingEntry),

    /// The license belongs to an entry that already signed out.
    AlreadySignedOut {
        /// Name on the entry.
        name: String,
        /// License on the entry.
        license: String,
    },

    /// The entry signed in less than the minimum duration ago.
    TooSoon {
        /// Name on the entry.
        name: String,
        /// Time since sign-in.
        elapsed: Duration,
    },

    /// The entry has been signed out.
    SignedOut(Entry),
}

impl ScanOutcome {
    /// Whether this outcome changed the roster.
    #[must_use]
    pub fn mutated_roster(&self) -> bool {
        matches!(self, Self::SignedOut(_))
    }

    /// The notice shown to the operator, if any.
    ///
    /// Debounced scans are silent.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        let notice = match self {
            Self::Debounced => return None,
            Self::Rejected { reason } => Notice::error(format!("Invalid QR format: {reason}")),
            Self::PendingSignIn(pending) => Notice::info(format!(
                "New sign-in for {}: assign a bib",
                pending.identity.name
            )),
            Self::AlreadySignedOut { name, .. } => {
                Notice::info(format!("{name} has already signed out"))
            }
            Self::TooSoon { name, elapsed } => Notice::warning(format!(
                "{name} signed in {}s ago, too soon to sign out",
                elapsed.num_seconds()
            )),
            Self::SignedOut(entry) => Notice::success(format!(
                "{} (bib {}) signed out",
                entry.name, entry.bib
            )),
        };
        Some(notice)
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// The action completed.
    Success,
    /// Informational; nothing went wrong.
    Info,
    /// The scan was refused by a business rule.
    Warning,
    /// The scan or action failed.
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text shown to the operator.
    pub message: String,
}

impl Notice {
    /// Create a notice with the given level.
    #[must_use]
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Create a success notice.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    /// Create an info notice.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    /// Create a warning notice.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    /// Create an error notice.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// The scan-processing state machine.
///
/// Holds the timing policy and the debounce memory. The roster is passed in
/// on every call.
#[derive(Debug, Clone, Default)]
pub struct CheckIn {
    policy: ScanPolicy,
    last_scan: Option<LastScan>,
}

impl CheckIn {
    /// Create a state machine with an empty debounce memory.
    #[must_use]
    pub fn new(policy: ScanPolicy) -> Self {
        Self {
            policy,
            last_scan: None,
        }
    }

    /// Create a state machine resuming from a remembered scan.
    #[must_use]
    pub fn with_last_scan(policy: ScanPolicy, last_scan: Option<LastScan>) -> Self {
        Self { policy, last_scan }
    }

    /// The timing policy.
    #[must_use]
    pub fn policy(&self) -> ScanPolicy {
        self.policy
    }

    /// The debounce memory.
    #[must_use]
    pub fn last_scan(&self) -> Option<&LastScan> {
        self.last_scan.as_ref()
    }

    /// Process one decoded string.
    pub fn process(
        &mut self,
        raw: &str,
        event: &str,
        now: DateTime<Utc>,
        roster: &mut Roster,
    ) -> ScanOutcome {
        if let Some(last) = &self.last_scan {
            if last.raw == raw && now - last.at < self.policy.debounce_window {
                debug!("Debounced repeat scan");
                return ScanOutcome::Debounced;
            }
        }
        self.last_scan = Some(LastScan {
            raw: raw.to_string(),
            at: now,
        });

        let identity = match IdentityPayload::decode(raw) {
            Ok(identity) => identity,
            Err(Error::MalformedPayload { reason }) => {
                debug!(%reason, "Rejected scan");
                return ScanOutcome::Rejected { reason };
            }
            Err(e) => {
                return ScanOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        let Some(entry) = roster.find_by_license_mut(&identity.license) else {
            debug!(license = %identity.license, "Unknown license, awaiting bib");
            return ScanOutcome::PendingSignIn(PendingEntry {
                identity,
                event: event.to_string(),
                start_time: now,
            });
        };

        if !entry.is_active() {
            return ScanOutcome::AlreadySignedOut {
                name: entry.name.clone(),
                license: entry.license.clone(),
            };
        }

        let elapsed = now - entry.start_time;
        if elapsed < self.policy.min_duration {
            return ScanOutcome::TooSoon {
                name: entry.name.clone(),
                elapsed,
            };
        }

        entry.finish_time = Some(now);
        info!(license = %entry.license, bib = %entry.bib, "Signed out {}", entry.name);
        ScanOutcome::SignedOut(entry.clone())
    }
}

/// Append a pending sign-in to the roster with the chosen bib.
///
/// # Errors
///
/// Returns [`Error::EmptyBib`] for a blank bib, or [`Error::AlreadyActive`]
/// if the license gained an active entry since the scan.
pub fn confirm_bib<'a>(
    roster: &'a mut Roster,
    pending: PendingEntry,
    bib: &str,
) -> Result<&'a Entry> {
    if roster.has_active(&pending.identity.license) {
        return Err(Error::AlreadyActive {
            license: pending.identity.license,
        });
    }
    let entry = pending.confirm(bib)?;
    info!(
        license = %entry.license,
        bib = %entry.bib,
        event = %entry.event,
        "Signed in {}",
        entry.name
    );
    Ok(roster.push(entry))
}
