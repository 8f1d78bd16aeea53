//! Scan sources and the scanning session.
//!
//! A [`ScanSource`] produces decoded QR text and pushes it into a bounded
//! channel. A [`session::ScannerSession`] drains that channel one value at a
//! time and feeds each into the check-in state machine.

pub mod session;
pub mod source;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::error::Result;

pub use session::{
    AutoBib, BibPrompt, ConsoleNotifier, FixedBib, LinePrompt, Notifier, ScannerSession,
    SessionStats,
};
pub use source::{CommandSource, LineSource};

/// One decoded QR value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedScan {
    /// The decoded text, untrimmed apart from the line terminator.
    pub text: String,
    /// When the decoder delivered it.
    pub decoded_at: DateTime<Utc>,
}

impl DecodedScan {
    /// Stamp `text` with the current time.
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            decoded_at: Utc::now(),
        }
    }
}

/// Something that produces decoded QR text.
///
/// Implementors acquire their resource in [`start`](Self::start), spawn a
/// task that sends each decoded value through `tx`, and return. The channel
/// closes when the source runs dry or is stopped.
#[async_trait::async_trait]
pub trait ScanSource: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the source currently holds its resource.
    fn is_running(&self) -> bool;

    /// Acquire the resource and begin sending decoded values.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ScanSourceUnavailable`] if the resource cannot
    /// be acquired, or [`crate::Error::ScanSourceBusy`] if already running.
    async fn start(&mut self, tx: mpsc::Sender<DecodedScan>) -> Result<()>;

    /// Release the resource. Calling this when not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource could not be released cleanly, or
    /// if the source failed on its own since it was started.
    async fn stop(&mut self) -> Result<()>;
}

/// Lines of standard input, read on a detached thread.
///
/// A blocking read on a plain thread never holds up runtime shutdown, so a
/// pending stdin read is simply dropped when the process exits.
pub(crate) fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// A cloneable stop signal for a running session.
///
/// Stopping is idempotent.
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    stop_signal: Arc<watch::Sender<bool>>,
}

impl ScannerHandle {
    /// Create a handle that has not been stopped.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stop_signal: Arc::new(tx),
        }
    }

    /// Signal the session to stop.
    pub fn stop(&self) {
        self.stop_signal.send_replace(true);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Wait until the stop signal is sent.
    pub async fn stopped(&self) {
        let mut rx = self.stop_signal.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ScannerHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_handle_new() {
        let handle = ScannerHandle::new();
        assert!(!handle.should_stop());
    }

    #[test]
    fn test_handle_stop_is_idempotent() {
        let handle = ScannerHandle::new();
        handle.stop();
        handle.stop();
        assert!(handle.should_stop());
    }

    #[test]
    fn test_handle_clone_shares_signal() {
        let handle1 = ScannerHandle::new();
        let handle2 = handle1.clone();

        handle1.stop();
        assert!(handle2.should_stop());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let handle = ScannerHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("stopped() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_already_stopped() {
        let handle = ScannerHandle::new();
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), handle.stopped())
            .await
            .expect("stopped() did not resolve");
    }

    #[test]
    fn test_decoded_scan_now() {
        let before = Utc::now();
        let scan = DecodedScan::now("abc");
        assert_eq!(scan.text, "abc");
        assert!(scan.decoded_at >= before);
    }
}
