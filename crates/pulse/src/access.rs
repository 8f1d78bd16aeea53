//! Access code gate for destructive roster actions.
//!
//! The code is compared in-process against a configured constant. It keeps
//! casual users away from reset/remove/export and is not a security control.

use tracing::warn;

use crate::error::{Error, Result};

/// Access code used when none is configured.
pub const DEFAULT_ACCESS_CODE: &str = "1234";

/// Actions that require the access code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction {
    /// Remove a single roster entry.
    RemoveEntry,
    /// Clear the whole roster.
    ResetRoster,
    /// Export the roster to CSV.
    ExportCsv,
}

impl std::fmt::Display for GuardedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoveEntry => write!(f, "entry removal"),
            Self::ResetRoster => write!(f, "roster reset"),
            Self::ExportCsv => write!(f, "CSV export"),
        }
    }
}

/// Check whether `code` is a 4-digit access code.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Compares entered codes against the configured one.
#[derive(Debug, Clone)]
pub struct AccessGate {
    code: String,
}

impl AccessGate {
    /// Create a gate for `code`.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Allow `action` if `attempt` matches the code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessDenied`] if the code does not match.
    pub fn authorize(&self, action: GuardedAction, attempt: &str) -> Result<()> {
        if attempt.trim() == self.code {
            Ok(())
        } else {
            warn!(%action, "Incorrect access code");
            Err(Error::AccessDenied {
                action: action.to_string(),
            })
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_CODE)
    }
}
