//! `pulse` - QR-based event check-in
//!
//! Operatives register through a form that encodes their identity into a QR
//! badge. A scanner session decodes badges and runs each one through the
//! check-in state machine, which signs people in (with a bib) and out of an
//! event. The roster can be filtered, exported as CSV and managed behind a
//! 4-digit access code.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod access;
pub mod checkin;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod payload;
pub mod registration;
pub mod roster;
pub mod scanner;
pub mod storage;

pub use access::{AccessGate, GuardedAction};
pub use checkin::{CheckIn, Notice, NoticeLevel, PendingEntry, ScanOutcome, ScanPolicy};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use payload::IdentityPayload;
pub use registration::{Badge, RegistrationForm};
pub use roster::{Entry, Roster};
pub use scanner::{ScanSource, ScannerHandle, ScannerSession};
pub use storage::{RosterStore, Storage, StorageStats};
