//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Register command arguments.
#[derive(Debug, Args)]
pub struct RegisterCommand {
    /// Full name of the operative
    #[arg(short, long)]
    pub name: String,

    /// Company (a preset name or any other company)
    #[arg(long)]
    pub company: String,

    /// License number; omit if the operative has none
    #[arg(short, long)]
    pub license: Option<String>,

    /// Write the QR code as SVG (defaults to pulse-qrcode.svg when given without a value)
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = crate::registration::DEFAULT_BADGE_FILE_NAME)]
    pub svg: Option<PathBuf>,

    /// Print only the encoded payload
    #[arg(long)]
    pub payload_only: bool,
}

/// Decode command arguments.
#[derive(Debug, Args)]
pub struct DecodeCommand {
    /// The encoded payload, as read from a QR code
    pub payload: String,
}

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Event name stamped on new entries (defaults to the last event used)
    #[arg(short, long)]
    pub event: Option<String>,

    /// Read decoded payloads from a file, or "-" for stdin, instead of the decoder
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Assign the suggested bib without prompting
    #[arg(long)]
    pub auto_bib: bool,
}

/// Checkin command arguments.
#[derive(Debug, Args)]
pub struct CheckinCommand {
    /// The encoded payload, as read from a QR code
    pub payload: String,

    /// Event name stamped on a new entry (defaults to the last event used)
    #[arg(short, long)]
    pub event: Option<String>,

    /// Bib for a new sign-in
    #[arg(short, long, conflicts_with = "auto_bib")]
    pub bib: Option<String>,

    /// Assign the suggested bib for a new sign-in
    #[arg(long)]
    pub auto_bib: bool,
}

/// Roster commands.
#[derive(Debug, Subcommand)]
pub enum RosterCommand {
    /// List roster entries
    List {
        /// Only show entries whose name, company or license contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Export the roster as CSV
    Export {
        /// Output file (defaults to pulse-<event>-<date>.csv in the export directory)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Access code (prompted for if omitted)
        #[arg(long)]
        code: Option<String>,
    },

    /// Remove one entry by license
    Remove {
        /// License of the entry to remove
        license: String,

        /// Access code (prompted for if omitted)
        #[arg(long)]
        code: Option<String>,
    },

    /// Clear the whole roster
    Reset {
        /// Access code (prompted for if omitted)
        #[arg(long)]
        code: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_roster_command_debug() {
        let cmd = RosterCommand::Reset {
            code: None,
            yes: true,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Reset"));
        assert!(debug_str.contains("yes"));
    }

    #[test]
    fn test_checkin_command_debug() {
        let cmd = CheckinCommand {
            payload: "abc".to_string(),
            event: Some("Marathon".to_string()),
            bib: None,
            auto_bib: true,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Marathon"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_output_format_debug() {
        assert_eq!(format!("{:?}", OutputFormat::Json), "Json");
    }
}
