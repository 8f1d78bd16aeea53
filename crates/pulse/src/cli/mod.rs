//! Command-line interface for pulse.
//!
//! This module provides the CLI structure for the `pulse` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CheckinCommand, ConfigCommand, DecodeCommand, OutputFormat, RegisterCommand, RosterCommand,
    ScanCommand, StatusCommand,
};

/// pulse - QR event check-in
///
/// Register operatives as QR badges, scan them in and out of an event, and
/// export the roster as CSV.
#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a QR badge for an operative
    Register(RegisterCommand),

    /// Decode a badge payload
    Decode(DecodeCommand),

    /// Scan badges continuously until stopped
    Scan(ScanCommand),

    /// Process a single decoded badge
    Checkin(CheckinCommand),

    /// View and manage the roster
    #[command(subcommand)]
    Roster(RosterCommand),

    /// Show roster and storage status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "pulse");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;

        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register() {
        let cli = Cli::try_parse_from([
            "pulse", "register", "--name", "Alice", "--company", "G4S", "--license", "L1",
        ])
        .unwrap();
        let Command::Register(cmd) = cli.command else {
            panic!("expected register");
        };
        assert_eq!(cmd.name, "Alice");
        assert_eq!(cmd.license.as_deref(), Some("L1"));
        assert!(cmd.svg.is_none());
    }

    #[test]
    fn test_parse_register_svg_default_name() {
        let cli = Cli::try_parse_from([
            "pulse", "register", "--name", "Alice", "--company", "G4S", "--svg",
        ])
        .unwrap();
        let Command::Register(cmd) = cli.command else {
            panic!("expected register");
        };
        assert_eq!(cmd.svg, Some(PathBuf::from("pulse-qrcode.svg")));
    }

    #[test]
    fn test_parse_scan() {
        let cli =
            Cli::try_parse_from(["pulse", "scan", "--event", "Marathon", "--input", "-"]).unwrap();
        let Command::Scan(cmd) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(cmd.event.as_deref(), Some("Marathon"));
        assert_eq!(cmd.input, Some(PathBuf::from("-")));
        assert!(!cmd.auto_bib);
    }

    #[test]
    fn test_parse_checkin_bib_conflicts_with_auto_bib() {
        let result =
            Cli::try_parse_from(["pulse", "checkin", "abc", "--bib", "7", "--auto-bib"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_roster_list() {
        let cli = Cli::try_parse_from(["pulse", "roster", "list", "--filter", "g4s"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Roster(RosterCommand::List {
                format: OutputFormat::Table,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_roster_remove() {
        let cli =
            Cli::try_parse_from(["pulse", "roster", "remove", "L1", "--code", "1234"]).unwrap();
        let Command::Roster(RosterCommand::Remove { license, code }) = cli.command else {
            panic!("expected roster remove");
        };
        assert_eq!(license, "L1");
        assert_eq!(code.as_deref(), Some("1234"));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["pulse", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(["pulse", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
