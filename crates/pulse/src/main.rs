//! `pulse` - CLI for QR event check-in
//!
//! This binary registers operatives as QR badges, runs the scanner, and
//! manages the stored roster.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use tracing::{info, warn};

use pulse::cli::{
    CheckinCommand, Cli, Command, ConfigCommand, OutputFormat, RegisterCommand, RosterCommand,
    ScanCommand,
};
use pulse::export::{default_file_name, export_csv};
use pulse::scanner::{
    AutoBib, BibPrompt, CommandSource, ConsoleNotifier, FixedBib, LinePrompt, LineSource,
    Notifier,
};
use pulse::{
    init_logging, AccessGate, Badge, Config, Entry, Error, GuardedAction, IdentityPayload, Notice,
    RegistrationForm, RosterStore, ScanSource, ScannerHandle, ScannerSession, Storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Register(cmd) => handle_register(&config, cmd),
        Command::Decode(cmd) => handle_decode(&cmd.payload),
        Command::Scan(cmd) => handle_scan(&config, cmd).await,
        Command::Checkin(cmd) => handle_checkin(&config, cmd).await,
        Command::Roster(cmd) => handle_roster(&config, cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open roster at {}", path.display()))
}

/// Read one line from stdin after printing `message`.
fn prompt_line(message: &str) -> anyhow::Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn access_code(code: Option<String>) -> anyhow::Result<String> {
    match code {
        Some(code) => Ok(code),
        None => prompt_line("Access code: "),
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn handle_register(config: &Config, cmd: RegisterCommand) -> anyhow::Result<()> {
    let form = RegistrationForm {
        name: cmd.name,
        company: cmd.company,
        license: cmd.license,
    };
    let payload = form.into_payload(&config.registration.companies)?;
    let badge = Badge::generate(payload)?;

    if cmd.payload_only {
        println!("{}", badge.encoded());
        return Ok(());
    }

    println!("{}", badge.terminal());
    println!("Name:     {}", badge.payload().name);
    println!("Company:  {}", badge.payload().company);
    println!("License:  {}", badge.payload().license);
    println!("Payload:  {}", badge.encoded());

    if let Some(path) = cmd.svg {
        badge.save_svg(&path)?;
        println!(
            "{}",
            Notice::success(format!("QR code saved to {}", path.display()))
        );
    }
    Ok(())
}

fn handle_decode(payload: &str) -> anyhow::Result<()> {
    let identity = IdentityPayload::decode(payload)?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

/// Open a session for the named event, or the last event used.
fn open_session(
    config: &Config,
    event: Option<String>,
) -> anyhow::Result<ScannerSession<Storage>> {
    let storage = open_storage(config)?;
    let event = match event {
        Some(event) => event,
        None => storage.active_event()?.unwrap_or_default(),
    };
    let last_scan = storage.last_scan()?;

    let session = match ScannerSession::open(storage, &event, config.scan_policy()) {
        Ok(session) => session,
        Err(Error::MissingField { field: "event" }) => {
            bail!("enter an event name with --event before scanning")
        }
        Err(e) => return Err(e.into()),
    };
    session.store().set_active_event(session.event())?;
    if let Some(notice) = session.foreign_entries_notice() {
        ConsoleNotifier.notify(&notice);
    }
    Ok(session
        .with_last_scan(last_scan)
        .with_bib_start(config.scanner.bib_start))
}

async fn handle_scan(config: &Config, cmd: ScanCommand) -> anyhow::Result<()> {
    let mut session = open_session(config, cmd.event)?;

    let reading_stdin = cmd.input.as_deref() == Some(Path::new("-"));
    let mut source: Box<dyn ScanSource> = match cmd.input {
        Some(_) if reading_stdin => Box::new(LineSource::stdin()),
        Some(path) => Box::new(LineSource::file(path)),
        None => Box::new(CommandSource::new(&config.scanner.decoder_command)?),
    };
    let mut prompt: Box<dyn BibPrompt> = if cmd.auto_bib {
        Box::new(AutoBib)
    } else if reading_stdin {
        warn!("Scans are read from stdin, assigning suggested bibs");
        Box::new(AutoBib)
    } else {
        Box::new(LinePrompt::stdin())
    };

    let handle = ScannerHandle::new();
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            ctrl_c.stop();
        }
    });

    let result = session
        .run(
            source.as_mut(),
            prompt.as_mut(),
            &mut ConsoleNotifier,
            &handle,
            config.scanner.channel_capacity,
        )
        .await;
    let saved = session.store().save_last_scan(session.last_scan());
    let stats = result?;
    saved?;

    println!(
        "{} scans: {} signed in, {} signed out, {} refused, {} rejected",
        stats.scans, stats.signed_in, stats.signed_out, stats.refused, stats.rejected
    );
    Ok(())
}

async fn handle_checkin(config: &Config, cmd: CheckinCommand) -> anyhow::Result<()> {
    let mut session = open_session(config, cmd.event)?;

    let mut prompt: Box<dyn BibPrompt> = match (cmd.bib, cmd.auto_bib) {
        (Some(bib), _) => Box::new(FixedBib(bib)),
        (None, true) => Box::new(AutoBib),
        (None, false) => Box::new(LinePrompt::stdin()),
    };

    let notice = session
        .handle_scan(&cmd.payload, Utc::now(), prompt.as_mut())
        .await?;
    session.store().save_last_scan(session.last_scan())?;

    match notice {
        Some(notice) => println!("{notice}"),
        None => info!("Repeat scan ignored"),
    }
    Ok(())
}

fn handle_roster(config: &Config, cmd: RosterCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let gate = AccessGate::new(config.admin.access_code.as_str());

    match cmd {
        RosterCommand::List { filter, format } => {
            let roster = storage.load_roster()?;
            let entries = roster.filter(filter.as_deref().unwrap_or(""));
            print_entries(&entries, format)?;
        }
        RosterCommand::Export { out, code } => {
            gate.authorize(GuardedAction::ExportCsv, &access_code(code)?)?;
            let roster = storage.load_roster()?;
            let path = match out {
                Some(path) => path,
                None => config.export_dir().join(default_file_name(
                    storage.active_event()?.as_deref(),
                    Utc::now(),
                )),
            };
            let outcome = export_csv(&roster, &path)?;
            println!("{}", outcome.notice());
        }
        RosterCommand::Remove { license, code } => {
            gate.authorize(GuardedAction::RemoveEntry, &access_code(code)?)?;
            let mut roster = storage.load_roster()?;
            let entry = roster
                .remove(&license)
                .ok_or(Error::EntryNotFound { license })?;
            storage.save_roster(&roster)?;
            info!(license = %entry.license, "Removed entry for {}", entry.name);
            println!(
                "{}",
                Notice::success(format!("Removed {} (bib {})", entry.name, entry.bib))
            );
        }
        RosterCommand::Reset { code, yes } => {
            gate.authorize(GuardedAction::ResetRoster, &access_code(code)?)?;
            let mut roster = storage.load_roster()?;
            if !yes {
                let answer = prompt_line(&format!(
                    "Remove all {} entries? This cannot be undone [y/N]: ",
                    roster.len()
                ))?;
                if !answer.eq_ignore_ascii_case("y") && !answer.eq_ignore_ascii_case("yes") {
                    println!("{}", Notice::info("Reset cancelled"));
                    return Ok(());
                }
            }
            let removed = roster.clear();
            storage.save_roster(&roster)?;
            storage.save_last_scan(None)?;
            info!(removed, "Roster reset");
            println!(
                "{}",
                Notice::success(format!("Roster cleared ({removed} entries removed)"))
            );
        }
    }
    Ok(())
}

fn print_entries(entries: &[&Entry], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No entries");
        return Ok(());
    }

    match format {
        OutputFormat::Plain => {
            for entry in entries {
                let finish = entry
                    .finish_time
                    .map_or_else(|| "active".to_string(), local_time);
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    entry.bib,
                    entry.name,
                    entry.company,
                    entry.license,
                    entry.event,
                    local_time(entry.start_time),
                    finish
                );
            }
        }
        OutputFormat::Table | OutputFormat::Json => {
            let name_width = entries
                .iter()
                .map(|e| e.name.chars().count())
                .max()
                .unwrap_or(0)
                .max(4);
            let company_width = entries
                .iter()
                .map(|e| e.company.chars().count())
                .max()
                .unwrap_or(0)
                .max(7);
            println!(
                "{:<6} {:<name_width$} {:<company_width$} {:<12} {:<19} {:<19}",
                "Bib", "Name", "Company", "License", "Start", "Finish"
            );
            for entry in entries {
                let finish = entry.finish_time.map_or_else(String::new, local_time);
                println!(
                    "{:<6} {:<name_width$} {:<company_width$} {:<12} {:<19} {:<19}",
                    entry.bib,
                    entry.name,
                    entry.company,
                    entry.license,
                    local_time(entry.start_time),
                    finish
                );
            }
            println!();
            println!("{} entries", entries.len());
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("pulse status");
        println!("------------");
        println!("Database:      {}", storage.path().display());
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!(
            "Active event:  {}",
            stats.active_event.as_deref().unwrap_or("(none)")
        );
        println!("Entries:       {}", stats.roster.total);
        println!("  Active:      {}", stats.roster.active);
        println!("  Finished:    {}", stats.roster.finished);
        if let Some(updated) = stats.roster_updated_at {
            println!("Last change:   {}", local_time(updated));
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Scanner]");
                println!("  Debounce (s):       {}", config.scanner.debounce_secs);
                println!("  Min duration (s):   {}", config.scanner.min_duration_secs);
                println!(
                    "  Decoder command:    {}",
                    config.scanner.decoder_command.join(" ")
                );
                println!("  Bib start:          {}", config.scanner.bib_start);
                println!();
                println!("[Registration]");
                println!(
                    "  Companies:          {}",
                    config.registration.companies.join(", ")
                );
                println!();
                println!("[Export]");
                println!("  Directory:          {}", config.export_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
