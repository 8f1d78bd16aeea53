//! CSV export of the roster.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::checkin::{Notice, NoticeLevel};
use crate::error::{Error, Result};
use crate::roster::Roster;

/// Column headers, in output order.
pub const CSV_HEADER: [&str; 7] = [
    "Name",
    "Company",
    "License",
    "Bib",
    "Event",
    "Start Time",
    "Finish Time",
];

/// What an export call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The roster was empty; no file was produced.
    Empty,
    /// The roster was written.
    Written {
        /// File that was written.
        path: PathBuf,
        /// Number of data rows.
        rows: usize,
    },
}

impl ExportOutcome {
    /// The notice shown to the operator.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::Empty => Notice::info("No entries to export"),
            Self::Written { path, rows } => Notice::new(
                NoticeLevel::Success,
                format!("Exported {rows} entries to {}", path.display()),
            ),
        }
    }
}

/// Write the roster as CSV to `writer`, one row per entry in roster order.
///
/// Timestamps are RFC 3339; a missing finish time is an empty cell.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(roster: &Roster, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for entry in roster.entries() {
        let start = entry.start_time.to_rfc3339();
        let finish = entry
            .finish_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        csv.write_record([
            entry.name.as_str(),
            entry.company.as_str(),
            entry.license.as_str(),
            entry.bib.as_str(),
            entry.event.as_str(),
            start.as_str(),
            finish.as_str(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Render the roster as a CSV string.
///
/// # Errors
///
/// Returns an error if the CSV writer fails.
pub fn to_csv_string(roster: &Roster) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(roster, &mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::internal(format!("CSV output is not UTF-8: {e}")))
}

/// Export the roster to `path`.
///
/// An empty roster produces no file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn export_csv(roster: &Roster, path: impl AsRef<Path>) -> Result<ExportOutcome> {
    if roster.is_empty() {
        return Ok(ExportOutcome::Empty);
    }

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let file = std::fs::File::create(path)?;
    write_csv(roster, std::io::BufWriter::new(file))?;

    info!("Exported {} entries to {}", roster.len(), path.display());
    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        rows: roster.len(),
    })
}

/// File name for an export taken at `now`, e.g. `pulse-city-marathon-2026-05-01.csv`.
#[must_use]
pub fn default_file_name(event: Option<&str>, now: DateTime<Utc>) -> String {
    let slug: String = event
        .unwrap_or("roster")
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "roster" } else { &slug };
    format!("pulse-{slug}-{}.csv", now.format("%Y-%m-%d"))
}
