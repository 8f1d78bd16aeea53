//! Storage layer for pulse.
//!
//! Persisted state lives in a small `SQLite` key-value table. The roster is
//! stored as one JSON array under [`ROSTER_KEY`], loaded once when a session
//! opens and rewritten after every roster mutation.
//!
//! Sessions only see the [`RosterStore`] trait, so tests can swap in
//! [`MemoryStore`].

pub mod migrations;
pub mod schema;

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::checkin::LastScan;
use crate::error::{Error, Result};
use crate::roster::{Roster, RosterStats};

/// Key holding the JSON-serialized roster array.
pub const ROSTER_KEY: &str = "pulse.roster";

/// Key holding the last event name used for scanning.
pub const ACTIVE_EVENT_KEY: &str = "pulse.active_event";

/// Key holding the debounce memory between one-shot check-ins.
pub const LAST_SCAN_KEY: &str = "pulse.last_scan";

/// Load/save collaborator for the roster.
pub trait RosterStore {
    /// Load the persisted roster, or an empty one if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored roster cannot be read or parsed.
    fn load_roster(&self) -> Result<Roster>;

    /// Replace the persisted roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the roster cannot be written.
    fn save_roster(&self, roster: &Roster) -> Result<()>;
}

/// `SQLite`-backed key-value store.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete `key`. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, &serde_json::to_string(value)?)
    }

    /// The event name used by the last scanning session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn active_event(&self) -> Result<Option<String>> {
        self.get(ACTIVE_EVENT_KEY)
    }

    /// Remember `event` as the active event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_active_event(&self, event: &str) -> Result<()> {
        self.put(ACTIVE_EVENT_KEY, event)
    }

    /// The debounce memory saved by the last one-shot check-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be read or parsed.
    pub fn last_scan(&self) -> Result<Option<LastScan>> {
        self.load_json(LAST_SCAN_KEY)
    }

    /// Save or clear the debounce memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn save_last_scan(&self, last_scan: Option<&LastScan>) -> Result<()> {
        match last_scan {
            Some(last) => self.save_json(LAST_SCAN_KEY, last),
            None => self.delete(LAST_SCAN_KEY).map(|_| ()),
        }
    }

    /// When the roster was last written.
    fn roster_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let updated: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM kv_store WHERE key = ?1",
                [ROSTER_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Get storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let roster = self.load_roster()?.stats();
        let active_event = self.active_event()?;
        let roster_updated_at = self.roster_updated_at()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            roster,
            active_event,
            roster_updated_at,
            db_size_bytes,
        })
    }
}

impl RosterStore for Storage {
    fn load_roster(&self) -> Result<Roster> {
        let roster: Roster = self.load_json(ROSTER_KEY)?.unwrap_or_default();
        debug!("Loaded roster with {} entries", roster.len());
        Ok(roster)
    }

    fn save_roster(&self, roster: &Roster) -> Result<()> {
        self.save_json(ROSTER_KEY, roster)?;
        debug!("Saved roster with {} entries", roster.len());
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Counts over the persisted roster.
    pub roster: RosterStats,
    /// Last event name used for scanning.
    pub active_event: Option<String>,
    /// When the roster was last written.
    pub roster_updated_at: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// In-process roster store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    roster: RefCell<Roster>,
    saves: Cell<usize>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `roster`.
    #[must_use]
    pub fn with_roster(roster: Roster) -> Self {
        Self {
            roster: RefCell::new(roster),
            saves: Cell::new(0),
        }
    }

    /// Number of times the roster has been saved.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    /// A copy of the stored roster.
    #[must_use]
    pub fn snapshot(&self) -> Roster {
        self.roster.borrow().clone()
    }
}

impl RosterStore for MemoryStore {
    fn load_roster(&self) -> Result<Roster> {
        Ok(self.snapshot())
    }

    fn save_roster(&self, roster: &Roster) -> Result<()> {
        self.roster.replace(roster.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::tests::entry;
    use chrono::TimeZone;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_put_get_delete() {
        let storage = create_test_storage();
        assert!(storage.get("k").unwrap().is_none());

        storage.put("k", "one").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("one"));

        storage.put("k", "two").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("two"));

        assert!(storage.delete("k").unwrap());
        assert!(!storage.delete("k").unwrap());
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn test_load_roster_when_empty() {
        let storage = create_test_storage();
        assert!(storage.load_roster().unwrap().is_empty());
    }

    #[test]
    fn test_roster_persisted_as_json_array() {
        let storage = create_test_storage();
        let roster = Roster::from_entries(vec![
            entry("Alice", "G4S", "L1", "101"),
            entry("Bob", "Noonan", "L2", "102"),
        ]);

        storage.save_roster(&roster).unwrap();

        let raw = storage.get(ROSTER_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["license"], "L2");

        assert_eq!(storage.load_roster().unwrap(), roster);
    }

    #[test]
    fn test_corrupt_roster_is_an_error() {
        let storage = create_test_storage();
        storage.put(ROSTER_KEY, "{not json").unwrap();

        let err = storage.load_roster().unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_active_event() {
        let storage = create_test_storage();
        assert!(storage.active_event().unwrap().is_none());

        storage.set_active_event("City Marathon").unwrap();
        assert_eq!(
            storage.active_event().unwrap().as_deref(),
            Some("City Marathon")
        );
    }

    #[test]
    fn test_last_scan_round_trip() {
        let storage = create_test_storage();
        let last = LastScan {
            raw: "abc".to_string(),
            at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        };

        storage.save_last_scan(Some(&last)).unwrap();
        assert_eq!(storage.last_scan().unwrap(), Some(last));

        storage.save_last_scan(None).unwrap();
        assert!(storage.last_scan().unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let empty = storage.stats().unwrap();
        assert_eq!(empty.roster.total, 0);
        assert!(empty.roster_updated_at.is_none());
        assert_eq!(empty.db_size_bytes, 0);

        let mut alice = entry("Alice", "G4S", "L1", "101");
        alice.finish_time = Some(alice.start_time + chrono::Duration::minutes(5));
        let roster = Roster::from_entries(vec![alice, entry("Bob", "Noonan", "L2", "102")]);
        storage.save_roster(&roster).unwrap();
        storage.set_active_event("Marathon").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.roster.total, 2);
        assert_eq!(stats.roster.active, 1);
        assert_eq!(stats.roster.finished, 1);
        assert_eq!(stats.active_event.as_deref(), Some("Marathon"));
        assert!(stats.roster_updated_at.is_some());
    }

    #[test]
    fn test_open_file_based() {
        let db_path = std::env::temp_dir().join(format!("pulse_test_{}.db", std::process::id()));

        let storage = Storage::open(&db_path).unwrap();
        storage
            .save_roster(&Roster::from_entries(vec![entry("A", "B", "L", "1")]))
            .unwrap();
        assert_eq!(storage.path(), db_path);
        drop(storage);

        let reopened = Storage::open(&db_path).unwrap();
        assert_eq!(reopened.load_roster().unwrap().len(), 1);
        assert!(reopened.stats().unwrap().db_size_bytes > 0);

        drop(reopened);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let root = std::env::temp_dir().join(format!("pulse_test_dir_{}", std::process::id()));
        let nested_path = root.join("nested").join("roster.db");
        let _ = std::fs::remove_dir_all(&root);

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());

        drop(storage);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load_roster().unwrap().is_empty());

        let roster = Roster::from_entries(vec![entry("Alice", "G4S", "L1", "101")]);
        store.save_roster(&roster).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load_roster().unwrap(), roster);
    }
}
