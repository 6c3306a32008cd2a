//! SQLite persistence for the alert decision core.
//!
//! [`PagerStore`] knows where the database lives and opens a connection for
//! every call, so concurrent callers never queue on an in-process lock.
//! Reads go through [`PagerStore::read`]; anything that mutates shared state
//! (rate-limit counters, group membership, escalation timers) goes through
//! [`PagerStore::unit_of_work`], which runs the closure inside an `IMMEDIATE`
//! transaction and transparently retries when another writer holds the
//! database lock. Calls block; async callers run them on a blocking pool.
//!
//! The per-entity queries live on [`StoreView`], split across the `store`
//! modules.

pub mod codec;
pub mod error;
mod schema;
pub mod store;


use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use error::{Result, StorageError, TransientError};
pub use store::StoreView;

/// Attempts made for a unit of work before a busy database is reported.
const MAX_UNIT_ATTEMPTS: u32 = 5;
/// Backoff step between attempts; attempt `n` waits `n * BUSY_BACKOFF`.
const BUSY_BACKOFF: Duration = Duration::from_millis(25);
/// How long SQLite itself waits on a lock before reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

enum Location {
    File(PathBuf),
    /// Shared-cache URI of a named in-memory database
    Memory(String),
}

pub struct PagerStore {
    location: Location,
    /// Holds a shared in-memory database open between calls. Never used for
    /// queries.
    _keepalive: Option<Mutex<Connection>>,
}

impl PagerStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::InvalidValue {
                column: "data_dir",
                value: format!("{}: {e}", parent.display()),
            })?;
        }
        let store = Self {
            location: Location::File(path.to_path_buf()),
            _keepalive: None,
        };
        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::apply(&conn)?;
        tracing::info!(path = %path.display(), "Opened pager store");
        Ok(store)
    }

    /// A private database that lives as long as the store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:oxpager-mem-{}-{seq}?mode=memory&cache=shared",
            std::process::id()
        );
        let mut store = Self {
            location: Location::Memory(uri),
            _keepalive: None,
        };
        let conn = store.connect()?;
        schema::apply(&conn)?;
        store._keepalive = Some(Mutex::new(conn));
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = match &self.location {
            Location::File(path) => Connection::open_with_flags(path, flags)?,
            Location::Memory(uri) => Connection::open_with_flags(uri, flags)?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Runs read-only queries outside a transaction.
    pub fn read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreView<'_>) -> Result<R>,
    {
        let conn = self.connect()?;
        f(&StoreView::new(&conn))
    }

    /// Runs `f` atomically: either every write it makes is committed or none
    /// is. Busy/locked conflicts are retried up to a fixed number of attempts,
    /// so `f` may run more than once and must not have effects outside the
    /// store.
    pub fn unit_of_work<F, R, E>(&self, mut f: F) -> std::result::Result<R, E>
    where
        F: FnMut(&StoreView<'_>) -> std::result::Result<R, E>,
        E: From<StorageError> + TransientError,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_unit(&mut f) {
                Err(e) if e.is_transient() => {
                    if attempt >= MAX_UNIT_ATTEMPTS {
                        tracing::warn!(attempts = attempt, "Unit of work gave up on busy database");
                        return Err(StorageError::Busy { attempts: attempt }.into());
                    }
                    tracing::debug!(attempt, "Database busy, retrying unit of work");
                    std::thread::sleep(BUSY_BACKOFF * attempt);
                }
                other => return other,
            }
        }
    }

    fn try_unit<F, R, E>(&self, f: &mut F) -> std::result::Result<R, E>
    where
        F: FnMut(&StoreView<'_>) -> std::result::Result<R, E>,
        E: From<StorageError>,
    {
        let mut conn = self.connect().map_err(E::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let out = f(&StoreView::new(&tx))?;
        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }
}
