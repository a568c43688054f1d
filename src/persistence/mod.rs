//! The persistence layer (spec.md §4.1): a transactional row store with
//! three relations, accessed only through prepared, parameterized
//! statements. Paths are always bound as opaque text; content and
//! signatures are always bound as blobs; nothing is ever interpolated.

pub mod file_segments;
pub mod file_system;
pub mod file_versions;
mod schema;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::CoreResult;

/// The sentinel written for an unsigned segment's `signature` column
/// (spec.md §6: "the literal 4-byte ASCII" marker). Kept internal to the
/// persistence layer — every other layer works with `Option<Vec<u8>>`.
pub(crate) const NONE_SENTINEL: &[u8] = b"NONE";

/// Owns the single `rusqlite::Connection` for the process (spec.md §5:
/// "exactly one persistence handle per process"). `rusqlite::Connection` is
/// not `Sync`, so a `Mutex` makes the handle shareable across the FUSE
/// session's worker threads; every operation holds it only for the
/// duration of its own statement(s) or transaction.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(database_path: &str) -> rusqlite::Result<Store> {
        let conn = Connection::open(database_path)?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory store, used by tests and by `Store::open`'s own
    /// schema bootstrap path.
    pub fn open_in_memory() -> rusqlite::Result<Store> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    /// Runs `f` with direct access to the connection, outside of any
    /// transaction. Used for single-statement reads and writes that don't
    /// need to cross an invariant atomically.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> CoreResult<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Runs `f` inside a single SQLite transaction (spec.md §4.1: "all
    /// mutating statements must be usable inside an ambient transaction
    /// scope opened by the caller"). Every multi-statement operation that
    /// crosses an invariant — promotion, truncation, rmdir's subtree
    /// delete, rename — goes through this.
    pub fn with_txn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        let result = f(&txn)?;
        txn.commit()?;
        Ok(result)
    }
}

/// Ensures a bare path never collides with the staging-key mangling scheme
/// (spec I7 / spec.md §9's Open Question on `.segtemp`). Any caller
/// creating a new path must check this before inserting.
pub fn rejects_staging_collision(path: &str) -> bool {
    path.ends_with(crate::models::STAGING_SUFFIX)
}
