//! Owns the database handle and the connection lifecycle.
//!
//! A [`Store`] is either an *owning* handle, opened directly from a path or
//! in memory, or a *borrowing* handle built from another `Store`'s
//! connection. Owning handles close the connection on [`Store::close`] (and
//! every call after that returns an error); borrowing handles never close it.
//! This is explicit at construction time, never inferred later.

use crate::error::{Result, StoreError};
use crate::schema::{self, DEFAULT_EMBEDDING_DIMENSION};
use rusqlite::{ffi::sqlite3_auto_extension, Connection};
use sqlite_vec::sqlite3_vec_init;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers the `sqlite-vec` extension with SQLite's auto-extension
/// mechanism. Process-wide and idempotent; must run before any connection
/// opens a `vec0` virtual table.
///
/// # Safety
///
/// The `transmute` converts `sqlite3_vec_init`'s function pointer to the
/// signature `sqlite3_auto_extension` expects. This is sound because:
/// 1. `sqlite3_vec_init` is the extension entry point exported by the
///    `sqlite-vec` crate with the exact C ABI SQLite's extension loader calls.
/// 2. `Once::call_once` guarantees registration happens exactly once per
///    process, so there is no risk of double-registration.
/// 3. `sqlite3_auto_extension` is documented as safe to call before any
///    connection is opened, which every public constructor here guarantees.
fn init_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| {
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut std::os::raw::c_char,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> std::os::raw::c_int,
            >(sqlite3_vec_init as *const ())));
        }
        tracing::debug!("sqlite-vec extension registered");
    });
}

fn apply_connection_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// The storage engine's database handle.
pub struct Store {
    conn: Arc<Mutex<Option<Connection>>>,
    db_path: PathBuf,
    owns_handle: bool,
    embedding_dimension: usize,
}

impl Store {
    /// Opens (creating if necessary) a database file at `path`, owning the
    /// resulting handle.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_dimension(path, DEFAULT_EMBEDDING_DIMENSION)
    }

    pub fn open_with_dimension(path: &Path, embedding_dimension: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        apply_connection_pragmas(&conn)?;
        schema::migrate(&conn, embedding_dimension)?;
        let embedding_dimension = schema::read_embedding_dimension(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            db_path: path.to_path_buf(),
            owns_handle: true,
            embedding_dimension,
        })
    }

    /// Opens an in-memory database, owning the resulting handle. Used by
    /// tests and by short-lived callers that don't need persistence.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_dimension(DEFAULT_EMBEDDING_DIMENSION)
    }

    pub fn open_in_memory_with_dimension(embedding_dimension: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        apply_connection_pragmas(&conn)?;
        schema::migrate(&conn, embedding_dimension)?;
        let embedding_dimension = schema::read_embedding_dimension(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            db_path: PathBuf::from(":memory:"),
            owns_handle: true,
            embedding_dimension,
        })
    }

    /// Builds a new `Store` that borrows `other`'s connection: it shares the
    /// same underlying handle but never closes it, regardless of how many
    /// borrowing `Store`s exist or are dropped.
    pub fn new_with_handle(other: &Store) -> Self {
        Self {
            conn: Arc::clone(&other.conn),
            db_path: other.db_path.clone(),
            owns_handle: false,
            embedding_dimension: other.embedding_dimension,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    pub fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Closes the connection if this handle owns it; a no-op for borrowing
    /// handles. After a successful close on an owning handle, every
    /// subsequent call on `self` (and on any `Store` borrowing from it)
    /// returns an error.
    pub fn close(&self) -> Result<()> {
        if !self.owns_handle {
            return Ok(());
        }
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        }
        Ok(())
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let conn = guard.as_ref().ok_or_else(|| {
            StoreError::Io(io::Error::other("database handle is closed"))
        })?;
        f(conn)
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` / `COMMIT` transaction, rolling
    /// back on any error so the store never commits a partial update.
    pub(crate) fn with_txn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE;")?;
            match f(conn) {
                Ok(value) => {
                    conn.execute_batch("COMMIT;")?;
                    Ok(value)
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK;");
                    Err(e)
                }
            }
        })
    }
}
