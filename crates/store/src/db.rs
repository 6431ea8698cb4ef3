use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use sa_domain::config::StoreConfig;
use sa_domain::{Error, Result};

use crate::schema;

/// Translate a rusqlite error into the shared `Error` type, classifying
/// constraint violations so callers can match on kind rather than parse
/// the SQLite message.
pub fn map_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(sqlite_err, msg) => {
            use rusqlite::ErrorCode::*;
            match sqlite_err.code {
                ConstraintViolation => {
                    let text = msg.clone().unwrap_or_default();
                    if text.contains("UNIQUE") {
                        Error::Conflict(text)
                    } else if text.contains("FOREIGN KEY") {
                        Error::InvalidInput(format!("referenced row does not exist: {text}"))
                    } else {
                        Error::InvalidInput(text)
                    }
                }
                _ => Error::Db(e.to_string()),
            }
        }
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("no matching row".into()),
        _ => Error::Db(e.to_string()),
    }
}

/// The single authoritative database for every entity in §3.
///
/// Holds one physical `rusqlite::Connection` behind a mutex: rusqlite
/// connections are `!Sync`, and a single connection is also exactly the
/// "ultimate serializer" §5 asks for. Every public operation on the
/// per-entity stores below runs inside `with_conn`/`with_tx`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the database at `config.db_path`, or a
    /// shared in-memory database when the path is `:memory:`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = if config.db_path.as_os_str() == ":memory:" {
            Connection::open_in_memory().map_err(map_err)?
        } else {
            if let Some(parent) = config.db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(&config.db_path).map_err(map_err)?
        };
        Self::from_connection(conn)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(map_err)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_err)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection, inside a
    /// transaction. A returned `Err` rolls back; `Ok` commits. This is
    /// the atomicity guarantee every public store operation relies on
    /// (§4.1: "each public operation is atomic").
    pub fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let tx = guard.transaction().map_err(map_err)?;
        let result = f(&tx)?;
        tx.commit().map_err(map_err)?;
        Ok(result)
    }

    /// Run `f` with shared (read-only in intent) access. Still takes the
    /// same lock as writers: a single connection has no concurrent
    /// readers of its own, but readers never block progress for long —
    /// every statement here is an indexed point lookup or bounded scan.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        f(&guard)
    }
}
