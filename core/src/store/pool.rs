//! Bounded connection pool for the SQLite-backed Store (min 2, max 10).
//! Generalizes a single `rusqlite::Connection` to a shared pool: one
//! connection checked out per call, returned to the pool on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, Semaphore};

use crate::error::StoreError;

const MIN_CONNECTIONS: usize = 2;
const MAX_CONNECTIONS: usize = 10;

struct Inner {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
}

/// Bounded pool of rusqlite connections, all opened against the same file in WAL mode.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut idle = Vec::with_capacity(MIN_CONNECTIONS);
        for _ in 0..MIN_CONNECTIONS {
            idle.push(Self::open_connection(&path)?);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                idle: Mutex::new(idle),
                permits: Semaphore::new(MAX_CONNECTIONS),
            }),
        })
    }

    fn open_connection(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        crate::store::schema::create_tables(&conn)?;
        Ok(conn)
    }

    /// Check out a connection, run `f` with it, and return it to the pool.
    /// Blocking SQLite work runs on a blocking thread; suspension only occurs
    /// waiting for a free slot or for `spawn_blocking` to schedule.
    pub async fn with<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::PoolExhausted)?;

        let conn = {
            let mut idle = self.inner.idle.lock().await;
            match idle.pop() {
                Some(c) => c,
                None => Self::open_connection(&self.inner.path)?,
            }
        };

        let result = tokio::task::spawn_blocking(move || {
            let r = f(&conn);
            (conn, r)
        })
        .await;

        let (conn, r) = match result {
            Ok(pair) => pair,
            Err(_) => return Err(StoreError::PoolExhausted),
        };

        self.inner.idle.lock().await.push(conn);
        r
    }
}
