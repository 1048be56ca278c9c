//! `DuckDB` connection handling for the blob store.
//!
//! One database file is opened once per [`ConnectionPool`]; checkouts are
//! cheap clones of that handle, so every connection sees the same instance.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ::duckdb::Connection;

struct Shared {
    db_path: PathBuf,
    max_idle: usize,
    root: Mutex<Option<Connection>>,
    idle: Mutex<Vec<Connection>>,
}

/// Lazily opened database with a bounded stack of idle connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                db_path: path.into(),
                max_idle: max_idle.max(1),
                root: Mutex::new(None),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Reuses an idle connection or clones a new one from the root handle,
    /// opening the database file on first use.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        if let Some(connection) = lock(&self.shared.idle).pop() {
            return Ok(self.wrap(connection));
        }

        let mut root = lock(&self.shared.root);
        let connection = match root.as_ref() {
            Some(existing) => existing.try_clone()?,
            None => {
                let opened = Connection::open(&self.shared.db_path)?;
                opened.execute_batch("PRAGMA disable_progress_bar;")?;
                let clone = opened.try_clone()?;
                *root = Some(opened);
                clone
            }
        };
        Ok(self.wrap(connection))
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.shared.db_path
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        lock(&self.shared.idle).len()
    }

    fn wrap(&self, connection: Connection) -> PooledConnection {
        PooledConnection {
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
        }
    }
}

/// Checked-out connection; returned to the idle stack on drop while there is room.
pub struct PooledConnection {
    shared: Arc<Shared>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the connection out.
        self.connection
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let mut idle = lock(&self.shared.idle);
            if idle.len() < self.shared.max_idle {
                idle.push(connection);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
