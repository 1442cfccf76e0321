use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::command::{Command, Statement};
use crate::error::DispatchError;
use crate::options::OpenOptions;
use crate::results::StatementResult;
use crate::worker::{Worker, WorkerHandle, lock_connection};

/// Acknowledgment delivered for open/close/delete commands.
///
/// `Display` yields the boundary-contract phrase for each outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// An open found a live worker and left it untouched.
    Started,
    /// A fresh open actually opened the connection.
    Opened,
    /// A close targeted a name that was never opened.
    Closed,
    /// A worker closed (and possibly deleted) its database and terminated.
    Removed,
    /// A registry-level delete removed the backing files.
    Deleted,
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ack::Started => "database started",
            Ack::Opened => "database open",
            Ack::Closed => "database closed",
            Ack::Removed => "database removed",
            Ack::Deleted => "database deleted",
        })
    }
}

/// Directory of live database workers: name → worker, at most one worker per
/// name.
///
/// Owns the routing of every command. Create one at process start and keep it
/// for the process lifetime; databases live under `data_dir`, one regular
/// file per name.
///
/// ```rust,no_run
/// use sqlite_dispatch::{OpenOptions, Registry, Statement};
///
/// # async fn demo() -> Result<(), sqlite_dispatch::DispatchError> {
/// let registry = Registry::new("/var/lib/myapp/databases");
/// registry.open("app.db", None, OpenOptions::default()).await?;
/// let results = registry
///     .execute_batch("app.db", vec![Statement::new("1", "CREATE TABLE t (x)")])
///     .await?;
/// # let _ = results;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    data_dir: PathBuf,
    workers: Arc<DashMap<String, WorkerHandle>>,
}

impl Registry {
    /// Create an empty registry storing databases under `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            workers: Arc::new(DashMap::new()),
        }
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Open the named database, starting its worker.
    ///
    /// Idempotent: a name with a live worker acks immediately without
    /// touching the existing connection. Otherwise the worker thread is
    /// started and the acknowledgment arrives once the connection actually
    /// opens.
    ///
    /// # Errors
    /// Returns [`DispatchError::OpenFailure`] when the engine rejects the
    /// connection (after the one-shot cipher-migration retry).
    pub async fn open(
        &self,
        name: &str,
        key: Option<&str>,
        options: OpenOptions,
    ) -> Result<Ack, DispatchError> {
        let (open_reply, opened) = oneshot::channel();
        let (worker, receiver) = match self.workers.entry(name.to_owned()) {
            Entry::Occupied(_) => {
                // Re-open of a live worker: ack without touching the
                // existing connection.
                return Ok(Ack::Started);
            }
            Entry::Vacant(entry) => {
                let (handle, worker, receiver) = Worker::prepare(
                    name.to_owned(),
                    self.database_path(name),
                    key.map(str::to_owned),
                    options,
                    Arc::clone(&self.workers),
                );
                // Registered before the thread starts, so the worker's own
                // deregistration on open failure always finds the entry.
                entry.insert(handle);
                (worker, receiver)
            }
        };

        if let Err(err) = worker.start(receiver, open_reply) {
            self.workers.remove(name);
            return Err(err);
        }

        match opened.await {
            Ok(ack) => ack,
            Err(_) => Err(DispatchError::OpenFailure(
                "database worker exited before opening".to_owned(),
            )),
        }
    }

    /// Execute a batch of statements on the named database, in order, with
    /// one result per statement.
    ///
    /// # Errors
    /// Returns [`DispatchError::DatabaseNotOpen`] when no worker exists for
    /// `name` (the batch is never queued), or [`DispatchError::QueueFailure`]
    /// when the command cannot be enqueued or the worker stops before
    /// replying. Statement-level failures are reported inline in the result
    /// list, never here.
    pub async fn execute_batch(
        &self,
        name: &str,
        statements: Vec<Statement>,
    ) -> Result<Vec<StatementResult>, DispatchError> {
        let sender = self.sender_for(name)?;
        let (respond_to, results) = oneshot::channel();
        sender
            .send(Command::Batch {
                statements,
                respond_to,
            })
            .map_err(|_| DispatchError::QueueFailure("couldn't add to queue".to_owned()))?;
        results.await.map_err(|_| {
            DispatchError::QueueFailure("database worker stopped before replying".to_owned())
        })
    }

    /// Close the named database.
    ///
    /// A name with no live worker acks "database closed" immediately;
    /// otherwise the close is queued behind every previously submitted
    /// command and the worker terminates after processing it.
    ///
    /// # Errors
    /// Returns [`DispatchError::CloseFailure`] when the connection fails to
    /// close (the worker still deregisters itself), or
    /// [`DispatchError::QueueFailure`] when the close cannot be enqueued.
    pub async fn close(&self, name: &str) -> Result<Ack, DispatchError> {
        match self.sender_for(name) {
            Err(_) => Ok(Ack::Closed),
            Ok(sender) => self.close_worker(&sender, false).await,
        }
    }

    /// Delete the named database.
    ///
    /// With a live worker the database is first closed in queue order, then
    /// its files are removed. Without one the files are removed directly and
    /// the outcome is purely the filesystem's.
    ///
    /// # Errors
    /// Returns [`DispatchError::DeleteFailure`] when the backing file could
    /// not be removed, plus the same failures as [`Registry::close`].
    pub async fn delete(&self, name: &str) -> Result<Ack, DispatchError> {
        match self.sender_for(name) {
            Err(_) => {
                if crate::lifecycle::delete_database_files(&self.database_path(name)) {
                    Ok(Ack::Deleted)
                } else {
                    Err(DispatchError::DeleteFailure)
                }
            }
            Ok(sender) => self.close_worker(&sender, true).await,
        }
    }

    async fn close_worker(
        &self,
        sender: &UnboundedSender<Command>,
        delete: bool,
    ) -> Result<Ack, DispatchError> {
        let (respond_to, closed) = oneshot::channel();
        sender
            .send(Command::Close { delete, respond_to })
            .map_err(|_| DispatchError::QueueFailure("couldn't add to queue".to_owned()))?;
        closed.await.map_err(|_| {
            DispatchError::CloseFailure("database worker stopped before replying".to_owned())
        })?
    }

    /// Emergency shutdown of every open database.
    ///
    /// Closes each connection out-of-band on the caller's thread, then
    /// enqueues a Stop so the worker thread exits cleanly, and removes the
    /// entry. This is the one documented exception to "only the worker
    /// touches its connection"; callers must not submit new batches
    /// concurrently with it.
    pub fn close_all(&self) {
        let names: Vec<String> = self.workers.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            {
                let Some(handle) = self.workers.get(&name) else {
                    continue;
                };
                debug!(db = %name, "closing database out-of-band");
                {
                    let mut slot = lock_connection(&handle.connection);
                    if let Some(conn) = slot.take() {
                        if let Err((_, err)) = conn.close() {
                            error!(db = %name, error = %err, "couldn't close database");
                        }
                    }
                }
                if handle.sender.send(Command::Stop).is_err() {
                    error!(db = %name, "couldn't stop worker thread");
                }
            }
            self.workers.remove(&name);
        }
    }

    /// Diagnostic no-op: hand the value straight back.
    #[must_use]
    pub fn echo(&self, value: serde_json::Value) -> serde_json::Value {
        value
    }

    fn sender_for(&self, name: &str) -> Result<UnboundedSender<Command>, DispatchError> {
        self.workers
            .get(name)
            .map(|handle| handle.sender.clone())
            .ok_or(DispatchError::DatabaseNotOpen)
    }
}
