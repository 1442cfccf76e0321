use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::batch;
use crate::classify::{StatementKind, classify};
use crate::command::{Command, Statement};
use crate::error::DispatchError;
use crate::lifecycle;
use crate::options::OpenOptions;
use crate::registry::Ack;

/// The worker's connection slot. Shared only so the emergency `close_all`
/// path can close the connection out-of-band on the caller's thread; every
/// other access happens on the worker's own thread.
pub(crate) type SharedConnection = Arc<Mutex<Option<Connection>>>;

pub(crate) fn lock_connection(slot: &SharedConnection) -> MutexGuard<'_, Option<Connection>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle held in the registry map: the queue's producer side plus the shared
/// connection slot.
pub(crate) struct WorkerHandle {
    pub(crate) sender: UnboundedSender<Command>,
    pub(crate) connection: SharedConnection,
}

/// One worker per open database: owns the connection and drains the FIFO
/// queue on a dedicated thread.
///
/// Lifecycle: Opening (run the connection open, reply to the open caller) →
/// Serving (blocking-dequeue loop) → Closing (on a Close command) →
/// Terminated (thread exits, pending commands are discarded unanswered).
pub(crate) struct Worker {
    name: String,
    path: PathBuf,
    key: Option<String>,
    options: OpenOptions,
    connection: SharedConnection,
    workers: Arc<DashMap<String, WorkerHandle>>,
}

impl Worker {
    /// Build the worker and its registry handle without starting the thread.
    ///
    /// The handle must be registered under the database name before
    /// [`Worker::start`] runs: the worker deregisters itself on open failure,
    /// and that removal has to find the entry in place.
    pub(crate) fn prepare(
        name: String,
        path: PathBuf,
        key: Option<String>,
        options: OpenOptions,
        workers: Arc<DashMap<String, WorkerHandle>>,
    ) -> (WorkerHandle, Worker, UnboundedReceiver<Command>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection: SharedConnection = Arc::new(Mutex::new(None));
        let worker = Worker {
            name,
            path,
            key,
            options,
            connection: Arc::clone(&connection),
            workers,
        };
        (WorkerHandle { sender, connection }, worker, receiver)
    }

    /// Spawn the dedicated thread.
    ///
    /// The open acknowledgment arrives through `open_reply` once the
    /// connection actually opens; an open failure makes the worker remove
    /// itself from the registry before replying and exit without serving.
    pub(crate) fn start(
        self,
        receiver: UnboundedReceiver<Command>,
        open_reply: oneshot::Sender<Result<Ack, DispatchError>>,
    ) -> Result<(), DispatchError> {
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("sqlite-dispatch-{name}"))
            .spawn(move || self.run(receiver, open_reply))
            .map_err(|err| {
                DispatchError::OpenFailure(format!("failed to spawn worker thread: {err}"))
            })?;
        Ok(())
    }

    fn run(
        self,
        mut receiver: UnboundedReceiver<Command>,
        open_reply: oneshot::Sender<Result<Ack, DispatchError>>,
    ) {
        // Opening
        let conn = match lifecycle::open_database(
            &self.path,
            self.key.as_deref(),
            self.options.template.as_deref(),
            self.options.read_only,
            false,
        ) {
            Ok(conn) => conn,
            Err(err) => {
                error!(db = %self.name, error = %err, "open failed, stopping worker");
                self.workers.remove(&self.name);
                let _ = open_reply.send(Err(err));
                return;
            }
        };
        *lock_connection(&self.connection) = Some(conn);
        let _ = open_reply.send(Ok(Ack::Opened));
        debug!(db = %self.name, "database open, serving");

        // Serving
        while let Some(command) = receiver.blocking_recv() {
            match command {
                Command::Batch {
                    statements,
                    respond_to,
                } => {
                    let results = {
                        let slot = lock_connection(&self.connection);
                        batch::run_batch(slot.as_ref(), &statements)
                    };
                    let cycle = self.options.lock_workaround && lone_commit(&statements);
                    let _ = respond_to.send(results);

                    if cycle {
                        if let Err(err) = self.cycle_connection() {
                            error!(db = %self.name, error = %err, "connection cycle failed, stopping worker");
                            self.workers.remove(&self.name);
                            return;
                        }
                    }
                }
                Command::Close { delete, respond_to } => {
                    // Closing
                    let _ = respond_to.send(self.close(delete));
                    return; // Terminated
                }
                Command::Stop => return, // Terminated
            }
        }
    }

    /// Close the connection, deregister, and optionally delete the files.
    /// Deregistration happens before the reply so a racing open on the same
    /// name can never find a stale entry.
    fn close(&self, delete: bool) -> Result<Ack, DispatchError> {
        debug!(db = %self.name, delete, "closing database");
        let close_result = {
            let mut slot = lock_connection(&self.connection);
            match slot.take() {
                Some(conn) => conn.close().map_err(|(_, err)| err),
                None => Ok(()), // already closed out-of-band
            }
        };
        self.workers.remove(&self.name);

        if let Err(err) = close_result {
            return Err(DispatchError::CloseFailure(err.to_string()));
        }
        if delete {
            if lifecycle::delete_database_files(&self.path) {
                Ok(Ack::Removed)
            } else {
                Err(DispatchError::DeleteFailure)
            }
        } else {
            Ok(Ack::Removed)
        }
    }

    /// Close and immediately reopen the connection between dequeues. Scoped
    /// mitigation for a platform file-locking defect triggered by a lone
    /// COMMIT; runs synchronously on the worker thread so queue order holds.
    fn cycle_connection(&self) -> Result<(), DispatchError> {
        debug!(db = %self.name, "cycling connection after lone COMMIT");
        let mut slot = lock_connection(&self.connection);
        if let Some(conn) = slot.take() {
            if let Err((conn, err)) = conn.close() {
                warn!(db = %self.name, error = %err, "close during connection cycle failed");
                *slot = Some(conn);
            }
        }
        if slot.is_some() {
            // The old handle refused to close; reopening would double-open.
            return Err(DispatchError::DatabaseAlreadyOpen);
        }
        let conn = lifecycle::open_database(&self.path, self.key.as_deref(), None, false, false)?;
        *slot = Some(conn);
        Ok(())
    }
}

/// The workaround condition: a batch that is exactly one statement, and that
/// statement is a commit.
fn lone_commit(statements: &[Statement]) -> bool {
    statements.len() == 1 && classify(&statements[0].sql) == StatementKind::Commit
}

#[cfg(test)]
mod tests {
    use super::lone_commit;
    use crate::command::Statement;

    #[test]
    fn lone_commit_matches_only_single_commit_batches() {
        assert!(lone_commit(&[Statement::new("1", "COMMIT")]));
        assert!(lone_commit(&[Statement::new("1", "  commit  ")]));
        assert!(!lone_commit(&[Statement::new("1", "BEGIN")]));
        assert!(!lone_commit(&[
            Statement::new("1", "INSERT INTO t VALUES (1)"),
            Statement::new("2", "COMMIT"),
        ]));
        assert!(!lone_commit(&[]));
    }
}
