use thiserror::Error;

/// Errors surfaced through the command interface.
///
/// Failures local to one statement never appear here; they are reported inline
/// in that statement's result slot. Everything that escalates to the command
/// or connection level uses this enum.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A command was routed to a name with no live worker.
    #[error("database not open")]
    DatabaseNotOpen,

    /// An open was attempted while a connection was already in place.
    #[error("database already open")]
    DatabaseAlreadyOpen,

    /// The engine rejected the connection, after the one-shot migration retry.
    #[error("can't open database: {0}")]
    OpenFailure(String),

    /// A command could not be enqueued, or the worker stopped before replying.
    #[error("{0}")]
    QueueFailure(String),

    /// The worker's connection failed to close. The worker still removes
    /// itself from the registry so the name stays usable.
    #[error("couldn't close database: {0}")]
    CloseFailure(String),

    /// The backing file(s) could not be removed.
    #[error("couldn't delete database")]
    DeleteFailure,
}
