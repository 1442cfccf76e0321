use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::DispatchError;
use crate::registry::Ack;
use crate::results::StatementResult;
use crate::value::Value;

/// One SQL statement of a batch: the text, an opaque caller-chosen id echoed
/// back with the result, and positional parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Statement {
    /// Create a statement with no parameters.
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with positional parameters.
    pub fn with_params(
        id: impl Into<String>,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            params,
        }
    }
}

/// A unit of work queued to a database worker.
///
/// Each `Batch`/`Close` carries exactly one reply channel; the oneshot sender
/// is consumed on reply, so a channel can never be reused.
pub(crate) enum Command {
    Batch {
        statements: Vec<Statement>,
        respond_to: oneshot::Sender<Vec<StatementResult>>,
    },
    Close {
        delete: bool,
        respond_to: oneshot::Sender<Result<Ack, DispatchError>>,
    },
    Stop,
}
