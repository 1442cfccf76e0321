//! Asynchronous command dispatch over a named set of on-disk `SQLite`
//! databases.
//!
//! Every open database gets exactly one worker: a dedicated thread owning the
//! connection, fed by a FIFO command queue. All operations against one
//! database execute strictly in submission order; different databases proceed
//! fully in parallel. Transaction boundaries (`BEGIN`/`COMMIT`/`ROLLBACK`)
//! are first-class queue items, and a per-database option masks a platform
//! file-locking defect by cycling the connection after a lone-COMMIT batch
//! without disturbing queue order.
//!
//! The entry point is [`Registry`]: open a database by name, submit
//! [`Statement`] batches, and get one [`StatementResult`] per statement, in
//! input order, with per-statement failures isolated to their own slot.
//!
//! ```rust,no_run
//! use sqlite_dispatch::{OpenOptions, Registry, Statement, Value};
//!
//! # async fn demo() -> Result<(), sqlite_dispatch::DispatchError> {
//! let registry = Registry::new("./databases");
//! registry.open("app.db", None, OpenOptions::default()).await?;
//! registry
//!     .execute_batch("app.db", vec![Statement::new("1", "CREATE TABLE t (x)")])
//!     .await?;
//! let results = registry
//!     .execute_batch(
//!         "app.db",
//!         vec![Statement::with_params(
//!             "2",
//!             "INSERT INTO t VALUES (?)",
//!             vec![Value::Integer(42)],
//!         )],
//!     )
//!     .await?;
//! assert!(!results[0].is_failure());
//! # Ok(())
//! # }
//! ```

mod batch;
mod classify;
mod command;
mod error;
mod lifecycle;
mod options;
mod registry;
mod results;
mod value;
mod worker;

pub use classify::{StatementKind, classify};
pub use command::Statement;
pub use error::DispatchError;
pub use options::OpenOptions;
pub use registry::{Ack, Registry};
pub use results::{Row, StatementOutcome, StatementResult};
pub use value::Value;
