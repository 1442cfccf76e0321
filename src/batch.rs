use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::{Connection, ToSql};
use tracing::debug;

use crate::classify::{StatementKind, classify};
use crate::command::Statement;
use crate::results::{Row, StatementOutcome, StatementResult};
use crate::value::Value;

pub(crate) const CLOSED_MESSAGE: &str = "database has been closed";

/// Run a batch of statements against one connection, producing exactly one
/// result per statement, in input order.
///
/// A statement that fails engine-side gets a `Failure` in its slot and the
/// batch continues; a single statement never aborts the rest. With no live
/// connection the whole batch resolves to per-statement failures without any
/// binding attempted.
pub(crate) fn run_batch(conn: Option<&Connection>, statements: &[Statement]) -> Vec<StatementResult> {
    let Some(conn) = conn else {
        return statements
            .iter()
            .map(|statement| {
                StatementResult::new(
                    statement.id.clone(),
                    StatementOutcome::Failure {
                        message: CLOSED_MESSAGE.to_owned(),
                    },
                )
            })
            .collect();
    };

    statements
        .iter()
        .map(|statement| StatementResult::new(statement.id.clone(), run_statement(conn, statement)))
        .collect()
}

fn run_statement(conn: &Connection, statement: &Statement) -> StatementOutcome {
    let outcome = match classify(&statement.sql) {
        StatementKind::Update | StatementKind::Delete => execute_dml(conn, statement),
        StatementKind::Insert => execute_insert(conn, statement),
        StatementKind::Begin => transaction_control(conn, "BEGIN"),
        StatementKind::Commit => transaction_control(conn, "COMMIT"),
        StatementKind::Rollback => transaction_control(conn, "ROLLBACK"),
        StatementKind::Select | StatementKind::Other => execute_query(conn, statement),
    };

    match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            debug!(sql = %statement.sql, error = %err, "statement failed");
            StatementOutcome::Failure {
                message: err.to_string(),
            }
        }
    }
}

/// UPDATE/DELETE: prepared, parameter-bound execution returning the affected
/// count, no result materialization.
fn execute_dml(conn: &Connection, statement: &Statement) -> Result<StatementOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let params = engine_params(&statement.params);
    let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let rows_affected = stmt.execute(&refs[..])?;
    Ok(StatementOutcome::Affected { rows_affected })
}

/// INSERT: prepared execution reporting the new rowid. A statement that
/// inserted nothing reports a plain zero-affected result instead.
fn execute_insert(
    conn: &Connection,
    statement: &Statement,
) -> Result<StatementOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let params = engine_params(&statement.params);
    let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let rows_affected = stmt.execute(&refs[..])?;
    if rows_affected > 0 {
        Ok(StatementOutcome::Inserted {
            insert_id: conn.last_insert_rowid(),
            rows_affected: 1,
        })
    } else {
        Ok(StatementOutcome::Affected { rows_affected: 0 })
    }
}

/// BEGIN/COMMIT/ROLLBACK go straight to the engine's transaction statements;
/// transaction state is connection-global, so they must run on the same
/// connection the rest of the queue uses.
fn transaction_control(conn: &Connection, op: &str) -> Result<StatementOutcome, rusqlite::Error> {
    conn.execute_batch(op)?;
    Ok(StatementOutcome::Ack)
}

/// Everything else, SELECT included: raw parameterized query, cursor iterated
/// to completion, one column-name map per row.
fn execute_query(
    conn: &Connection,
    statement: &Statement,
) -> Result<StatementOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let columns: Arc<Vec<String>> = Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let params = engine_params(&statement.params);
    let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();

    let mut rows = stmt.query(&refs[..])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(column_value(row, idx)?);
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(StatementOutcome::Rows(out))
}

fn engine_params(params: &[Value]) -> Vec<rusqlite::types::Value> {
    params.iter().map(Value::to_engine).collect()
}

/// Convert one column by its runtime type tag; blobs come back as Base64
/// text, keeping the value model free of a binary variant.
fn column_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value, rusqlite::Error> {
    let value: rusqlite::types::Value = row.get(idx)?;
    Ok(match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Integer(i),
        rusqlite::types::Value::Real(f) => Value::Real(f),
        rusqlite::types::Value::Text(s) => Value::Text(s),
        rusqlite::types::Value::Blob(bytes) => Value::Text(BASE64.encode(bytes)),
    })
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::run_batch;
    use crate::command::Statement;
    use crate::results::StatementOutcome;
    use crate::value::Value;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory database");
        conn.execute_batch("CREATE TABLE t (x, y)").expect("schema");
        conn
    }

    #[test]
    fn failing_statement_does_not_abort_the_batch() {
        let conn = memory_db();
        let statements = vec![
            Statement::with_params("1", "INSERT INTO t (x) VALUES (?)", vec![Value::Integer(1)]),
            Statement::new("2", "INSERT INTO missing VALUES (1)"),
            Statement::with_params("3", "INSERT INTO t (x) VALUES (?)", vec![Value::Integer(2)]),
        ];
        let results = run_batch(Some(&conn), &statements);
        assert_eq!(results.len(), 3);
        assert!(!results[0].is_failure());
        assert!(results[1].is_failure());
        assert!(!results[2].is_failure());
    }

    #[test]
    fn insert_reports_rowid() {
        let conn = memory_db();
        let statements = vec![Statement::with_params(
            "1",
            "INSERT INTO t (x) VALUES (?)",
            vec![Value::Integer(5)],
        )];
        let results = run_batch(Some(&conn), &statements);
        assert_eq!(
            results[0].outcome,
            StatementOutcome::Inserted {
                insert_id: 1,
                rows_affected: 1
            }
        );
    }

    #[test]
    fn update_reports_affected_count() {
        let conn = memory_db();
        conn.execute_batch("INSERT INTO t (x) VALUES (1); INSERT INTO t (x) VALUES (2);")
            .expect("rows");
        let statements = vec![Statement::new("1", "UPDATE t SET y = 9")];
        let results = run_batch(Some(&conn), &statements);
        assert_eq!(
            results[0].outcome,
            StatementOutcome::Affected { rows_affected: 2 }
        );
    }

    #[test]
    fn blob_columns_come_back_base64_encoded() {
        let conn = memory_db();
        conn.execute_batch("INSERT INTO t (x) VALUES (X'426C6F62')")
            .expect("blob row");
        let statements = vec![Statement::new("1", "SELECT x FROM t")];
        let results = run_batch(Some(&conn), &statements);
        let StatementOutcome::Rows(rows) = &results[0].outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].get("x"), Some(&Value::Text("QmxvYg==".into())));
    }

    #[test]
    fn closed_connection_fails_every_slot_without_binding() {
        let statements = vec![
            Statement::new("a", "SELECT 1"),
            Statement::new("b", "SELECT 2"),
        ];
        let results = run_batch(None, &statements);
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(
                result.outcome,
                StatementOutcome::Failure {
                    message: super::CLOSED_MESSAGE.to_owned()
                }
            );
        }
    }

    #[test]
    fn transaction_control_acks() {
        let conn = memory_db();
        let statements = vec![
            Statement::new("1", "BEGIN"),
            Statement::with_params("2", "INSERT INTO t (x) VALUES (?)", vec![Value::Integer(1)]),
            Statement::new("3", "COMMIT"),
        ];
        let results = run_batch(Some(&conn), &statements);
        assert_eq!(results[0].outcome, StatementOutcome::Ack);
        assert_eq!(results[2].outcome, StatementOutcome::Ack);
        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }
}
