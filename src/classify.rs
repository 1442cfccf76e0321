use std::sync::LazyLock;

use regex::Regex;

/// Leading token of a statement, used to pick the execution strategy.
static FIRST_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)").expect("first-word pattern is valid"));

/// Execution strategy selected from a statement's leading keyword.
///
/// `Update`/`Delete` and `Insert` take the prepared, parameter-bound path so
/// no result set is materialized. `Begin`/`Commit`/`Rollback` go straight to
/// the engine's transaction statements because transaction state is
/// connection-global. Everything else, `Select` included, runs as a raw
/// parameterized row-returning query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Update,
    Insert,
    Delete,
    Select,
    Begin,
    Commit,
    Rollback,
    Other,
}

/// Classify a statement by its first whitespace-trimmed token,
/// case-insensitively. Unknown verbs classify as [`StatementKind::Other`].
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let Some(captures) = FIRST_WORD.captures(sql) else {
        return StatementKind::Other;
    };
    match captures[1].to_ascii_lowercase().as_str() {
        "update" => StatementKind::Update,
        "insert" => StatementKind::Insert,
        "delete" => StatementKind::Delete,
        "select" => StatementKind::Select,
        "begin" => StatementKind::Begin,
        "commit" => StatementKind::Commit,
        "rollback" => StatementKind::Rollback,
        _ => StatementKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::{StatementKind, classify};

    #[test]
    fn classifies_known_verbs_case_insensitively() {
        assert_eq!(classify("UPDATE t SET x = 1"), StatementKind::Update);
        assert_eq!(classify("insert into t values (1)"), StatementKind::Insert);
        assert_eq!(classify("Delete from t"), StatementKind::Delete);
        assert_eq!(classify("SELECT * FROM t"), StatementKind::Select);
        assert_eq!(classify("BeGiN"), StatementKind::Begin);
        assert_eq!(classify("commit"), StatementKind::Commit);
        assert_eq!(classify("ROLLBACK"), StatementKind::Rollback);
    }

    #[test]
    fn skips_leading_whitespace() {
        assert_eq!(classify("  \n\t UPDATE t SET x = 1"), StatementKind::Update);
        assert_eq!(classify("\r\nselect 1"), StatementKind::Select);
    }

    #[test]
    fn unknown_or_empty_statements_are_other() {
        assert_eq!(classify("VACUUM"), StatementKind::Other);
        assert_eq!(classify("CREATE TABLE t (x)"), StatementKind::Other);
        assert_eq!(classify("PRAGMA user_version"), StatementKind::Other);
        assert_eq!(classify(""), StatementKind::Other);
        assert_eq!(classify("   "), StatementKind::Other);
    }
}
