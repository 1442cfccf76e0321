use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::error::DispatchError;

/// Open (or create) the database at `path`.
///
/// When a template is given and the destination does not exist yet, the
/// template bytes are copied in first; a missing template only skips
/// pre-population. With `read_only` set the template file itself is opened
/// read-only and nothing is copied.
///
/// A decryption/format rejection on the first attempt triggers exactly one
/// retry with `migrate` set, which asks the engine to convert the legacy
/// encryption format in place during key derivation. A second rejection is
/// fatal.
///
/// # Errors
/// Returns [`DispatchError::OpenFailure`] when the engine rejects the
/// connection after the bounded migration retry.
pub(crate) fn open_database(
    path: &Path,
    key: Option<&str>,
    template: Option<&Path>,
    read_only: bool,
    migrate: bool,
) -> Result<Connection, DispatchError> {
    let (target, flags) = match template {
        Some(template) if read_only => {
            debug!(db = %template.display(), "read-only open of external template");
            (template.to_path_buf(), OpenFlags::SQLITE_OPEN_READ_ONLY)
        }
        _ => {
            if let Some(template) = template {
                if !path.exists() {
                    copy_template(template, path);
                }
            }
            if let Some(parent) = path.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!(dir = %parent.display(), error = %err, "couldn't create database directory");
                }
            }
            (
                path.to_path_buf(),
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )
        }
    };

    debug!(db = %target.display(), migrate, "opening sqlite database");
    let conn = match open_keyed(&target, key, flags, migrate) {
        Ok(conn) => conn,
        Err(err) if !migrate && is_cipher_mismatch(&err) => {
            // Legacy encryption format: retry once asking the engine to
            // migrate during key derivation.
            debug!(db = %target.display(), "open rejected, retrying with cipher migration");
            return open_database(path, key, template, read_only, true);
        }
        Err(err) => return Err(DispatchError::OpenFailure(err.to_string())),
    };

    Ok(conn)
}

fn open_keyed(
    path: &Path,
    key: Option<&str>,
    flags: OpenFlags,
    migrate: bool,
) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open_with_flags(path, flags)?;
    if let Some(key) = key {
        conn.pragma_update(None, "key", key)?;
    }
    if migrate {
        // The migration runs as part of reading the pragma; the probe below
        // decides whether it worked.
        let _migrated: rusqlite::types::Value =
            conn.query_row("PRAGMA cipher_migrate", [], |row| row.get(0))?;
    }
    // Force key derivation now so a wrong key or legacy format surfaces here
    // instead of on the first queued statement.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))?;
    Ok(conn)
}

fn is_cipher_mismatch(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::NotADatabase
    )
}

/// Copy the template into place. Best-effort: a missing or unreadable
/// template only skips pre-population.
fn copy_template(template: &Path, destination: &Path) {
    if let Some(parent) = destination.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match fs::copy(template, destination) {
        Ok(bytes) => {
            debug!(
                template = %template.display(),
                db = %destination.display(),
                bytes,
                "copied pre-populated database template"
            );
        }
        Err(err) => {
            warn!(template = %template.display(), error = %err, "no usable database template");
        }
    }
}

/// Remove the database file and its journal siblings.
///
/// Returns whether the main file was removed. Must only be called when no
/// live connection exists for the name.
pub(crate) fn delete_database_files(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            for suffix in ["-journal", "-wal", "-shm"] {
                let _ = fs::remove_file(sibling(path, suffix));
            }
            debug!(db = %path.display(), "deleted database files");
            true
        }
        Err(err) => {
            warn!(db = %path.display(), error = %err, "couldn't delete database file");
            false
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
