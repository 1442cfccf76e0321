use std::path::PathBuf;

/// Per-database options for [`Registry::open`](crate::Registry::open).
///
/// ```rust
/// use sqlite_dispatch::OpenOptions;
///
/// let options = OpenOptions::default()
///     .with_template("seed/app.db")
///     .with_lock_workaround(true);
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub(crate) template: Option<PathBuf>,
    pub(crate) read_only: bool,
    pub(crate) lock_workaround: bool,
}

impl OpenOptions {
    /// Pre-populate the database from this template file on first open.
    ///
    /// The copy happens only when the destination file does not exist yet; a
    /// missing template skips pre-population rather than failing the open.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Open the template file itself read-only instead of copying it.
    ///
    /// Honored only together with a template; without one the database is
    /// always opened read-write.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Cycle the connection after every lone-COMMIT batch.
    ///
    /// Masks a platform file-locking defect; the close-and-reopen happens on
    /// the worker thread between dequeues, so queue order is preserved.
    #[must_use]
    pub fn with_lock_workaround(mut self, lock_workaround: bool) -> Self {
        self.lock_workaround = lock_workaround;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::OpenOptions;

    #[test]
    fn defaults_are_plain_read_write() {
        let options = OpenOptions::default();
        assert!(options.template.is_none());
        assert!(!options.read_only);
        assert!(!options.lock_workaround);
    }

    #[test]
    fn builder_sets_each_field() {
        let options = OpenOptions::default()
            .with_template("seed.db")
            .with_read_only(true)
            .with_lock_workaround(true);
        assert_eq!(options.template.as_deref(), Some(std::path::Path::new("seed.db")));
        assert!(options.read_only);
        assert!(options.lock_workaround);
    }
}
