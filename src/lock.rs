//! Advisory per-table write lock.
//!
//! A table is locked by the presence of a marker file next to it
//! (`<table file>.lock`). Writers create the marker with create-exclusive
//! semantics and remove it when done; readers wait for it to disappear.
//! Nothing stops a process that ignores the marker, it only coordinates
//! handles that follow the convention.
//!
//! ## Usage
//!
//! ```no_run
//! # use std::time::Duration;
//! # use flatdb::lock::TableLock;
//! # fn main() -> flatdb::Result<()> {
//! let lock = TableLock::acquire(
//!     "/path/to/db/tables/0123abcd".as_ref(),
//!     Duration::from_secs(5),
//!     Duration::from_millis(10),
//! )?;
//! // Lock is held until `lock` is dropped
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{DbError, Result};

/// A held table lock. The marker file is removed when this is dropped.
#[derive(Debug)]
pub struct TableLock {
    path: PathBuf,
}

impl TableLock {
    /// Path of the marker file guarding `table_file`.
    pub fn marker_path(table_file: &Path) -> PathBuf {
        let mut name = OsString::from(table_file.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Returns true while some writer holds the lock on `table_file`.
    pub fn is_locked(table_file: &Path) -> bool {
        Self::marker_path(table_file).exists()
    }

    /// Takes the lock on `table_file`, retrying every `retry_interval` until
    /// `timeout` has elapsed.
    ///
    /// # Errors
    /// Returns [DbError::Busy] if the marker still exists after `timeout`,
    /// or [DbError::Io] if the marker cannot be created for another reason.
    pub fn acquire(table_file: &Path, timeout: Duration, retry_interval: Duration) -> Result<Self> {
        let path = Self::marker_path(table_file);
        let start = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(path = %path.display(), "Acquired table lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        warn!(
                            path = %path.display(),
                            waited_ms = waited.as_millis() as u64,
                            "Gave up waiting for table lock"
                        );
                        return Err(DbError::Busy { path, waited });
                    }
                    thread::sleep(retry_interval.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Blocks until no writer holds the lock on `table_file`, without taking
    /// it.
    ///
    /// # Errors
    /// Returns [DbError::Busy] if the lock is still held after `timeout`.
    pub fn wait_until_free(
        table_file: &Path,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<()> {
        let path = Self::marker_path(table_file);
        let start = Instant::now();

        while path.exists() {
            let waited = start.elapsed();
            if waited >= timeout {
                warn!(path = %path.display(), "Table is still being written");
                return Err(DbError::Busy { path, waited });
            }
            thread::sleep(retry_interval.min(timeout - waited));
        }
        Ok(())
    }

    /// Returns the path to the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            error!(
                path = %self.path.display(),
                error = %e,
                "Failed to release table lock"
            );
        } else {
            debug!(path = %self.path.display(), "Released table lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SHORT: Duration = Duration::from_millis(30);
    const RETRY: Duration = Duration::from_millis(2);

    #[test]
    fn test_marker_path() {
        let path = TableLock::marker_path(Path::new("/db/tables/abc"));
        assert_eq!(path, PathBuf::from("/db/tables/abc.lock"));
    }

    #[test]
    fn test_acquire_creates_marker() {
        let temp = TempDir::new().unwrap();
        let table = temp.path().join("t");

        let lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        assert!(lock.path().exists());
        assert!(TableLock::is_locked(&table));
    }

    #[test]
    fn test_double_lock_is_busy() {
        let temp = TempDir::new().unwrap();
        let table = temp.path().join("t");

        let _lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        let result = TableLock::acquire(&table, SHORT, RETRY);
        assert!(matches!(result, Err(DbError::Busy { .. })));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let table = temp.path().join("t");

        {
            let _lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        }
        assert!(!TableLock::is_locked(&table));

        let lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_wait_until_free() {
        let temp = TempDir::new().unwrap();
        let table = temp.path().join("t");

        assert!(TableLock::wait_until_free(&table, SHORT, RETRY).is_ok());

        let lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        assert!(matches!(
            TableLock::wait_until_free(&table, SHORT, RETRY),
            Err(DbError::Busy { .. })
        ));
        drop(lock);
        assert!(TableLock::wait_until_free(&table, SHORT, RETRY).is_ok());
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let temp = TempDir::new().unwrap();
        let table = temp.path().join("t");

        let lock = TableLock::acquire(&table, SHORT, RETRY).unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(lock);
        });

        let second = TableLock::acquire(&table, Duration::from_secs(2), RETRY);
        releaser.join().unwrap();
        assert!(second.is_ok());
    }
}
