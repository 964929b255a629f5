//! Flat-file storage of one table.
//!
//! A table file is the concatenation of fixed-size row blocks, so its length
//! is always a multiple of the row size. Rows are only ever appended; a
//! delete rebuilds the whole file next to the original and renames it over
//! the old one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::lock::TableLock;

/// Storage file of a single table, addressed by row blocks of `row_size`
/// bytes.
#[derive(Debug, Clone)]
pub struct TableStore {
    path: PathBuf,
    row_size: usize,
    lock_timeout: Duration,
    lock_retry_interval: Duration,
}

impl TableStore {
    pub fn new(path: impl Into<PathBuf>, row_size: usize, config: &DbConfig) -> Self {
        Self {
            path: path.into(),
            row_size,
            lock_timeout: config.lock_timeout,
            lock_retry_interval: config.lock_retry_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    fn lock(&self) -> Result<TableLock> {
        TableLock::acquire(&self.path, self.lock_timeout, self.lock_retry_interval)
    }

    fn wait_for_writers(&self) -> Result<()> {
        TableLock::wait_until_free(&self.path, self.lock_timeout, self.lock_retry_interval)
    }

    fn open(&self, options: &OpenOptions) -> Result<File> {
        options.open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DbError::corruption(format!(
                "table file {} is missing",
                self.path.display()
            )),
            _ => DbError::Io(e),
        })
    }

    /// Number of rows held by a file of `len` bytes.
    fn rows_in(&self, len: u64) -> Result<u64> {
        let row_size = self.row_size as u64;
        if len % row_size != 0 {
            return Err(DbError::corruption(format!(
                "table file {} is {len} bytes long, not a multiple of the {row_size} byte row size",
                self.path.display()
            )));
        }
        Ok(len / row_size)
    }

    /// Number of rows currently stored.
    pub fn row_count(&self) -> Result<u64> {
        let file = self.open(OpenOptions::new().read(true))?;
        self.rows_in(file.metadata()?.len())
    }

    /// Appends one encoded row under the table lock.
    ///
    /// The block is written with a single call; if that write fails the file
    /// is cut back to its previous length so no partial row stays behind.
    pub fn append(&self, block: &[u8]) -> Result<()> {
        if block.len() != self.row_size {
            return Err(DbError::Decode {
                expected: self.row_size,
                actual: block.len(),
            });
        }

        let _lock = self.lock()?;
        let mut file = self.open(OpenOptions::new().append(true))?;
        let len = file.metadata()?.len();
        self.rows_in(len)?;

        if let Err(e) = file.write_all(block).and_then(|()| file.flush()) {
            file.set_len(len)?;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), bytes = block.len(), "Appended row");
        Ok(())
    }

    /// Lazily reads every row block from the start of the file.
    ///
    /// Each call starts a new pass over the file.
    ///
    /// # Errors
    /// Returns [DbError::Busy] if a writer keeps the table locked past the
    /// lock timeout, and [DbError::Corruption] if the file length is not a
    /// multiple of the row size.
    pub fn scan(&self) -> Result<RowBlocks> {
        self.wait_for_writers()?;
        self.blocks()
    }

    fn blocks(&self) -> Result<RowBlocks> {
        let file = self.open(OpenOptions::new().read(true))?;
        let remaining = self.rows_in(file.metadata()?.len())?;
        Ok(RowBlocks {
            reader: BufReader::new(file),
            row_size: self.row_size,
            remaining,
        })
    }

    /// Reads the row at `index`. Negative indexes count from the end, `-1`
    /// being the last row.
    pub fn read_at(&self, index: i64) -> Result<Vec<u8>> {
        self.wait_for_writers()?;
        let mut file = self.open(OpenOptions::new().read(true))?;
        let rows = self.rows_in(file.metadata()?.len())?;

        let position = match u64::try_from(index) {
            Ok(i) => Some(i).filter(|&i| i < rows),
            Err(_) => rows.checked_sub(index.unsigned_abs()),
        };
        let position = position.ok_or(DbError::OutOfRange { index, rows })?;

        file.seek(SeekFrom::Start(position * self.row_size as u64))?;
        let mut block = vec![0u8; self.row_size];
        file.read_exact(&mut block)?;
        Ok(block)
    }

    /// Rebuilds the table with only the blocks for which `keep` returns
    /// true, preserving their order. Returns the number of removed rows.
    ///
    /// The lock is held for the whole rebuild. Kept blocks go to a temporary
    /// file in the same directory which is then renamed over the table file;
    /// until that rename the original file is untouched.
    ///
    /// # Errors
    /// Any error from `keep` or from reading and writing aborts the rewrite
    /// and leaves the table unchanged. A failed final rename is reported as
    /// [DbError::RewriteIncomplete].
    pub fn rewrite<F>(&self, mut keep: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let _lock = self.lock()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;

        let mut kept = 0u64;
        let mut removed = 0u64;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for block in self.blocks()? {
                let block = block?;
                if keep(&block)? {
                    writer.write_all(&block)?;
                    kept += 1;
                } else {
                    removed += 1;
                }
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.as_file()
            .set_permissions(fs::metadata(&self.path)?.permissions())?;

        tmp.persist(&self.path)
            .map_err(|e| DbError::RewriteIncomplete {
                path: self.path.clone(),
                source: e.error,
            })?;
        info!(path = %self.path.display(), kept, removed, "Rewrote table");
        Ok(removed)
    }
}

/// Iterator over the row blocks of a table file, see [TableStore::scan].
#[derive(Debug)]
pub struct RowBlocks {
    reader: BufReader<File>,
    row_size: usize,
    remaining: u64,
}

impl Iterator for RowBlocks {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let mut block = vec![0u8; self.row_size];
        match self.reader.read_exact(&mut block) {
            Ok(()) => {
                self.remaining -= 1;
                Some(Ok(block))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e.into()))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (0, Some(n))
    }
}

#[cfg(test)]
mod tests {

    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> TableStore {
        let path = dir.path().join("table");
        File::create(&path).unwrap();
        TableStore::new(path, 4, &DbConfig::for_testing())
    }

    fn collect(store: &TableStore) -> Vec<Vec<u8>> {
        store.scan().unwrap().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_empty_table() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.row_count().unwrap(), 0);
        assert!(collect(&store).is_empty());
    }

    #[test]
    fn test_append_then_scan() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.append(&[1, 1, 1, 1]).unwrap();
        store.append(&[2, 2, 2, 2]).unwrap();
        store.append(&[3, 3, 3, 3]).unwrap();

        assert_eq!(store.row_count().unwrap(), 3);
        assert_eq!(
            collect(&store),
            vec![vec![1; 4], vec![2; 4], vec![3; 4]]
        );
        // a second scan restarts from the first row
        assert_eq!(collect(&store).len(), 3);
        assert!(!TableLock::is_locked(store.path()));
    }

    #[test]
    fn test_append_wrong_size() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.append(&[1, 2, 3]),
            Err(DbError::Decode { expected: 4, actual: 3 })
        ));
        assert_eq!(fs::metadata(store.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), [0u8; 6]).unwrap();

        assert!(matches!(store.scan(), Err(DbError::Corruption(_))));
        assert!(matches!(store.row_count(), Err(DbError::Corruption(_))));
        assert!(matches!(store.append(&[0; 4]), Err(DbError::Corruption(_))));
    }

    #[test]
    fn test_missing_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::new(dir.path().join("gone"), 4, &DbConfig::for_testing());
        assert!(matches!(store.scan(), Err(DbError::Corruption(_))));
    }

    #[test]
    fn test_read_at() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..3u8 {
            store.append(&[i; 4]).unwrap();
        }

        assert_eq!(store.read_at(0).unwrap(), vec![0; 4]);
        assert_eq!(store.read_at(2).unwrap(), vec![2; 4]);
        assert_eq!(store.read_at(-1).unwrap(), vec![2; 4]);
        assert_eq!(store.read_at(-3).unwrap(), vec![0; 4]);

        assert!(matches!(
            store.read_at(3),
            Err(DbError::OutOfRange { index: 3, rows: 3 })
        ));
        assert!(matches!(
            store.read_at(-4),
            Err(DbError::OutOfRange { index: -4, rows: 3 })
        ));
    }

    #[test]
    fn test_scan_refuses_locked_table() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let _lock = store.lock().unwrap();

        assert!(matches!(store.scan(), Err(DbError::Busy { .. })));
        assert!(matches!(store.append(&[0; 4]), Err(DbError::Busy { .. })));
    }

    #[test]
    fn test_rewrite_keeps_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..6u8 {
            store.append(&[i; 4]).unwrap();
        }

        let removed = store.rewrite(|block| Ok(block[0] % 2 == 0)).unwrap();

        assert_eq!(removed, 3);
        assert_eq!(collect(&store), vec![vec![0; 4], vec![2; 4], vec![4; 4]]);
        assert!(!TableLock::is_locked(store.path()));
        // only the table file is left in the directory
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&[1; 4]).unwrap();
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();

        store.rewrite(|_| Ok(true)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_rewrite_failure_leaves_table_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..3u8 {
            store.append(&[i; 4]).unwrap();
        }

        let result = store.rewrite(|block| {
            if block[0] == 2 {
                Err(DbError::schema("boom"))
            } else {
                Ok(false)
            }
        });

        assert!(result.is_err());
        assert_eq!(collect(&store).len(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
