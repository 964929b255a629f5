use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::{Catalog, INDEXES_DIR, TABLES_DIR};
use crate::codec::{Row, RowCodec};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::query::{ColumnsSelect, QueryResult, Select};
use crate::schema::Schema;
use crate::table::{RowBlocks, TableStore};
use crate::value::Value;

/// The main entry point of the store: an open database directory.
///
/// It owns the catalog of the directory and one row codec per table, and
/// routes row operations to the storage file of each table. Table names are
/// case-insensitive.
///
/// # Example
/// ```
/// use flatdb::{DataType, Database, Schema, Value};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = Database::create(dir.path().join("shop.db")).unwrap();
///
/// let schema = Schema::new([
///     ("name", DataType::text(20).unwrap()),
///     ("price", DataType::Int32),
/// ])
/// .unwrap();
/// db.create_table("Products", schema, false).unwrap();
///
/// db.insert("products", vec![Value::from("Laptop"), Value::Int32(1200)]).unwrap();
/// db.insert("products", vec![Value::from("Mouse"), Value::Null]).unwrap();
///
/// let rows: Vec<Vec<Value>> = db.scan("products").unwrap().collect::<Result<_, _>>().unwrap();
/// assert_eq!(rows[1], vec![Value::from("Mouse"), Value::Null]);
/// ```
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    config: DbConfig,
    catalog: Catalog,
    /// Row codec of every table, keyed by lower-cased table name.
    codecs: HashMap<String, RowCodec>,
}

impl Database {
    /// Creates a new database directory at `path` with the default
    /// configuration.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, DbConfig::default())
    }

    /// Creates a new database directory holding an empty catalog, a `tables`
    /// and an `indexes` directory.
    ///
    /// # Errors
    /// Returns [DbError::DatabaseExists] if `path` already exists.
    pub fn create_with_config(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(DbError::DatabaseExists(path));
        }

        fs::create_dir_all(path.join(TABLES_DIR))?;
        fs::create_dir(path.join(INDEXES_DIR))?;
        let db_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let catalog = Catalog::create(&path, db_name, config.endianness);
        catalog.save()?;

        info!(path = %path.display(), "Created database");
        Self::from_catalog(path, catalog, config)
    }

    /// Opens an existing database directory with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, DbConfig::default())
    }

    /// Opens an existing database directory.
    ///
    /// The byte order recorded in the catalog wins over
    /// [DbConfig::endianness].
    ///
    /// # Errors
    /// Returns [DbError::DatabaseNotFound] if `path` is not a directory, and
    /// [DbError::Corruption] if its metadata document is missing or invalid.
    pub fn open_with_config(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(DbError::DatabaseNotFound(path));
        }
        let catalog = Catalog::load(&path)?;
        info!(path = %path.display(), tables = catalog.table_names().len(), "Opened database");
        Self::from_catalog(path, catalog, config)
    }

    /// Opens the database at `path`, creating it first if it does not exist.
    pub fn open_or_create(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open_with_config(path, config)
        } else {
            Self::create_with_config(path, config)
        }
    }

    fn from_catalog(path: PathBuf, catalog: Catalog, config: DbConfig) -> Result<Self> {
        let codecs = catalog
            .table_names()
            .into_iter()
            .map(|name| {
                let entry = catalog.table(name)?;
                let codec = RowCodec::new(&entry.schema, catalog.endianness()).map_err(|e| match e {
                    DbError::Schema(msg) => DbError::corruption(format!(
                        "metadata holds an unusable schema for table {name:?}: {msg}"
                    )),
                    other => other,
                })?;
                Ok((name.to_string(), codec))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            path,
            config,
            catalog,
            codecs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Deletes the whole database directory.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        info!(path = %self.path.display(), "Removed database");
        Ok(())
    }

    /// Returns the names of all tables, sorted.
    pub fn list_tables(&self) -> Vec<&str> {
        self.catalog.table_names()
    }

    pub fn schema(&self, name: &str) -> Result<&Schema> {
        self.codec(name).map(RowCodec::schema)
    }

    /// Creates a new table.
    ///
    /// The schema is checked for storability (non-empty, every text column
    /// bounded) before anything is written. Returns `false` when the table
    /// already existed and `if_not_exists` is set.
    ///
    /// # Errors
    /// Returns [DbError::TableExists] if a table with the same name exists
    /// and `if_not_exists` is false.
    pub fn create_table(&mut self, name: &str, schema: Schema, if_not_exists: bool) -> Result<bool> {
        let codec = RowCodec::new(&schema, self.catalog.endianness())?;
        let created = self.catalog.create_table(name, schema, if_not_exists)?;
        if created {
            self.codecs.insert(name.to_lowercase(), codec);
        }
        Ok(created)
    }

    /// Removes a table and its storage file.
    ///
    /// # Errors
    /// Returns [DbError::TableNotFound] if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.catalog.drop_table(name)?;
        self.codecs.remove(&name.to_lowercase());
        Ok(())
    }

    fn codec(&self, name: &str) -> Result<&RowCodec> {
        let name = name.to_lowercase();
        self.codecs.get(&name).ok_or(DbError::TableNotFound(name))
    }

    fn table(&self, name: &str) -> Result<(&RowCodec, TableStore)> {
        let codec = self.codec(name)?;
        let store = TableStore::new(self.catalog.table_path(name)?, codec.row_size(), &self.config);
        Ok((codec, store))
    }

    /// Appends one row to a table.
    ///
    /// # Errors
    /// Returns [DbError::Schema] if the row does not match the table schema
    /// and [DbError::Busy] if the table stays locked by another writer.
    pub fn insert(&self, name: &str, row: impl Into<Row>) -> Result<()> {
        let (codec, store) = self.table(name)?;
        let block = codec.encode(row.into())?;
        store.append(&block)?;
        debug!(table = %name.to_lowercase(), "Inserted row");
        Ok(())
    }

    /// Inserts rows one after the other. This is not atomic: on failure the
    /// rows before the failing one stay inserted.
    pub fn insert_many<I, R>(&self, name: &str, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        for row in rows {
            self.insert(name, row)?;
        }
        Ok(())
    }

    /// Lazily reads every row of a table in insertion order.
    pub fn scan(&self, name: &str) -> Result<Rows<'_>> {
        let (codec, store) = self.table(name)?;
        Ok(Rows {
            codec,
            blocks: store.scan()?,
        })
    }

    /// Reads one row by position; negative positions count from the end.
    pub fn read_row(&self, name: &str, index: i64) -> Result<Vec<Value>> {
        let (codec, store) = self.table(name)?;
        codec.decode(&store.read_at(index)?)
    }

    pub fn row_count(&self, name: &str) -> Result<u64> {
        let (_, store) = self.table(name)?;
        store.row_count()
    }

    /// Deletes every row for which `predicate` returns true by rewriting the
    /// table without them. Returns the number of deleted rows.
    ///
    /// # Errors
    /// Any error before the final rename leaves the table unchanged.
    /// [DbError::RewriteIncomplete] means the table may hold either the old
    /// or the new rows.
    pub fn delete<P>(&self, name: &str, mut predicate: P) -> Result<usize>
    where
        P: FnMut(&[Value]) -> bool,
    {
        let (codec, store) = self.table(name)?;
        let removed = store.rewrite(|block| Ok(!predicate(&codec.decode(block)?)))?;
        info!(table = %name.to_lowercase(), removed, "Deleted rows");
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    /// Runs a projection over a table: rows for which `filter` returns true
    /// (given the full row in schema order) are reduced to the selected
    /// columns, up to the select limit.
    ///
    /// # Errors
    /// Returns [DbError::Schema] if a selected column does not exist.
    pub fn query<F>(&self, select: &Select, mut filter: F) -> Result<QueryResult>
    where
        F: FnMut(&[Value]) -> bool,
    {
        let schema = self.schema(&select.table)?;
        let (columns, indices): (Vec<String>, Vec<usize>) = match &select.columns {
            ColumnsSelect::Star => schema
                .columns()
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .unzip(),
            ColumnsSelect::ColumnsNames(names) => names
                .iter()
                .map(|n| {
                    schema
                        .position(n)
                        .map(|i| (schema.columns()[i].name.clone(), i))
                        .ok_or_else(|| DbError::schema(format!("column {n:?} does not exist")))
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .unzip(),
        };

        let mut rows = Vec::new();
        for row in self.scan(&select.table)? {
            if select.limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let row = row?;
            if filter(&row) {
                rows.push(indices.iter().map(|&i| row[i].clone()).collect());
            }
        }

        Ok(QueryResult { columns, rows })
    }
}

/// Decoded rows of a table, see [Database::scan].
#[derive(Debug)]
pub struct Rows<'a> {
    codec: &'a RowCodec,
    blocks: RowBlocks,
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.blocks.next()?;
        Some(block.and_then(|b| self.codec.decode(&b)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.blocks.size_hint()
    }
}
