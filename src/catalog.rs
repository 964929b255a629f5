//! Catalog module - manages table metadata.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::codec::Endianness;
use crate::error::{DbError, Result};
use crate::schema::{Schema, normalize_name};

/// Name of the catalog document inside a database directory.
pub const METADATA_FILE: &str = "metadata";
/// Directory holding one storage file per table.
pub const TABLES_DIR: &str = "tables";
/// Reserved for index files, always empty.
pub const INDEXES_DIR: &str = "indexes";

/// Catalog entry of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub schema: Schema,
    /// Index descriptors. Always empty, kept for the document layout.
    #[serde(default)]
    pub indexes: Vec<String>,
    /// Storage file, relative to the database directory.
    pub filename: PathBuf,
}

/// [`Catalog`] is the in-memory copy of the `metadata` JSON document of a
/// database directory. Every mutation is written back before it returns, so
/// the document on disk is always the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(skip)]
    root: PathBuf,
    #[serde(rename = "db-name")]
    db_name: String,
    created: String,
    /// Byte order of every table of this database.
    #[serde(rename = "byte-order", default)]
    endianness: Endianness,
    tables: BTreeMap<String, TableEntry>,
}

/// Storage file name of a table: the hex MD5 digest of its (lower-cased)
/// name, stable and free of reserved characters.
pub fn table_file_name(name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Catalog {
    /// A new, empty catalog for the database at `root`. Nothing is written
    /// until [Catalog::save].
    pub fn create(root: impl Into<PathBuf>, db_name: impl Into<String>, endianness: Endianness) -> Self {
        Self {
            root: root.into(),
            db_name: db_name.into(),
            created: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            endianness,
            tables: BTreeMap::new(),
        }
    }

    /// Reads the catalog of the database at `root`.
    ///
    /// # Errors
    /// Returns [DbError::Corruption] if the document is missing, empty, or
    /// not a valid catalog (including an unknown type token).
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(METADATA_FILE);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                DbError::corruption(format!("metadata document {} is missing", path.display()))
            }
            _ => DbError::Io(e),
        })?;
        if content.trim().is_empty() {
            return Err(DbError::corruption(format!(
                "metadata document {} is empty",
                path.display()
            )));
        }

        let mut catalog: Catalog = serde_json::from_str(&content).map_err(|e| {
            DbError::corruption(format!("metadata document {} is invalid: {e}", path.display()))
        })?;
        catalog.root = root;
        debug!(path = %path.display(), tables = catalog.tables.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Writes the catalog over the metadata document through a temporary
    /// file and a rename.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.metadata_path()).map_err(|e| DbError::Io(e.error))?;
        debug!(path = %self.metadata_path().display(), "Saved catalog");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn created(&self) -> &str {
        &self.created
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// Returns the entry of table `name` (case-insensitive).
    pub fn table(&self, name: &str) -> Result<&TableEntry> {
        let name = name.to_lowercase();
        self.tables.get(&name).ok_or(DbError::TableNotFound(name))
    }

    /// Absolute path of the storage file of table `name`.
    pub fn table_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(&self.table(name)?.filename))
    }

    /// Registers a table, creates its empty storage file and saves the
    /// catalog. Returns `false` if the table already existed and
    /// `if_not_exists` is set.
    ///
    /// # Errors
    /// Returns [DbError::TableExists] if the table exists and
    /// `if_not_exists` is false, [DbError::Schema] for an invalid name.
    pub fn create_table(&mut self, name: &str, schema: Schema, if_not_exists: bool) -> Result<bool> {
        let name = normalize_name("table", name)?;
        if self.tables.contains_key(&name) {
            if if_not_exists {
                return Ok(false);
            }
            return Err(DbError::TableExists(name));
        }

        let filename = Path::new(TABLES_DIR).join(table_file_name(&name));
        let path = self.root.join(&filename);
        File::create(&path)?;
        self.tables.insert(
            name.clone(),
            TableEntry {
                schema,
                indexes: Vec::new(),
                filename,
            },
        );

        if let Err(e) = self.save() {
            self.tables.remove(&name);
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        info!(table = %name, path = %path.display(), "Created table");
        Ok(true)
    }

    /// Removes table `name` and its storage file, then saves the catalog.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        let entry = self
            .tables
            .remove(&name)
            .ok_or_else(|| DbError::TableNotFound(name.clone()))?;

        let path = self.root.join(&entry.filename);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                self.tables.insert(name, entry);
                return Err(e.into());
            }
        }
        self.save()?;
        info!(table = %name, "Dropped table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::data_type::DataType;

    fn new_catalog(dir: &TempDir) -> Catalog {
        fs::create_dir(dir.path().join(TABLES_DIR)).unwrap();
        let catalog = Catalog::create(dir.path(), "test.db", Endianness::Big);
        catalog.save().unwrap();
        catalog
    }

    fn schema() -> Schema {
        Schema::new([
            ("some_text", DataType::text(50).unwrap()),
            ("a_number", DataType::Int32),
            ("boolean_val", DataType::Bool),
        ])
        .unwrap()
    }

    #[test]
    fn test_table_file_name() {
        assert_eq!(table_file_name(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(table_file_name("users").len(), 32);
        assert_ne!(table_file_name("users"), table_file_name("posts"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        catalog.create_table("Test_Table", schema(), false).unwrap();

        let loaded = Catalog::load(dir.path()).unwrap();
        assert_eq!(loaded.db_name(), "test.db");
        assert_eq!(loaded.created(), catalog.created());
        assert_eq!(loaded.table_names(), vec!["test_table"]);
        assert_eq!(loaded.table("test_table").unwrap().schema, schema());
        assert_eq!(loaded.endianness(), Endianness::Big);
    }

    #[test]
    fn test_document_layout() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        catalog.create_table("t", schema(), false).unwrap();

        let raw = fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["db-name"], "test.db");
        assert!(doc["created"].is_string());
        assert_eq!(doc["tables"]["t"]["schema"]["some_text"], "50s");
        assert_eq!(doc["tables"]["t"]["indexes"], serde_json::json!([]));
        assert_eq!(
            doc["tables"]["t"]["filename"],
            format!("tables/{}", table_file_name("t"))
        );
    }

    #[test]
    fn test_create_table_makes_empty_file() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        assert!(catalog.create_table("users", schema(), false).unwrap());

        let path = catalog.table_path("USERS").unwrap();
        assert_eq!(path, dir.path().join(TABLES_DIR).join(table_file_name("users")));
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_create_existing_table() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        catalog.create_table("users", schema(), false).unwrap();

        assert!(matches!(
            catalog.create_table("Users", schema(), false),
            Err(DbError::TableExists(_))
        ));
        assert!(!catalog.create_table("users", schema(), true).unwrap());
    }

    #[test]
    fn test_invalid_table_name() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        assert!(matches!(
            catalog.create_table("my table", schema(), false),
            Err(DbError::Schema(_))
        ));
        assert!(catalog.table_names().is_empty());
    }

    #[test]
    fn test_drop_table() {
        let dir = TempDir::new().unwrap();
        let mut catalog = new_catalog(&dir);
        catalog.create_table("users", schema(), false).unwrap();
        let path = catalog.table_path("users").unwrap();

        catalog.drop_table("users").unwrap();
        assert!(!path.exists());
        assert!(!catalog.contains("users"));
        assert!(Catalog::load(dir.path()).unwrap().table_names().is_empty());

        assert!(matches!(
            catalog.drop_table("users"),
            Err(DbError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_load_missing_or_invalid() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(Catalog::load(dir.path()), Err(DbError::Corruption(_))));

        fs::write(dir.path().join(METADATA_FILE), "").unwrap();
        assert!(matches!(Catalog::load(dir.path()), Err(DbError::Corruption(_))));

        fs::write(dir.path().join(METADATA_FILE), "{not json").unwrap();
        assert!(matches!(Catalog::load(dir.path()), Err(DbError::Corruption(_))));

        let bad_token = r#"{"db-name":"x","created":"","tables":{"t":{"schema":{"a":"7q"},"indexes":[],"filename":"tables/t"}}}"#;
        fs::write(dir.path().join(METADATA_FILE), bad_token).unwrap();
        assert!(matches!(Catalog::load(dir.path()), Err(DbError::Corruption(_))));
    }

    #[test]
    fn test_byte_order_defaults_to_big() {
        let dir = TempDir::new().unwrap();
        let doc = r#"{"db-name":"x","created":"2024-01-01 00:00:00","tables":{}}"#;
        fs::write(dir.path().join(METADATA_FILE), doc).unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.endianness(), Endianness::Big);
    }
}
