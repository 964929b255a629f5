use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data_type::DataType;
use crate::error::{DbError, Result};

/// Column definition in the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

/// Ordered list of columns. The order is the physical field order of a row.
///
/// Column names are lower-cased on construction and are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

/// Lower-cases a table or column name and rejects empty names or names
/// containing whitespace.
pub(crate) fn normalize_name(kind: &str, name: &str) -> Result<String> {
    let name = name.to_lowercase();
    if name.is_empty() {
        return Err(DbError::schema(format!("{kind} name cannot be empty")));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DbError::schema(format!(
            "{kind} name {name:?} cannot contain whitespace"
        )));
    }
    Ok(name)
}

impl Schema {
    /// Builds a schema from `(name, type)` pairs, in order.
    ///
    /// # Errors
    /// Returns [DbError::Schema] for an invalid or duplicated column name.
    ///
    /// # Example
    /// ```
    /// # use flatdb::{DataType, Schema};
    /// let schema = Schema::new([
    ///     ("Id", DataType::Int64),
    ///     ("name", DataType::text(20).unwrap()),
    /// ])
    /// .unwrap();
    /// assert_eq!(schema.column_names(), vec!["id", "name"]);
    /// ```
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: AsRef<str>,
    {
        let mut defs: Vec<ColumnDef> = Vec::new();
        for (name, data_type) in columns {
            let name = normalize_name("column", name.as_ref())?;
            if defs.iter().any(|c| c.name == name) {
                return Err(DbError::schema(format!(
                    "column {name:?} was defined more than once"
                )));
            }
            defs.push(ColumnDef { name, data_type });
        }
        Ok(Self { columns: defs })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of the column called `name` (case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get_col(&self, name: &str) -> Option<&ColumnDef> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", col.name, col.data_type)?;
        }
        f.write_str(")")
    }
}

// The catalog stores a schema as a JSON object of `column -> token`. Object
// key order is the column order, so (de)serialization goes through map
// access directly instead of a hash map.
impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for col in &self.columns {
            map.serialize_entry(&col.name, &col.data_type)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to type tokens")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Schema, A::Error> {
                let mut pairs: Vec<(String, DataType)> = Vec::new();
                while let Some((name, data_type)) = access.next_entry()? {
                    pairs.push((name, data_type));
                }
                Schema::new(pairs).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}
