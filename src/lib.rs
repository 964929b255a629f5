pub mod catalog;
pub mod codec;
pub mod config;
pub mod data_type;
pub mod database;
pub mod error;
pub mod lock;
pub mod query;
pub mod schema;
pub mod table;
pub mod value;

pub use catalog::{Catalog, TableEntry};
pub use codec::{Endianness, Row, RowCodec};
pub use config::DbConfig;
pub use data_type::DataType;
pub use database::{Database, Rows};
pub use error::{DbError, Result};
pub use query::{ColumnsSelect, QueryResult, Select};
pub use schema::{ColumnDef, Schema};
pub use table::TableStore;
pub use value::Value;
