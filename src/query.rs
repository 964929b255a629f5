use crate::value::Value;

/// Columns returned by a [Select].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnsSelect {
    Star,
    ColumnsNames(Vec<String>),
}

/// A projection over one table, run with [Database::query](crate::Database::query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: String,
    pub columns: ColumnsSelect,
    pub limit: Option<usize>,
}

impl Select {
    /// Selects every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: ColumnsSelect::Star,
            limit: None,
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = ColumnsSelect::ColumnsNames(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Represents the result of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The names of the columns included in the result set.
    pub columns: Vec<String>,
    /// The rows, each holding the values of `columns` in that order.
    pub rows: Vec<Vec<Value>>,
}
