#![forbid(unsafe_code)]

//! Persistence layer the importer writes to and the exporter reads from.
//!
//! [`Store`] is the seam between the CSV pipelines and a database engine.
//! [`open_store`] picks the engine from a [`ConnectionUri`]; engine specific
//! behavior such as foreign-key enforcement is reported through store
//! capabilities rather than inferred from the URI text.

use std::fmt;

use thiserror::Error;

use crate::schema::{SchemaRegistry, TableSchema};

mod sqlite;
mod uri;

pub use sqlite::SqliteStore;
pub use uri::{ConnectionUri, SqliteLocation};

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean column value.
    Bool(bool),
    /// Integer read back from the database.
    Int(i64),
    /// Floating point read back from the database.
    Float(f64),
    /// Text, always valid UTF-8.
    Text(String),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// Column values of one record, in assignment order.
///
/// Columns that were never assigned read as [`Value::Null`]; stores leave
/// them out of inserts so the column default applies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty row with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Assigns `value` to `column`, replacing any earlier assignment.
    pub fn set(&mut self, column: &str, value: Value) {
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    /// Value of `column`, NULL when unassigned.
    pub fn get(&self, column: &str) -> &Value {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .unwrap_or(&Value::Null)
    }

    /// Assigned `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of assigned columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was assigned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Errors raised by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection string could not be parsed.
    #[error("invalid connection uri '{0}'")]
    InvalidUri(String),
    /// Engine is recognised but not built in.
    #[error("unsupported database engine '{0}' (only sqlite is available)")]
    UnsupportedEngine(String),
    /// Error from SQLite.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// I/O error while preparing the database location.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Stored value has no text form (binary data).
    #[error("column '{table}.{column}' holds a binary value")]
    UnsupportedValue {
        /// Table being read.
        table: String,
        /// Offending column.
        column: String,
    },
    /// Commit or rollback without an open transaction.
    #[error("no transaction is open")]
    NoTransaction,
    /// Operation that must run outside a transaction was called inside one.
    #[error("a transaction is still open")]
    TransactionOpen,
}

/// Database operations the CSV pipelines rely on.
///
/// Calls are strictly sequential; a store is driven by one thread.
pub trait Store {
    /// Engine name for logs.
    fn engine(&self) -> &'static str;

    /// Creates every table of `registry` that does not exist yet.
    fn create_schema(&mut self, registry: &SchemaRegistry) -> Result<(), StoreError>;

    /// Opens a transaction.
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Stages one row for insertion into `table`.
    fn insert(&mut self, table: &TableSchema, row: &Row) -> Result<(), StoreError>;

    /// Commits the open transaction. On failure the transaction is rolled
    /// back and closed.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discards the open transaction.
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Every row of `table`, each carrying all of the table's columns.
    fn query_all(&mut self, table: &TableSchema) -> Result<Vec<Row>, StoreError>;

    /// Number of rows currently in `table`.
    fn row_count(&mut self, table: &TableSchema) -> Result<u64, StoreError> {
        Ok(self.query_all(table)?.len() as u64)
    }

    /// True when the engine checks foreign keys on every insert and allows
    /// those checks to be switched off for a bulk load.
    fn supports_deferred_foreign_keys(&self) -> bool {
        false
    }

    /// Stops foreign-key enforcement until [`Store::restore_foreign_key_checks`].
    fn disable_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Restores foreign-key enforcement to its state at open time.
    fn restore_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens the store named by `uri`.
pub fn open_store(uri: &ConnectionUri) -> Result<Box<dyn Store>, StoreError> {
    match uri {
        ConnectionUri::Sqlite(location) => Ok(Box::new(SqliteStore::open(location)?)),
        ConnectionUri::Server { scheme, .. } => Err(StoreError::UnsupportedEngine(scheme.clone())),
    }
}
