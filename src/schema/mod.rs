#![forbid(unsafe_code)]

//! Table and column definitions shared by the importer and the exporter.
//!
//! The registry is declared statically (see [`pokedex`]) or loaded from a
//! TOML schema file. Both paths go through the same validation, so every
//! [`SchemaRegistry`] handed to the pipelines has unique table names, unique
//! column names per table, and foreign keys that resolve.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The statically declared Pokédex tables.
pub mod pokedex;
mod registry;

pub use registry::SchemaRegistry;

/// Storage type of a column.
///
/// Coercion only cares whether a column is boolean; the other kinds exist so
/// stores can declare column affinity when creating tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Signed integer column.
    Integer,
    /// Floating point column.
    Real,
    /// UTF-8 text column.
    Text,
    /// Boolean column, flattened to `0`/`1` in CSV.
    Boolean,
}

impl ColumnKind {
    /// Returns true for boolean columns.
    pub fn is_boolean(self) -> bool {
        matches!(self, ColumnKind::Boolean)
    }

    /// SQL type name used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::Text => "text",
            ColumnKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Target of a foreign-key reference.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

impl ForeignKey {
    /// Parses `table.column`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (table, column) = raw.trim().split_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A single column of a table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnSchema {
    /// Column name, as used in CSV headers.
    pub name: String,
    /// Storage type.
    pub kind: ColumnKind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Part of the table's primary key.
    pub primary_key: bool,
    /// Optional foreign-key target.
    pub references: Option<ForeignKey>,
}

impl ColumnSchema {
    /// Non-null column of the given kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            primary_key: false,
            references: None,
        }
    }

    /// Marks the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Adds a foreign-key reference to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

/// A named table and its ordered columns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    /// Table name, also the CSV file stem.
    pub name: String,
    /// Columns in declaration order; export headers follow this order.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Creates a table from its columns.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|col| col.name.as_str())
    }

    /// Columns flagged as primary key, in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|col| col.primary_key)
    }

    /// CSV file name for this table.
    pub fn csv_file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

/// Errors raised while building or loading a [`SchemaRegistry`].
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema file could not be read.
    #[error("failed to read schema file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Schema file is not valid TOML or has the wrong shape.
    #[error("failed to parse schema file {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Two tables share a name.
    #[error("table '{0}' is declared more than once")]
    DuplicateTable(String),
    /// Two columns of one table share a name.
    #[error("column '{column}' is declared more than once in table '{table}'")]
    DuplicateColumn {
        /// Owning table.
        table: String,
        /// Repeated column.
        column: String,
    },
    /// A table has no columns.
    #[error("table '{0}' has no columns")]
    EmptyTable(String),
    /// A foreign key points at a missing table or column.
    #[error("column '{table}.{column}' references unknown column '{target}'")]
    UnknownReference {
        /// Owning table.
        table: String,
        /// Referencing column.
        column: String,
        /// Missing target.
        target: ForeignKey,
    },
    /// A `references` entry is not `table.column`.
    #[error("column '{table}.{column}' has malformed reference '{raw}', expected table.column")]
    MalformedReference {
        /// Owning table.
        table: String,
        /// Referencing column.
        column: String,
        /// Raw value from the schema file.
        raw: String,
    },
}
