//! Moves Pokédex data between a directory of CSV files and a database.
//!
//! - [`schema`]: table and column definitions, built in or loaded from TOML
//! - [`store`]: the database seam and its SQLite implementation
//! - [`cli`]: the import and export pipelines

#![warn(missing_docs)]

pub mod cli;
pub mod schema;
pub mod store;

pub use cli::import_export::{
    run_export, run_import, CliError, ExportConfig, ExportSummary, ImportConfig, ImportSummary,
};
pub use schema::{ColumnKind, ColumnSchema, SchemaRegistry, TableSchema};
pub use store::{open_store, ConnectionUri, Row, Store, StoreError, Value};
