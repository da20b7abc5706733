use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, Terminator, WriterBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::schema::{ColumnSchema, SchemaError, SchemaRegistry, TableSchema};
use crate::store::{Row, Store, StoreError, Value};

/// Configuration for an import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Directory holding one `<table>.csv` per table.
    pub directory: PathBuf,
}

/// Configuration for an export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory receiving one `<table>.csv` per table.
    pub directory: PathBuf,
}

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Rows were read from CSV and committed.
    Loaded,
    /// No CSV file existed; the table was left untouched.
    NoData,
    /// Rows were written to CSV.
    Written,
}

/// Per-table result line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Outcome.
    pub status: TableStatus,
    /// Rows imported or exported.
    pub rows: u64,
}

/// Summary statistics from an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Per-table outcomes, in processing order.
    pub tables: Vec<TableReport>,
    /// Total rows committed.
    pub rows_imported: u64,
    /// Whether foreign-key checks were switched off for the run.
    pub foreign_keys_deferred: bool,
}

/// Summary statistics from an export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Per-table outcomes, in processing order.
    pub tables: Vec<TableReport>,
    /// Total rows written.
    pub rows_exported: u64,
}

/// Receives per-table notifications while a run is in progress.
pub trait Progress {
    /// A table is about to be processed.
    fn table_started(&mut self, _table: &TableSchema) {}
    /// A table finished successfully.
    fn table_finished(&mut self, _report: &TableReport) {}
}

/// [`Progress`] that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Error type for CLI import/export operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// File could not be opened or created.
    #[error("{path}: {source}")]
    File {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// CSV parsing or writing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Schema registry error.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// CSV header names a column the table does not have.
    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn {
        /// Table being imported.
        table: String,
        /// Header entry.
        column: String,
    },
    /// Failure while processing one table.
    #[error("table '{table}': {source}")]
    Table {
        /// Table being processed.
        table: String,
        /// What went wrong.
        #[source]
        source: Box<CliError>,
    },
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

impl CliError {
    fn in_table(self, table: &TableSchema) -> Self {
        CliError::Table {
            table: table.name.clone(),
            source: Box::new(self),
        }
    }
}

/// Loads every table of `registry` from CSV files into `store`.
///
/// Tables are processed in [`SchemaRegistry::import_order`]. Each table is
/// one transaction: a failure rolls the table back and aborts the run. A
/// missing `<table>.csv` is not an error; the table is reported as
/// [`TableStatus::NoData`] and left as it was. When the store checks foreign
/// keys eagerly, checks are off for the whole run and restored afterwards,
/// including after a failure.
pub fn run_import(
    store: &mut dyn Store,
    registry: &SchemaRegistry,
    cfg: &ImportConfig,
    progress: &mut dyn Progress,
) -> Result<ImportSummary, CliError> {
    info!(engine = store.engine(), tables = registry.len(), directory = %cfg.directory.display(), "import.started");
    store.create_schema(registry)?;

    let defer_foreign_keys = store.supports_deferred_foreign_keys();
    if defer_foreign_keys {
        store.disable_foreign_key_checks()?;
    }

    let mut summary = ImportSummary {
        foreign_keys_deferred: defer_foreign_keys,
        ..ImportSummary::default()
    };
    let result = import_tables(store, registry, &cfg.directory, progress, &mut summary);

    if defer_foreign_keys {
        match (&result, store.restore_foreign_key_checks()) {
            (_, Ok(())) => {}
            (Ok(()), Err(err)) => return Err(err.into()),
            (Err(_), Err(err)) => warn!(%err, "import.restore_foreign_keys_failed"),
        }
    }

    result.map(|()| summary)
}

fn import_tables(
    store: &mut dyn Store,
    registry: &SchemaRegistry,
    directory: &Path,
    progress: &mut dyn Progress,
    summary: &mut ImportSummary,
) -> Result<(), CliError> {
    for table in registry.import_order() {
        progress.table_started(table);
        let report = import_table(store, table, directory).map_err(|err| err.in_table(table))?;
        summary.rows_imported += report.rows;
        progress.table_finished(&report);
        summary.tables.push(report);
    }
    Ok(())
}

fn import_table(
    store: &mut dyn Store,
    table: &TableSchema,
    directory: &Path,
) -> Result<TableReport, CliError> {
    let path = directory.join(table.csv_file_name());
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(table = %table.name, path = %path.display(), "import.table_skipped");
            return Ok(TableReport {
                table: table.name.clone(),
                status: TableStatus::NoData,
                rows: 0,
            });
        }
        Err(source) => return Err(CliError::File { path, source }),
    };

    let mut reader = ReaderBuilder::new().from_reader(file);
    let header = reader.headers()?.clone();
    let columns = header
        .iter()
        .map(|name| {
            table.column(name).ok_or_else(|| CliError::UnknownColumn {
                table: table.name.clone(),
                column: name.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    store.begin()?;
    let rows = match load_rows(store, table, &columns, &mut reader) {
        Ok(rows) => rows,
        Err(err) => {
            abort_table(store, table);
            return Err(err);
        }
    };
    if let Err(err) = store.commit() {
        abort_table(store, table);
        return Err(err.into());
    }

    info!(table = %table.name, rows, path = %path.display(), "import.table_loaded");
    Ok(TableReport {
        table: table.name.clone(),
        status: TableStatus::Loaded,
        rows,
    })
}

/// Rolls back the table's transaction if the store still has one open.
fn abort_table(store: &mut dyn Store, table: &TableSchema) {
    match store.rollback() {
        Ok(()) | Err(StoreError::NoTransaction) => {}
        Err(rollback_err) => {
            warn!(table = %table.name, %rollback_err, "import.rollback_failed")
        }
    }
}

fn load_rows<R: Read>(
    store: &mut dyn Store,
    table: &TableSchema,
    columns: &[&ColumnSchema],
    reader: &mut Reader<R>,
) -> Result<u64, CliError> {
    let mut loaded = 0u64;
    for result in reader.records() {
        let record = result?;
        let mut row = Row::with_capacity(columns.len());
        for (column, raw) in columns.iter().zip(record.iter()) {
            row.set(&column.name, coerce_field(column, raw));
        }
        store.insert(table, &row)?;
        loaded += 1;
    }
    Ok(loaded)
}

/// Converts one CSV field into a value for `column`.
///
/// Rules, first match wins:
/// 1. nullable column and empty field: NULL;
/// 2. boolean column: `false` for `"0"`, `true` for anything else, including
///    values that are not booleans at all;
/// 3. otherwise the field as text, unchanged.
pub fn coerce_field(column: &ColumnSchema, raw: &str) -> Value {
    if column.nullable && raw.is_empty() {
        Value::Null
    } else if column.kind.is_boolean() {
        Value::Bool(raw != "0")
    } else {
        Value::Text(raw.to_string())
    }
}

/// Flattens a value into a CSV cell: NULL is empty, booleans are `0`/`1`.
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(v) => v.clone(),
    }
}

/// Writes every table of `registry` from `store` into CSV files.
///
/// Tables are written in [`SchemaRegistry::export_order`], one file per
/// table, overwriting existing files. The header lists the table's columns
/// in declaration order; rows appear in whatever order the store returns.
pub fn run_export(
    store: &mut dyn Store,
    registry: &SchemaRegistry,
    cfg: &ExportConfig,
    progress: &mut dyn Progress,
) -> Result<ExportSummary, CliError> {
    fs::create_dir_all(&cfg.directory).map_err(|source| CliError::File {
        path: cfg.directory.clone(),
        source,
    })?;

    info!(engine = store.engine(), tables = registry.len(), directory = %cfg.directory.display(), "export.started");
    let mut summary = ExportSummary::default();
    for table in registry.export_order() {
        progress.table_started(table);
        let report =
            export_table(store, table, &cfg.directory).map_err(|err| err.in_table(table))?;
        summary.rows_exported += report.rows;
        progress.table_finished(&report);
        summary.tables.push(report);
    }
    Ok(summary)
}

fn export_table(
    store: &mut dyn Store,
    table: &TableSchema,
    directory: &Path,
) -> Result<TableReport, CliError> {
    let rows = store.query_all(table)?;

    let path = directory.join(table.csv_file_name());
    let file = File::create(&path).map_err(|source| CliError::File {
        path: path.clone(),
        source,
    })?;
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file);
    writer.write_record(table.column_names())?;
    for row in &rows {
        writer.write_record(table.columns.iter().map(|col| format_cell(row.get(&col.name))))?;
    }
    writer.flush()?;

    info!(table = %table.name, rows = rows.len(), path = %path.display(), "export.table_written");
    Ok(TableReport {
        table: table.name.clone(),
        status: TableStatus::Written,
        rows: rows.len() as u64,
    })
}
