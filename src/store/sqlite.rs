use std::fs;

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::{debug, info, warn};

use super::{Row, SqliteLocation, Store, StoreError, Value};
use crate::schema::{ColumnSchema, SchemaRegistry, TableSchema};

/// [`Store`] backed by an embedded SQLite database.
///
/// Foreign-key enforcement is switched on at open time, so this store checks
/// references eagerly and reports the deferred foreign-key capability.
pub struct SqliteStore {
    conn: Connection,
    foreign_keys: bool,
    in_transaction: bool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `location`.
    pub fn open(location: &SqliteLocation) -> Result<Self, StoreError> {
        let conn = match location {
            SqliteLocation::Memory => Connection::open_in_memory()?,
            SqliteLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
        };
        conn.pragma_update(None, "foreign_keys", true)?;
        let foreign_keys: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        info!(
            location = ?location,
            foreign_keys = foreign_keys == 1,
            "store.opened"
        );
        Ok(Self {
            conn,
            foreign_keys: foreign_keys == 1,
            in_transaction: false,
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&SqliteLocation::Memory)
    }

    /// Underlying connection, for callers that need raw SQL.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn set_foreign_keys(&mut self, enabled: bool) -> Result<(), StoreError> {
        // SQLite ignores this pragma inside a transaction.
        if self.in_transaction || !self.conn.is_autocommit() {
            return Err(StoreError::TransactionOpen);
        }
        self.conn.pragma_update(None, "foreign_keys", enabled)?;
        debug!(enabled, "store.foreign_keys");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn create_schema(&mut self, registry: &SchemaRegistry) -> Result<(), StoreError> {
        for table in registry.tables() {
            let sql = create_table_sql(table);
            debug!(table = %table.name, %sql, "store.create_table");
            self.conn.execute(&sql, [])?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn insert(&mut self, table: &TableSchema, row: &Row) -> Result<(), StoreError> {
        let sql = insert_sql(table, row);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(row.iter().map(|(_, value)| value)))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.in_transaction = false;
        if let Err(err) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT (e.g. SQLITE_BUSY) leaves the transaction open.
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!(%rollback_err, "store.rollback_failed");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn query_all(&mut self, table: &TableSchema) -> Result<Vec<Row>, StoreError> {
        let columns: Vec<String> = table.column_names().map(quote_ident).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns.join(", "),
            quote_ident(&table.name)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut records = stmt.query([])?;
        let mut rows = Vec::new();
        while let Some(record) = records.next()? {
            let mut row = Row::with_capacity(table.columns.len());
            for (idx, column) in table.columns.iter().enumerate() {
                let raw: SqlValue = record.get(idx)?;
                row.set(&column.name, from_sql_value(raw, table, column)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn row_count(&mut self, table: &TableSchema) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&table.name));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn supports_deferred_foreign_keys(&self) -> bool {
        self.foreign_keys
    }

    fn disable_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        self.set_foreign_keys(false)
    }

    fn restore_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        let enabled = self.foreign_keys;
        self.set_foreign_keys(enabled)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            Value::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        };
        Ok(out)
    }
}

fn from_sql_value(
    raw: SqlValue,
    table: &TableSchema,
    column: &ColumnSchema,
) -> Result<Value, StoreError> {
    let value = match raw {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) if column.kind.is_boolean() => Value::Bool(v != 0),
        SqlValue::Integer(v) => Value::Int(v),
        SqlValue::Real(v) => Value::Float(v),
        SqlValue::Text(v) => Value::Text(v),
        SqlValue::Blob(_) => {
            return Err(StoreError::UnsupportedValue {
                table: table.name.clone(),
                column: column.name.clone(),
            })
        }
    };
    Ok(value)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_def(column: &ColumnSchema) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.kind.sql_type());
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(target) = &column.references {
        def.push_str(&format!(
            " REFERENCES {} ({})",
            quote_ident(&target.table),
            quote_ident(&target.column)
        ));
    }
    def
}

fn create_table_sql(table: &TableSchema) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_def).collect();
    let pk: Vec<String> = table.primary_key().map(|c| quote_ident(&c.name)).collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        parts.join(", ")
    )
}

fn insert_sql(table: &TableSchema, row: &Row) -> String {
    if row.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&table.name));
    }
    let columns: Vec<String> = row.iter().map(|(name, _)| quote_ident(name)).collect();
    let params: Vec<String> = (1..=row.len()).map(|idx| format!("?{idx}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name),
        columns.join(", "),
        params.join(", ")
    )
}
