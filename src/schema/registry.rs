use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{ColumnKind, ColumnSchema, ForeignKey, SchemaError, TableSchema};

/// Validated set of tables, keyed by name.
///
/// Tables are kept in a sorted map so iteration is always in ascending
/// lexicographic order of table name.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    /// Builds a registry from table descriptors, validating names and references.
    pub fn from_tables(tables: Vec<TableSchema>) -> Result<Self, SchemaError> {
        let mut map = BTreeMap::new();
        for table in tables {
            if table.columns.is_empty() {
                return Err(SchemaError::EmptyTable(table.name));
            }
            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }
            if map.contains_key(&table.name) {
                return Err(SchemaError::DuplicateTable(table.name));
            }
            map.insert(table.name.clone(), table);
        }

        let registry = Self { tables: map };
        registry.check_references()?;
        Ok(registry)
    }

    /// Parses a TOML schema document.
    ///
    /// ```toml
    /// [[tables]]
    /// name = "types"
    ///
    /// [[tables.columns]]
    /// name = "id"
    /// kind = "integer"
    /// primary_key = true
    /// ```
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, SchemaError> {
        let doc: RawSchema = toml::from_str(raw).map_err(|source| SchemaError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let mut tables = Vec::with_capacity(doc.tables.len());
        for raw_table in doc.tables {
            let mut columns = Vec::with_capacity(raw_table.columns.len());
            for raw_col in raw_table.columns {
                let references = match raw_col.references.as_deref() {
                    Some(value) => Some(ForeignKey::parse(value).ok_or_else(|| {
                        SchemaError::MalformedReference {
                            table: raw_table.name.clone(),
                            column: raw_col.name.clone(),
                            raw: value.to_string(),
                        }
                    })?),
                    None => None,
                };
                columns.push(ColumnSchema {
                    name: raw_col.name,
                    kind: raw_col.kind,
                    nullable: raw_col.nullable,
                    primary_key: raw_col.primary_key,
                    references,
                });
            }
            tables.push(TableSchema::new(raw_table.name, columns));
        }
        Self::from_tables(tables)
    }

    /// Reads and parses a TOML schema file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no tables are declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// All tables, ascending by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Order in which tables are imported.
    ///
    /// Lexicographic. This only approximates foreign-key order, so stores
    /// that enforce references eagerly get their checks disabled for the
    /// duration of an import.
    pub fn import_order(&self) -> Vec<&TableSchema> {
        self.tables().collect()
    }

    /// Order in which tables are exported (lexicographic).
    pub fn export_order(&self) -> Vec<&TableSchema> {
        self.tables().collect()
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        for table in self.tables.values() {
            for column in &table.columns {
                let Some(target) = &column.references else {
                    continue;
                };
                let resolved = self
                    .tables
                    .get(&target.table)
                    .and_then(|t| t.column(&target.column))
                    .is_some();
                if !resolved {
                    return Err(SchemaError::UnknownReference {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    tables: Vec<RawTable>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    name: String,
    kind: ColumnKind,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    primary_key: bool,
    references: Option<String>,
}
