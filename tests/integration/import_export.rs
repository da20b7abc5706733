#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pokedex::cli::import_export::{
    run_export, run_import, CliError, ExportConfig, ImportConfig, NoProgress, Progress,
    TableReport, TableStatus,
};
use pokedex::schema::{pokedex as builtin, ColumnKind, ColumnSchema, SchemaRegistry, TableSchema};
use pokedex::store::{Row, SqliteLocation, SqliteStore, Store, StoreError, Value};
use rusqlite::Connection;
use tempfile::TempDir;

fn scenario_registry() -> SchemaRegistry {
    SchemaRegistry::from_tables(vec![
        TableSchema::new(
            "pokemon",
            vec![
                ColumnSchema::new("id", ColumnKind::Integer).primary_key(),
                ColumnSchema::new("name", ColumnKind::Text),
                ColumnSchema::new("is_legendary", ColumnKind::Boolean),
            ],
        ),
        TableSchema::new(
            "types",
            vec![
                ColumnSchema::new("id", ColumnKind::Integer).primary_key(),
                ColumnSchema::new("name", ColumnKind::Text),
            ],
        ),
    ])
    .expect("valid scenario schema")
}

fn write_csv(dir: &Path, table: &str, contents: &str) {
    fs::write(dir.join(format!("{table}.csv")), contents).expect("write csv");
}

fn file_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&SqliteLocation::File(dir.path().join("pokedex.db"))).expect("open store")
}

fn import_cfg(dir: &Path) -> ImportConfig {
    ImportConfig {
        directory: dir.to_path_buf(),
    }
}

fn export_cfg(dir: &Path) -> ExportConfig {
    ExportConfig {
        directory: dir.to_path_buf(),
    }
}

fn foreign_keys_enabled(store: &SqliteStore) -> bool {
    let enabled: i64 = store
        .connection()
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .expect("read pragma");
    enabled == 1
}

const SCENARIO_CSV: &str = "id,name,is_legendary\n1,Bulbasaur,0\n150,Mewtwo,1\n";

#[test]
fn scenario_import_then_export_is_byte_identical() {
    let input = TempDir::new().expect("tempdir");
    let output = TempDir::new().expect("tempdir");
    write_csv(input.path(), "pokemon", SCENARIO_CSV);

    let registry = scenario_registry();
    let mut store = file_store(&input);
    let summary = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .expect("import");

    assert_eq!(summary.rows_imported, 2);
    assert_eq!(
        summary.tables,
        vec![
            TableReport {
                table: "pokemon".into(),
                status: TableStatus::Loaded,
                rows: 2,
            },
            TableReport {
                table: "types".into(),
                status: TableStatus::NoData,
                rows: 0,
            },
        ]
    );

    let pokemon = registry.table("pokemon").unwrap();
    let rows = store.query_all(pokemon).expect("query");
    let decoded: Vec<_> = rows
        .iter()
        .map(|row| {
            (
                row.get("id").clone(),
                row.get("name").clone(),
                row.get("is_legendary").clone(),
            )
        })
        .collect();
    assert_eq!(
        decoded,
        vec![
            (Value::Int(1), Value::from("Bulbasaur"), Value::Bool(false)),
            (Value::Int(150), Value::from("Mewtwo"), Value::Bool(true)),
        ]
    );

    let summary = run_export(
        &mut store,
        &registry,
        &export_cfg(output.path()),
        &mut NoProgress,
    )
    .expect("export");
    assert_eq!(summary.rows_exported, 2);
    assert_eq!(
        fs::read_to_string(output.path().join("pokemon.csv")).unwrap(),
        SCENARIO_CSV
    );
    assert_eq!(
        fs::read_to_string(output.path().join("types.csv")).unwrap(),
        "id,name\n"
    );
}

#[test]
fn builtin_fixtures_round_trip_through_sqlite() {
    let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pokedex");
    let work = TempDir::new().expect("tempdir");
    let output = work.path().join("out");

    let registry = builtin::registry().expect("builtin registry");
    let mut store = file_store(&work);
    let summary =
        run_import(&mut store, &registry, &import_cfg(&fixtures), &mut NoProgress).expect("import");
    assert!(summary.foreign_keys_deferred);
    assert!(foreign_keys_enabled(&store), "checks restored after import");

    run_export(&mut store, &registry, &export_cfg(&output), &mut NoProgress).expect("export");
    for table in ["abilities", "pokemon", "pokemon_types", "types"] {
        let original = fs::read(fixtures.join(format!("{table}.csv"))).unwrap();
        let exported = fs::read(output.join(format!("{table}.csv"))).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&exported),
            String::from_utf8_lossy(&original),
            "{table}.csv differs after round trip"
        );
    }
    assert_eq!(
        fs::read_to_string(output.join("pokemon_abilities.csv")).unwrap(),
        "pokemon_id,ability_id,is_hidden,slot\n"
    );
}

#[test]
fn empty_fields_follow_column_nullability() {
    let input = TempDir::new().expect("tempdir");
    write_csv(
        input.path(),
        "pokemon",
        "id,name,species,is_legendary\n25,,,x\n",
    );

    let registry = builtin::registry().unwrap();
    let mut store = file_store(&input);
    run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .expect("import");

    let rows = store.query_all(registry.table("pokemon").unwrap()).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("name"), &Value::from(""), "non-nullable stays text");
    assert!(row.get("species").is_null(), "nullable becomes NULL");
    assert!(row.get("height").is_null(), "absent column keeps default");
    assert_eq!(row.get("is_legendary"), &Value::Bool(true));
}

#[test]
fn missing_file_leaves_table_untouched() {
    let input = TempDir::new().expect("tempdir");
    let registry = scenario_registry();
    let types = registry.table("types").unwrap();

    let mut store = file_store(&input);
    store.create_schema(&registry).unwrap();
    store.begin().unwrap();
    let mut row = Row::new();
    row.set("id", Value::Int(1));
    row.set("name", Value::from("normal"));
    store.insert(types, &row).unwrap();
    store.commit().unwrap();

    let summary = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .expect("import with no files");
    assert!(summary
        .tables
        .iter()
        .all(|t| t.status == TableStatus::NoData));
    assert_eq!(store.row_count(types).unwrap(), 1);
}

#[test]
fn malformed_row_rolls_back_table_and_aborts_run() {
    let input = TempDir::new().expect("tempdir");
    write_csv(input.path(), "abilities", "id,name\n65,Overgrow\n");
    write_csv(
        input.path(),
        "pokemon",
        "id,name,is_legendary\n1,Bulbasaur,0\n2,Ivysaur,0,extra\n",
    );
    write_csv(input.path(), "types", "id,name\n12,grass\n");

    let registry = builtin::registry().unwrap();
    let mut store = file_store(&input);
    let err = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .unwrap_err();

    match err {
        CliError::Table { table, source } => {
            assert_eq!(table, "pokemon");
            assert!(matches!(*source, CliError::Csv(_)), "got {source:?}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        store.row_count(registry.table("abilities").unwrap()).unwrap(),
        1
    );
    assert_eq!(
        store.row_count(registry.table("pokemon").unwrap()).unwrap(),
        0
    );
    assert_eq!(store.row_count(registry.table("types").unwrap()).unwrap(), 0);
    assert!(foreign_keys_enabled(&store), "checks restored after failure");
}

#[test]
fn failed_commit_rolls_back_and_restores_foreign_keys() {
    let input = TempDir::new().expect("tempdir");
    write_csv(input.path(), "types", "id,name\n1,normal\n10,fire\n");
    let registry = SchemaRegistry::from_tables(vec![TableSchema::new(
        "types",
        vec![
            ColumnSchema::new("id", ColumnKind::Integer).primary_key(),
            ColumnSchema::new("name", ColumnKind::Text),
        ],
    )])
    .unwrap();

    let mut store = file_store(&input);
    store.create_schema(&registry).expect("schema");
    store
        .connection()
        .busy_timeout(Duration::from_millis(50))
        .expect("busy timeout");

    // A reader mid-transaction keeps its shared lock, so COMMIT gets SQLITE_BUSY.
    let reader = Connection::open(input.path().join("pokedex.db")).expect("reader");
    reader.execute_batch("BEGIN").expect("begin reader");
    let existing: i64 = reader
        .query_row("SELECT COUNT(*) FROM types", [], |row| row.get(0))
        .expect("read");
    assert_eq!(existing, 0);

    let err = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .unwrap_err();
    match err {
        CliError::Table { table, source } => {
            assert_eq!(table, "types");
            assert!(matches!(*source, CliError::Store(_)), "got {source:?}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(store.connection().is_autocommit(), "transaction closed");
    assert!(foreign_keys_enabled(&store), "checks restored after failure");

    reader.execute_batch("COMMIT").expect("release reader");
    assert_eq!(store.row_count(registry.table("types").unwrap()).unwrap(), 0);
}

#[test]
fn unknown_header_column_is_fatal() {
    let input = TempDir::new().expect("tempdir");
    write_csv(input.path(), "types", "id,name,color\n1,normal,grey\n");

    let registry = scenario_registry();
    let mut store = file_store(&input);
    let err = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "table 'types': column 'color' not found in table 'types'"
    );
}

/// Store stub that records every call.
#[derive(Default)]
struct RecordingStore {
    deferred_fk: bool,
    calls: Vec<String>,
    staged: Vec<(String, Row)>,
    tables: HashMap<String, Vec<Row>>,
}

impl Store for RecordingStore {
    fn engine(&self) -> &'static str {
        "recording"
    }

    fn create_schema(&mut self, _registry: &SchemaRegistry) -> Result<(), StoreError> {
        self.calls.push("create_schema".into());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.calls.push("begin".into());
        Ok(())
    }

    fn insert(&mut self, table: &TableSchema, row: &Row) -> Result<(), StoreError> {
        self.calls.push(format!("insert {}", table.name));
        self.staged.push((table.name.clone(), row.clone()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.calls.push("commit".into());
        for (table, row) in self.staged.drain(..) {
            self.tables.entry(table).or_default().push(row);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.calls.push("rollback".into());
        self.staged.clear();
        Ok(())
    }

    fn query_all(&mut self, table: &TableSchema) -> Result<Vec<Row>, StoreError> {
        self.calls.push(format!("query {}", table.name));
        Ok(self.tables.get(&table.name).cloned().unwrap_or_default())
    }

    fn supports_deferred_foreign_keys(&self) -> bool {
        self.deferred_fk
    }

    fn disable_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        self.calls.push("disable_fk".into());
        Ok(())
    }

    fn restore_foreign_key_checks(&mut self) -> Result<(), StoreError> {
        self.calls.push("restore_fk".into());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingProgress {
    started: Vec<String>,
    finished: Vec<String>,
}

impl Progress for RecordingProgress {
    fn table_started(&mut self, table: &TableSchema) {
        self.started.push(table.name.clone());
    }

    fn table_finished(&mut self, report: &TableReport) {
        self.finished.push(report.table.clone());
    }
}

#[test]
fn tables_are_imported_in_lexicographic_order() {
    let input = TempDir::new().expect("tempdir");
    write_csv(input.path(), "types", "id,name\n12,grass\n");
    write_csv(input.path(), "pokemon_types", "pokemon_id,type_id,slot\n1,12,1\n");
    write_csv(input.path(), "pokemon", "id,name,is_legendary\n1,Bulbasaur,0\n");
    write_csv(
        input.path(),
        "pokemon_abilities",
        "pokemon_id,ability_id,is_hidden,slot\n1,65,0,1\n1,34,1,3\n",
    );
    write_csv(input.path(), "abilities", "id,name\n65,Overgrow\n34,Chlorophyll\n");

    let registry = builtin::registry().unwrap();
    let mut store = RecordingStore {
        deferred_fk: true,
        ..RecordingStore::default()
    };
    let mut progress = RecordingProgress::default();
    run_import(&mut store, &registry, &import_cfg(input.path()), &mut progress).expect("import");

    let expected = [
        "abilities",
        "pokemon",
        "pokemon_abilities",
        "pokemon_types",
        "types",
    ];
    let mut inserted: Vec<&str> = Vec::new();
    for call in &store.calls {
        if let Some(table) = call.strip_prefix("insert ") {
            if inserted.last() != Some(&table) {
                inserted.push(table);
            }
        }
    }
    assert_eq!(inserted, expected);
    assert_eq!(progress.started, expected);
    assert_eq!(progress.finished, expected);

    assert_eq!(store.calls.first().map(String::as_str), Some("create_schema"));
    assert_eq!(store.calls.get(1).map(String::as_str), Some("disable_fk"));
    assert_eq!(store.calls.last().map(String::as_str), Some("restore_fk"));
    assert_eq!(
        store.calls.iter().filter(|c| *c == "commit").count(),
        expected.len(),
        "one commit per table"
    );
}

#[test]
fn foreign_key_toggle_is_skipped_without_capability() {
    let input = TempDir::new().expect("tempdir");
    write_csv(input.path(), "pokemon", SCENARIO_CSV);

    let registry = scenario_registry();
    let mut store = RecordingStore::default();
    let summary = run_import(
        &mut store,
        &registry,
        &import_cfg(input.path()),
        &mut NoProgress,
    )
    .expect("import");

    assert!(!summary.foreign_keys_deferred);
    assert!(!store.calls.iter().any(|c| c.ends_with("_fk")));
    assert_eq!(
        store.calls,
        ["create_schema", "begin", "insert pokemon", "insert pokemon", "commit"]
    );
}

#[test]
fn export_writes_tables_in_alphabetical_order() {
    let output = TempDir::new().expect("tempdir");
    let registry = builtin::registry().unwrap();
    let mut store = RecordingStore::default();
    let mut row = Row::new();
    row.set("id", Value::Int(10));
    row.set("name", Value::from("fire"));
    store.tables.insert("types".into(), vec![row]);

    let summary = run_export(
        &mut store,
        &registry,
        &export_cfg(output.path()),
        &mut NoProgress,
    )
    .expect("export");

    let queried: Vec<_> = store
        .calls
        .iter()
        .filter_map(|c| c.strip_prefix("query "))
        .collect();
    assert_eq!(
        queried,
        ["abilities", "pokemon", "pokemon_abilities", "pokemon_types", "types"]
    );
    assert_eq!(summary.rows_exported, 1);
    assert_eq!(
        fs::read_to_string(output.path().join("types.csv")).unwrap(),
        "id,name\n10,fire\n"
    );
}

#[test]
fn export_quotes_fields_that_need_it() {
    let output = TempDir::new().expect("tempdir");
    let registry = scenario_registry();
    let mut store = RecordingStore::default();
    let mut row = Row::new();
    row.set("id", Value::Int(83));
    row.set("name", Value::from("Farfetch'd, \"the duck\""));
    row.set("is_legendary", Value::Bool(false));
    store.tables.insert("pokemon".into(), vec![row]);

    run_export(
        &mut store,
        &registry,
        &export_cfg(output.path()),
        &mut NoProgress,
    )
    .expect("export");
    assert_eq!(
        fs::read_to_string(output.path().join("pokemon.csv")).unwrap(),
        "id,name,is_legendary\n83,\"Farfetch'd, \"\"the duck\"\"\",0\n"
    );
}
