use super::{ColumnKind, ColumnSchema, SchemaError, SchemaRegistry, TableSchema};

use ColumnKind::{Boolean, Integer, Text};

/// Builds the built-in Pokédex registry.
///
/// Link tables (`pokemon_abilities`, `pokemon_types`) sort before `types`,
/// which is why imports run with foreign-key checks switched off.
pub fn registry() -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::from_tables(tables())
}

/// The built-in table descriptors, in no particular order.
pub fn tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new(
            "abilities",
            vec![
                ColumnSchema::new("id", Integer).primary_key(),
                ColumnSchema::new("name", Text),
                ColumnSchema::new("flavor_text", Text).nullable(),
            ],
        ),
        TableSchema::new(
            "pokemon",
            vec![
                ColumnSchema::new("id", Integer).primary_key(),
                ColumnSchema::new("name", Text),
                ColumnSchema::new("species", Text).nullable(),
                ColumnSchema::new("height", Integer).nullable(),
                ColumnSchema::new("weight", Integer).nullable(),
                ColumnSchema::new("is_legendary", Boolean),
            ],
        ),
        TableSchema::new(
            "pokemon_abilities",
            vec![
                ColumnSchema::new("pokemon_id", Integer)
                    .primary_key()
                    .references("pokemon", "id"),
                ColumnSchema::new("ability_id", Integer)
                    .primary_key()
                    .references("abilities", "id"),
                ColumnSchema::new("is_hidden", Boolean),
                ColumnSchema::new("slot", Integer),
            ],
        ),
        TableSchema::new(
            "pokemon_types",
            vec![
                ColumnSchema::new("pokemon_id", Integer)
                    .primary_key()
                    .references("pokemon", "id"),
                ColumnSchema::new("type_id", Integer)
                    .primary_key()
                    .references("types", "id"),
                ColumnSchema::new("slot", Integer),
            ],
        ),
        TableSchema::new(
            "types",
            vec![
                ColumnSchema::new("id", Integer).primary_key(),
                ColumnSchema::new("name", Text),
            ],
        ),
    ]
}
