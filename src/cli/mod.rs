#![forbid(unsafe_code)]

//! CSV import and export pipelines driven by the `pokedex` binary.
//!
//! Both pipelines walk the schema registry in table-name order and talk to
//! the database only through [`crate::store::Store`].

/// Table-by-table CSV import and export.
///
/// Handles reading `<table>.csv` files into a store and writing store
/// contents back out, including the field coercion rules in both directions.
pub mod import_export;
