// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Structural schema introspection.
//!
//! Two databases built by different routes (migration replay versus direct
//! model creation, or a baseline versus its restored working copy) rarely
//! have byte-identical DDL text. [`introspect`] reduces a database to the
//! parts that matter (columns, keys, constraints, indexes) so they can be
//! compared with [`SchemaShape::diff`].

use std::collections::{BTreeMap, BTreeSet};

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};
use diesel::{RunQueryDsl, SqliteConnection};

use crate::driver::MIGRATIONS_TABLE;
use crate::dump::quote_identifier;
use crate::error::FixtureError;

/// Normalized schema representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaShape {
    pub tables: BTreeMap<String, TableShape>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShape {
    pub columns: BTreeMap<String, ColumnShape>,
    pub primary_keys: BTreeSet<String>,
    pub foreign_keys: BTreeSet<ForeignKeyShape>,
    pub unique_constraints: BTreeSet<Vec<String>>,
    pub indexes: BTreeSet<IndexShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnShape {
    pub normalized_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForeignKeyShape {
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexShape {
    pub name: String,
    pub columns: Vec<String>,
}

impl SchemaShape {
    /// Names of every introspected table.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Describes every structural difference between `self` and `other`.
    ///
    /// An empty result means the schemas match.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut differences = Vec::new();

        for name in self.tables.keys() {
            if !other.tables.contains_key(name) {
                differences.push(format!("table '{name}' missing from right-hand schema"));
            }
        }
        for name in other.tables.keys() {
            if !self.tables.contains_key(name) {
                differences.push(format!("table '{name}' missing from left-hand schema"));
            }
        }

        for (name, left) in &self.tables {
            let Some(right) = other.tables.get(name) else {
                continue;
            };

            for (column, shape) in &left.columns {
                match right.columns.get(column) {
                    None => differences.push(format!("column '{name}.{column}' missing on right")),
                    Some(other_shape) if other_shape != shape => differences.push(format!(
                        "column '{name}.{column}' differs: {shape:?} vs {other_shape:?}"
                    )),
                    Some(_) => {}
                }
            }
            for column in right.columns.keys() {
                if !left.columns.contains_key(column) {
                    differences.push(format!("column '{name}.{column}' missing on left"));
                }
            }

            if left.primary_keys != right.primary_keys {
                differences.push(format!(
                    "primary keys on '{name}' differ: {:?} vs {:?}",
                    left.primary_keys, right.primary_keys
                ));
            }
            if left.foreign_keys != right.foreign_keys {
                differences.push(format!(
                    "foreign keys on '{name}' differ: {:?} vs {:?}",
                    left.foreign_keys, right.foreign_keys
                ));
            }
            if left.unique_constraints != right.unique_constraints {
                differences.push(format!(
                    "unique constraints on '{name}' differ: {:?} vs {:?}",
                    left.unique_constraints, right.unique_constraints
                ));
            }
            if left.indexes != right.indexes {
                differences.push(format!(
                    "indexes on '{name}' differ: {:?} vs {:?}",
                    left.indexes, right.indexes
                ));
            }
        }

        differences
    }
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct ColumnInfo {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    r#type: String,
    #[diesel(sql_type = Integer)]
    notnull: i32,
    #[diesel(sql_type = Integer)]
    pk: i32,
}

#[derive(QueryableByName)]
struct ForeignKeyInfo {
    #[diesel(sql_type = Text)]
    table: String,
    #[diesel(sql_type = Text)]
    from: String,
    #[diesel(sql_type = Nullable<Text>)]
    to: Option<String>,
}

#[derive(QueryableByName)]
struct IndexInfo {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    origin: String,
}

#[derive(QueryableByName)]
struct IndexColumnInfo {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn user_tables(conn: &mut SqliteConnection) -> Result<Vec<String>, FixtureError> {
    let tables: Vec<TableName> = diesel::sql_query(format!(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         AND name != '{MIGRATIONS_TABLE}' ORDER BY name"
    ))
    .load(conn)?;
    Ok(tables.into_iter().map(|t| t.name).collect())
}

/// Introspects every user table of the database behind `conn`.
///
/// `SQLite` internals and the Diesel bookkeeping table are ignored.
///
/// # Errors
///
/// Returns an error if any catalog query fails.
pub fn introspect(conn: &mut SqliteConnection) -> Result<SchemaShape, FixtureError> {
    let mut schema = SchemaShape::default();

    for table in user_tables(conn)? {
        let quoted = quote_identifier(&table);
        let mut shape = TableShape::default();

        let columns: Vec<ColumnInfo> =
            diesel::sql_query(format!("PRAGMA table_info({quoted})")).load(conn)?;
        for col in columns {
            if col.pk > 0 {
                shape.primary_keys.insert(col.name.clone());
            }
            shape.columns.insert(
                col.name,
                ColumnShape {
                    normalized_type: normalize_type(&col.r#type),
                    nullable: col.notnull == 0,
                },
            );
        }

        let fks: Vec<ForeignKeyInfo> =
            diesel::sql_query(format!("PRAGMA foreign_key_list({quoted})")).load(conn)?;
        for fk in fks {
            shape.foreign_keys.insert(ForeignKeyShape {
                from_column: fk.from,
                to_table: fk.table,
                // NULL when the reference targets the implicit primary key
                to_column: fk.to.unwrap_or_default(),
            });
        }

        let indexes: Vec<IndexInfo> =
            diesel::sql_query(format!("PRAGMA index_list({quoted})")).load(conn)?;
        for idx in indexes {
            let index_columns: Vec<IndexColumnInfo> = diesel::sql_query(format!(
                "PRAGMA index_info({})",
                quote_identifier(&idx.name)
            ))
            .load(conn)?;
            let column_names: Vec<String> = index_columns.into_iter().map(|c| c.name).collect();

            // Origin 'u' is a UNIQUE constraint, including sqlite_autoindex_*
            if idx.origin == "u" {
                shape.unique_constraints.insert(column_names);
            } else if !idx.name.starts_with("sqlite_autoindex_") {
                shape.indexes.insert(IndexShape {
                    name: idx.name,
                    columns: column_names,
                });
            }
        }

        schema.tables.insert(table, shape);
    }

    Ok(schema)
}

/// Counts the rows of every user table.
///
/// # Errors
///
/// Returns an error if any table cannot be counted.
pub fn row_counts(conn: &mut SqliteConnection) -> Result<BTreeMap<String, i64>, FixtureError> {
    let mut counts = BTreeMap::new();
    for table in user_tables(conn)? {
        let row: CountRow = diesel::sql_query(format!(
            "SELECT COUNT(*) AS count FROM {}",
            quote_identifier(&table)
        ))
        .get_result(conn)?;
        counts.insert(table, row.count);
    }
    Ok(counts)
}

/// Maps declared column types onto `SQLite` affinities.
fn normalize_type(declared: &str) -> String {
    let upper = declared.to_uppercase();
    let affinity = if upper.contains("INT") {
        "INTEGER"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "TEXT"
    } else if upper.contains("BLOB") || upper.is_empty() {
        "BLOB"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "REAL"
    } else {
        "NUMERIC"
    };
    affinity.to_string()
}
