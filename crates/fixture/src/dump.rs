// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Logical dumps of `SQLite` databases.
//!
//! A [`DumpScript`] is the ordered list of statements needed to recreate a
//! database from nothing, in the same shape the `sqlite3` shell's `.dump`
//! produces:
//!
//! 1. `BEGIN TRANSACTION;`
//! 2. each table's DDL in creation order, followed by one `INSERT` per row;
//!    shadow tables behind a virtual table are left to its own DDL
//! 3. the contents of `sqlite_sequence`, once every table exists
//! 4. index, trigger, and view DDL
//! 5. `COMMIT;`
//!
//! Row values are rendered by `SQLite`'s own `quote()` so text, blobs,
//! integers, reals, and NULLs survive the round trip exactly.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::{RunQueryDsl, SqliteConnection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FixtureError;

const SEQUENCE_TABLE: &str = "sqlite_sequence";

#[derive(QueryableByName)]
struct SchemaObject {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    r#type: String,
    #[diesel(sql_type = Text)]
    sql: String,
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct StatementRow {
    #[diesel(sql_type = Text)]
    statement: String,
}

/// Replayable statement script capturing a database's schema and rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpScript {
    statements: Vec<String>,
}

impl DumpScript {
    /// Serializes the full content of the database behind `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or any table cannot be read.
    pub fn capture(conn: &mut SqliteConnection) -> Result<Self, FixtureError> {
        let objects: Vec<SchemaObject> = diesel::sql_query(
            "SELECT name, type, sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY rowid",
        )
        .load(conn)?;
        let shadows = shadow_tables(conn)?;

        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
        let mut trailing = Vec::new();
        let mut has_sequence = false;

        for object in objects {
            if object.r#type != "table" {
                trailing.push(terminate(&object.sql));
                continue;
            }

            if object.name == SEQUENCE_TABLE {
                has_sequence = true;
            } else if !object.name.starts_with("sqlite_") && !shadows.contains(&object.name) {
                statements.push(terminate(&object.sql));
                statements.extend(table_rows(conn, &object.name)?);
            }
        }

        // sqlite_sequence only exists once an AUTOINCREMENT table does.
        if has_sequence {
            statements.push(format!("DELETE FROM {};", quote_identifier(SEQUENCE_TABLE)));
            statements.extend(table_rows(conn, SEQUENCE_TABLE)?);
        }

        statements.extend(trailing);
        statements.push("COMMIT;".to_string());

        debug!(statements = statements.len(), "Captured database dump");
        Ok(Self { statements })
    }

    /// The statements, in replay order.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Number of statements in the script.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if the script holds no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the script as one SQL text, one statement per line.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.statements.join("\n")
    }

    /// Replays the script against `conn`, which should be an empty database.
    ///
    /// Foreign key enforcement is suspended during the replay because rows
    /// are restored table by table, not in dependency order.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn replay(&self, conn: &mut SqliteConnection) -> Result<(), FixtureError> {
        conn.batch_execute("PRAGMA foreign_keys = OFF")?;
        let replayed = conn.batch_execute(&self.to_sql());
        if replayed.is_err() {
            // The failed statement leaves the script's transaction open.
            let _ = conn.batch_execute("ROLLBACK");
        }
        conn.batch_execute("PRAGMA foreign_keys = ON")?;

        replayed.map_err(|e| FixtureError::QueryFailed(format!("baseline replay failed: {e}")))
    }
}

/// Tables a virtual table keeps its own state in. Its `CREATE VIRTUAL TABLE`
/// recreates them, and its rows are restored through the virtual table.
fn shadow_tables(conn: &mut SqliteConnection) -> Result<Vec<String>, FixtureError> {
    let rows: Vec<NameRow> = diesel::sql_query(
        "SELECT name FROM pragma_table_list WHERE schema = 'main' AND type = 'shadow'",
    )
    .load(conn)?;
    Ok(rows.into_iter().map(|row| row.name).collect())
}

/// Renders one `INSERT` statement per row of `table`.
fn table_rows(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>, FixtureError> {
    let quoted = quote_identifier(table);

    let columns: Vec<NameRow> =
        diesel::sql_query(format!("PRAGMA table_info({quoted})")).load(conn)?;
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let values = columns
        .iter()
        .map(|column| format!("quote({})", quote_identifier(&column.name)))
        .collect::<Vec<_>>()
        .join(" || ',' || ");
    let prefix = format!("INSERT INTO {quoted} VALUES(").replace('\'', "''");

    let rows: Vec<StatementRow> = diesel::sql_query(format!(
        "SELECT '{prefix}' || {values} || ');' AS statement FROM {quoted}"
    ))
    .load(conn)?;

    Ok(rows.into_iter().map(|row| row.statement).collect())
}

fn terminate(sql: &str) -> String {
    format!("{};", sql.trim_end_matches(';'))
}

/// Quotes an identifier for use in SQL text.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
