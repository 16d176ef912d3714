// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Demonstration schema for `pristine` fixtures.
//!
//! This crate plays the role of the application's schema/model definitions.
//! It exposes the same schema in two forms:
//!
//! - [`MIGRATIONS`] is the embedded Diesel migration history, replayed by a
//!   migration driver for file-backed fixtures
//! - [`create_all`] creates the final schema directly from the model
//!   definitions, used as the fast path for throwaway in-memory databases
//!
//! Both forms must produce structurally identical schemas. The parity is
//! checked by the `pristine` test suite and by `cargo xtask verify-schema`.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::multiple_crate_versions)]

pub mod diesel_schema;

#[cfg(test)]
mod tests;

use diesel::QueryResult;
use diesel::SqliteConnection;
use diesel::connection::SimpleConnection;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};

/// Embedded `SQLite` migration history, oldest first.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Tables declared by the models, in dependency order.
///
/// Does not include the Diesel bookkeeping table.
pub const MODEL_TABLES: [&str; 4] = ["goals", "strategies", "audit_templates", "audits"];

/// Final schema DDL, equivalent to applying every migration in [`MIGRATIONS`].
const MODEL_DDL: &str = r"
CREATE TABLE goals (
    goal_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    efficacy_specification TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE strategies (
    strategy_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    goal_id INTEGER NOT NULL REFERENCES goals(goal_id),
    parameters_spec TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE audit_templates (
    audit_template_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    goal_id INTEGER NOT NULL REFERENCES goals(goal_id),
    strategy_id INTEGER REFERENCES strategies(strategy_id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE audits (
    audit_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    audit_type TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'PENDING',
    goal_id INTEGER NOT NULL REFERENCES goals(goal_id),
    strategy_id INTEGER REFERENCES strategies(strategy_id),
    audit_template_id INTEGER REFERENCES audit_templates(audit_template_id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    name TEXT
);

CREATE INDEX idx_audits_state ON audits(state);
";

/// Creates every model table directly, bypassing the migration history.
///
/// The caller is responsible for stamping the migration version afterwards
/// so later upgrades do not try to replay the history.
///
/// # Errors
///
/// Returns an error if any table already exists or the DDL fails.
pub fn create_all(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(MODEL_DDL)
}
