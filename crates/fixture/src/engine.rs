// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Connection handle for a single `SQLite` target.
//!
//! An [`Engine`] pools at most one [`SqliteConnection`]. For in-memory
//! targets the pooled connection *is* the database: it lives until
//! [`Engine::dispose`] drops it, and every `connect()` in between returns the
//! same database.

use std::path::Path;

use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::{Connection, RunQueryDsl, SqliteConnection};
use tracing::debug;

use crate::error::FixtureError;

/// `SQLite` URL for a private in-memory database.
const MEMORY_URL: &str = ":memory:";

/// Helper row struct for PRAGMA queries.
#[derive(QueryableByName)]
struct PragmaRow {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}

/// A lazily opened, single-connection pool for one database URL.
pub struct Engine {
    url: String,
    pooled: Option<SqliteConnection>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.url)
            .field("connected", &self.pooled.is_some())
            .finish()
    }
}

impl Engine {
    /// Creates an engine for a private in-memory database.
    #[must_use]
    pub fn transient() -> Self {
        Self::new(MEMORY_URL)
    }

    /// Creates an engine for a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not valid UTF-8.
    pub fn file(path: &Path) -> Result<Self, FixtureError> {
        let url = path.to_str().ok_or_else(|| {
            FixtureError::InvalidConfig(format!("Invalid database path: {}", path.display()))
        })?;
        Ok(Self::new(url))
    }

    /// Creates an engine for an arbitrary `SQLite` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pooled: None,
        }
    }

    /// The URL this engine connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` if a connection is currently pooled.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.pooled.is_some()
    }

    /// Returns the pooled connection, opening it first if necessary.
    ///
    /// New connections have foreign key enforcement switched on.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or
    /// configured.
    pub fn connect(&mut self) -> Result<&mut SqliteConnection, FixtureError> {
        if self.pooled.is_none() {
            self.pooled = Some(open_connection(&self.url)?);
        }

        self.pooled
            .as_mut()
            .ok_or_else(|| FixtureError::ConnectionFailed(format!("no connection to {}", self.url)))
    }

    /// Drops the pooled connection, if any.
    ///
    /// For in-memory engines this discards the database.
    pub fn dispose(&mut self) {
        if self.pooled.take().is_some() {
            debug!(url = %self.url, "Disposed pooled connection");
        }
    }
}

/// Opens a connection and enables foreign key enforcement.
fn open_connection(url: &str) -> Result<SqliteConnection, FixtureError> {
    debug!(url, "Opening SQLite connection");

    let mut conn: SqliteConnection = SqliteConnection::establish(url)?;

    // NOTE: PRAGMA is raw SQL (Diesel has no PRAGMA DSL)
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .map_err(|e| FixtureError::QueryFailed(e.to_string()))?;

    Ok(conn)
}

/// Returns `true` if `conn` enforces foreign keys.
///
/// # Errors
///
/// Returns an error if the PRAGMA query fails.
pub fn foreign_keys_enabled(conn: &mut SqliteConnection) -> Result<bool, FixtureError> {
    let enabled: i32 = diesel::sql_query("PRAGMA foreign_keys")
        .get_result::<PragmaRow>(conn)?
        .foreign_keys;
    Ok(enabled != 0)
}
