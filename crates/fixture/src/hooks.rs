// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Collaborator seams used while building a baseline.

use diesel::{QueryResult, SqliteConnection};

use crate::error::FixtureError;

/// Creates every schema object directly from the model definitions.
///
/// Used as the fast path for in-memory databases, where replaying the full
/// migration history would be wasted work.
pub trait SchemaDefinitions {
    /// Creates all tables, indexes, and other objects on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    fn create_all(&self, conn: &mut SqliteConnection) -> Result<(), FixtureError>;
}

impl<F> SchemaDefinitions for F
where
    F: Fn(&mut SqliteConnection) -> QueryResult<()>,
{
    fn create_all(&self, conn: &mut SqliteConnection) -> Result<(), FixtureError> {
        self(conn).map_err(FixtureError::from)
    }
}

/// Extension points run while the baseline is being captured.
pub trait FixtureHooks {
    /// Runs after the schema is current and before the baseline is captured.
    ///
    /// Anything written here becomes part of every working copy.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the build.
    fn post_migrations(&self, _conn: &mut SqliteConnection) -> Result<(), FixtureError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl FixtureHooks for NoHooks {}
