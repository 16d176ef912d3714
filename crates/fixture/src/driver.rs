// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Migration driver seam.
//!
//! The fixture never runs migrations itself; it asks a [`MigrationDriver`]
//! to report, apply, or stamp schema versions. [`DieselMigrationDriver`]
//! implements the trait over embedded Diesel migrations.

use std::collections::BTreeSet;

use diesel::connection::BoxableConnection;
use diesel::migration::{Migration, MigrationMetadata, MigrationName, MigrationSource};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::Sqlite;
use diesel::{RunQueryDsl, SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::config::Target;
use crate::engine::Engine;
use crate::error::FixtureError;

/// Diesel's migration bookkeeping table.
pub const MIGRATIONS_TABLE: &str = "__diesel_schema_migrations";

/// A schema version to migrate or stamp to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// The newest migration known to the driver.
    Head,
    /// A specific migration version.
    Version(String),
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => write!(f, "head"),
            Self::Version(version) => write!(f, "{version}"),
        }
    }
}

/// Brings a database to a schema version.
///
/// Implementations own the [`Engine`] they operate on so callers can reset
/// it before and after a build.
pub trait MigrationDriver {
    /// The engine connected to the configured target.
    fn engine(&mut self) -> &mut Engine;

    /// Applies every pending migration up to and including `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is unknown or a migration fails.
    fn upgrade(&mut self, target: &Revision) -> Result<(), FixtureError>;

    /// Returns the newest applied version, or `None` for an unmigrated
    /// database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    fn version(&mut self) -> Result<Option<String>, FixtureError>;

    /// Records every migration up to and including `target` as applied
    /// without running it.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is unknown or the bookkeeping write
    /// fails.
    fn stamp(&mut self, target: &Revision) -> Result<(), FixtureError>;

    /// Returns the newest version the driver knows about, or `None` if it
    /// has no migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the migration source cannot be read.
    fn head(&self) -> Result<Option<String>, FixtureError>;
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Runs nothing, so the harness only records the wrapped migration.
struct RecordOnly<'a>(&'a dyn Migration<Sqlite>);

impl Migration<Sqlite> for RecordOnly<'_> {
    fn run(&self, _conn: &mut dyn BoxableConnection<Sqlite>) -> diesel::migration::Result<()> {
        Ok(())
    }

    fn revert(&self, _conn: &mut dyn BoxableConnection<Sqlite>) -> diesel::migration::Result<()> {
        Ok(())
    }

    fn metadata(&self) -> &dyn MigrationMetadata {
        self.0.metadata()
    }

    fn name(&self) -> &dyn MigrationName {
        self.0.name()
    }
}

/// [`MigrationDriver`] backed by a Diesel [`MigrationSource`].
pub struct DieselMigrationDriver<M = EmbeddedMigrations> {
    engine: Engine,
    source: M,
}

impl<M> DieselMigrationDriver<M>
where
    M: MigrationSource<Sqlite>,
{
    /// Creates a driver operating on `engine`.
    pub const fn new(engine: Engine, source: M) -> Self {
        Self { engine, source }
    }

    /// Creates a driver whose engine points at `target`.
    ///
    /// File-backed targets connect to the working path.
    ///
    /// # Errors
    ///
    /// Returns an error if the working path is not valid UTF-8.
    pub fn for_target(target: &Target, source: M) -> Result<Self, FixtureError> {
        let engine = match target {
            Target::Transient => Engine::transient(),
            Target::Persistent { working, .. } => Engine::file(working)?,
        };
        Ok(Self::new(engine, source))
    }

    fn migrations(&self) -> Result<Vec<Box<dyn Migration<Sqlite>>>, FixtureError> {
        self.source
            .migrations()
            .map_err(|e| FixtureError::MigrationFailed(e.to_string()))
    }

    /// Every known version, oldest first.
    fn known_versions(&self) -> Result<Vec<String>, FixtureError> {
        let mut versions: Vec<String> = self
            .migrations()?
            .iter()
            .map(|m| m.name().version().to_string())
            .collect();
        versions.sort();
        Ok(versions)
    }

    /// Resolves `target` to a concrete version, `None` if there are no
    /// migrations at all.
    fn resolve(&self, target: &Revision) -> Result<Option<String>, FixtureError> {
        let versions = self.known_versions()?;
        match target {
            Revision::Head => Ok(versions.last().cloned()),
            Revision::Version(version) if versions.contains(version) => Ok(Some(version.clone())),
            Revision::Version(version) => Err(FixtureError::MigrationFailed(format!(
                "unknown migration version: {version}"
            ))),
        }
    }
}

impl<M> MigrationDriver for DieselMigrationDriver<M>
where
    M: MigrationSource<Sqlite>,
{
    fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn upgrade(&mut self, target: &Revision) -> Result<(), FixtureError> {
        let Some(target_version) = self.resolve(target)? else {
            return Ok(());
        };
        let mut pending: Vec<Box<dyn Migration<Sqlite>>> = self.migrations()?;
        pending.sort_by_key(|m| m.name().version().to_string());

        let conn = self.engine.connect()?;
        let applied = recorded_versions(conn)?;

        info!(target = %target, "Running SQLite database migrations");
        for migration in pending {
            let version = migration.name().version().to_string();
            if version > target_version || applied.contains(&version) {
                continue;
            }
            conn.run_migration(&*migration)
                .map_err(|e| FixtureError::MigrationFailed(format!("{version}: {e}")))?;
            info!(%version, "Applied migration");
        }

        Ok(())
    }

    fn version(&mut self) -> Result<Option<String>, FixtureError> {
        let conn = self.engine.connect()?;
        if !bookkeeping_exists(conn)? {
            return Ok(None);
        }

        Ok(recorded_versions(conn)?.pop_last())
    }

    fn stamp(&mut self, target: &Revision) -> Result<(), FixtureError> {
        let Some(target_version) = self.resolve(target)? else {
            return Ok(());
        };
        let migrations = self.migrations()?;

        let conn = self.engine.connect()?;
        let applied = recorded_versions(conn)?;

        for migration in migrations {
            let version = migration.name().version().to_string();
            if version > target_version || applied.contains(&version) {
                continue;
            }
            conn.run_migration(&RecordOnly(&*migration))
                .map_err(|e| FixtureError::MigrationFailed(format!("{version}: {e}")))?;
        }

        info!(version = %target_version, "Stamped migration version");
        Ok(())
    }

    fn head(&self) -> Result<Option<String>, FixtureError> {
        self.resolve(&Revision::Head)
    }
}

fn bookkeeping_exists(conn: &mut SqliteConnection) -> Result<bool, FixtureError> {
    let row: CountRow = diesel::sql_query(
        "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind::<Text, _>(MIGRATIONS_TABLE)
    .get_result(conn)?;
    Ok(row.count > 0)
}

/// Versions Diesel has recorded as applied. Creates the bookkeeping table
/// when it is missing.
fn recorded_versions(conn: &mut SqliteConnection) -> Result<BTreeSet<String>, FixtureError> {
    let applied = conn
        .applied_migrations()
        .map_err(|e| FixtureError::MigrationFailed(e.to_string()))?;
    Ok(applied.iter().map(ToString::to_string).collect())
}
