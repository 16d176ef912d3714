// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

mod dump_tests;
mod persistent_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use diesel::migration::{Migration, MigrationName, MigrationSource};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::{QueryResult, SqliteConnection};
use diesel_migrations::EmbeddedMigrations;
use pristine_schema::diesel_schema::goals;
use pristine_schema::{MIGRATIONS, create_all};

use crate::{
    DieselMigrationDriver, Engine, FixtureConfig, FixtureContext, FixtureError, MigrationDriver,
    Revision, Target,
};

/// Signature of the demonstration schema's `create_all`.
pub type SchemaFn = fn(&mut SqliteConnection) -> QueryResult<()>;

pub fn schema() -> SchemaFn {
    create_all
}

pub fn diesel_driver(target: &Target) -> DieselMigrationDriver<EmbeddedMigrations> {
    DieselMigrationDriver::for_target(target, MIGRATIONS).unwrap()
}

pub fn transient_context() -> FixtureContext<DieselMigrationDriver<EmbeddedMigrations>, SchemaFn> {
    crate::logging::init_test_logging();
    FixtureContext::with_migrations(FixtureConfig::in_memory(), MIGRATIONS, schema()).unwrap()
}

/// Version of the first embedded migration.
pub fn oldest_version() -> String {
    let mut versions: Vec<String> = MigrationSource::<Sqlite>::migrations(&MIGRATIONS)
        .unwrap()
        .iter()
        .map(|m| m.name().version().to_string())
        .collect();
    versions.sort();
    versions.remove(0)
}

/// Inserts a goal and returns its id.
pub fn insert_goal(conn: &mut SqliteConnection, name: &str) -> i64 {
    diesel::insert_into(goals::table)
        .values((
            goals::uuid.eq(format!("uuid-{name}")),
            goals::name.eq(name),
            goals::display_name.eq(name.to_uppercase()),
        ))
        .execute(conn)
        .unwrap();

    goals::table
        .filter(goals::name.eq(name))
        .select(goals::goal_id)
        .first(conn)
        .unwrap()
}

pub fn goal_count(conn: &mut SqliteConnection) -> i64 {
    goals::table.count().get_result(conn).unwrap()
}

/// Shared counters for [`CountingDriver`], readable after the driver has
/// been moved into a context.
#[derive(Debug, Clone, Default)]
pub struct DriverCalls {
    upgrades: Arc<AtomicUsize>,
    stamps: Arc<AtomicUsize>,
}

impl DriverCalls {
    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    pub fn stamps(&self) -> usize {
        self.stamps.load(Ordering::SeqCst)
    }
}

/// Diesel driver that records how often it migrates or stamps.
pub struct CountingDriver {
    inner: DieselMigrationDriver<EmbeddedMigrations>,
    calls: DriverCalls,
}

impl CountingDriver {
    pub fn new(target: &Target) -> (Self, DriverCalls) {
        let calls = DriverCalls::default();
        let driver = Self {
            inner: diesel_driver(target),
            calls: calls.clone(),
        };
        (driver, calls)
    }
}

impl MigrationDriver for CountingDriver {
    fn engine(&mut self) -> &mut Engine {
        self.inner.engine()
    }

    fn upgrade(&mut self, target: &Revision) -> Result<(), FixtureError> {
        self.calls.upgrades.fetch_add(1, Ordering::SeqCst);
        self.inner.upgrade(target)
    }

    fn version(&mut self) -> Result<Option<String>, FixtureError> {
        self.inner.version()
    }

    fn stamp(&mut self, target: &Revision) -> Result<(), FixtureError> {
        self.calls.stamps.fetch_add(1, Ordering::SeqCst);
        self.inner.stamp(target)
    }

    fn head(&self) -> Result<Option<String>, FixtureError> {
        self.inner.head()
    }
}
