// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Migrate-once, restore-per-test `SQLite` fixtures.
//!
//! Migrating a schema is slow; running tests against a shared database is
//! unsafe. This crate does the first exactly once per [`FixtureContext`] and
//! hands every test its own freshly restored copy.
//!
//! ## Lifecycle
//!
//! 1. The first [`FixtureContext::set_up`] builds a [`Baseline`]:
//!    - **in-memory** (`sqlite://`): the schema is created from the model
//!      definitions, the migration version is stamped, and the database is
//!      dumped to a replayable [`DumpScript`]
//!    - **file-backed** (`sqlite:///...`): migrations run against the
//!      working file, which is then copied to a clean path
//! 2. Every `set_up` restores a [`WorkingCopy`] from the cached baseline.
//! 3. [`WorkingCopy::tear_down`] (or dropping the working copy) runs the
//!    registered cleanup actions in reverse order: the connection is
//!    disposed and, for file-backed copies, the working file is deleted.
//!
//! ## Collaborators
//!
//! The crate does not own a schema. It consumes one through narrow traits:
//!
//! - [`MigrationDriver`] reports, applies, and stamps schema versions
//!   ([`DieselMigrationDriver`] covers embedded Diesel migrations)
//! - [`SchemaDefinitions`] creates the final schema directly
//! - [`FixtureHooks`] runs extension code after migration
//! - [`FlagStore`] receives feature flag overrides before each test
//!
//! ## Concurrency
//!
//! The baseline cache is mutex-guarded, so one context may be shared by a
//! whole test binary. In-memory working copies are independent. File-backed
//! working copies share a path and are handed out one at a time.
//!
//! ## Stale artifacts
//!
//! A file-backed working database left behind by a crashed run is reused
//! without migrating by default. Set
//! [`StaleArtifactPolicy::VerifyVersion`] to rebuild it when its recorded
//! version is not the newest migration.

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

mod baseline;
mod cleanup;
mod config;
mod driver;
mod dump;
mod engine;
mod error;
mod fixture;
mod flags;
mod hooks;
pub mod introspect;
pub mod logging;

#[cfg(test)]
mod tests;

pub use baseline::{Baseline, BaselineBuilder};
pub use cleanup::CleanupStack;
pub use config::{
    AUTHENTICATION_FLAG, ConfigError, DEFAULT_CLEAN_DB, FixtureConfig, StaleArtifactPolicy,
    TRANSIENT_CONNECTION, Target,
};
pub use driver::{DieselMigrationDriver, MIGRATIONS_TABLE, MigrationDriver, Revision};
pub use dump::{DumpScript, quote_identifier};
pub use engine::{Engine, foreign_keys_enabled};
pub use error::FixtureError;
pub use fixture::{FixtureContext, FixtureState, WorkingCopy};
pub use flags::FlagStore;
pub use hooks::{FixtureHooks, NoHooks, SchemaDefinitions};
