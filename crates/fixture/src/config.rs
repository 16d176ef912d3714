// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Fixture configuration and target resolution.
//!
//! Loading configuration (files, environment) is left to the caller. This
//! module only describes the values the fixture needs and validates them
//! into a [`Target`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::FlagStore;

/// Connection string selecting a private in-memory database.
pub const TRANSIENT_CONNECTION: &str = "sqlite://";

/// Prefix of connection strings selecting a file-backed database.
const PERSISTENT_PREFIX: &str = "sqlite:///";

/// Default file name of the clean copy kept next to the working database.
pub const DEFAULT_CLEAN_DB: &str = "clean.sqlite";

/// Feature flag disabled for every database test by default.
pub const AUTHENTICATION_FLAG: &str = "enable_authentication";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The connection string names a backend the fixture cannot manage.
    #[error("unsupported connection '{0}': expected 'sqlite://' or 'sqlite:///<path>'")]
    UnsupportedConnection(String),

    /// A file-backed connection was configured without a working file name.
    #[error("'sqlite_db' must name the working database file for file-backed fixtures")]
    MissingWorkingDb,

    /// The working and clean copies would overwrite each other.
    #[error("working and clean database paths are identical: {}", .0.display())]
    OverlappingPaths(PathBuf),
}

/// What to do when a file-backed working database already exists at build time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleArtifactPolicy {
    /// Trust the existing file and skip migration entirely.
    #[default]
    Reuse,
    /// Reuse only if the file's recorded schema version matches the latest
    /// known migration; otherwise delete it and rebuild.
    VerifyVersion,
}

/// Resolved database target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Private in-memory database; the baseline is a statement dump.
    Transient,
    /// File-backed database; the baseline is a copy of the migrated file.
    Persistent {
        /// Path tests connect to.
        working: PathBuf,
        /// Path of the pristine copy restored before every test.
        clean: PathBuf,
    },
}

/// Settings consumed by the fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// `sqlite://` for in-memory, `sqlite:///<anything>` for file-backed.
    pub connection: String,
    /// Directory holding file-backed artifacts.
    pub state_path: PathBuf,
    /// Working database file name, relative to `state_path`.
    pub sqlite_db: String,
    /// Clean copy file name, relative to `state_path`.
    pub sqlite_clean_db: String,
    /// Feature flags forced before a working copy is handed out.
    pub overrides: BTreeMap<String, bool>,
    /// Handling of working files left behind by an earlier run.
    pub stale_artifacts: StaleArtifactPolicy,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert(AUTHENTICATION_FLAG.to_string(), false);

        Self {
            connection: TRANSIENT_CONNECTION.to_string(),
            state_path: PathBuf::from("."),
            sqlite_db: String::new(),
            sqlite_clean_db: DEFAULT_CLEAN_DB.to_string(),
            overrides,
            stale_artifacts: StaleArtifactPolicy::Reuse,
        }
    }
}

impl FixtureConfig {
    /// Configuration for an in-memory fixture.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-backed fixture storing `sqlite_db` and its
    /// clean copy under `state_path`.
    #[must_use]
    pub fn file_backed(state_path: impl Into<PathBuf>, sqlite_db: impl Into<String>) -> Self {
        let sqlite_db = sqlite_db.into();
        Self {
            connection: format!("{PERSISTENT_PREFIX}{sqlite_db}"),
            state_path: state_path.into(),
            sqlite_db,
            ..Self::default()
        }
    }

    /// Overrides the clean copy file name.
    #[must_use]
    pub fn with_clean_db(mut self, name: impl Into<String>) -> Self {
        self.sqlite_clean_db = name.into();
        self
    }

    /// Forces a feature flag to `value` before each test.
    #[must_use]
    pub fn with_override(mut self, flag: impl Into<String>, value: bool) -> Self {
        self.overrides.insert(flag.into(), value);
        self
    }

    /// Sets the policy for working files left by an earlier run.
    #[must_use]
    pub const fn with_stale_artifacts(mut self, policy: StaleArtifactPolicy) -> Self {
        self.stale_artifacts = policy;
        self
    }

    /// Resolves `name` relative to the state directory.
    #[must_use]
    pub fn state_path_rel(&self, name: impl AsRef<Path>) -> PathBuf {
        self.state_path.join(name)
    }

    /// Validates the configuration and resolves the database target.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is not a supported `SQLite`
    /// form, if a file-backed target has no working file name, or if the
    /// working and clean paths coincide.
    pub fn target(&self) -> Result<Target, ConfigError> {
        let connection = self.connection.trim();

        if connection == TRANSIENT_CONNECTION || connection == ":memory:" {
            return Ok(Target::Transient);
        }

        if !connection.starts_with(PERSISTENT_PREFIX) {
            return Err(ConfigError::UnsupportedConnection(connection.to_string()));
        }

        if self.sqlite_db.trim().is_empty() {
            return Err(ConfigError::MissingWorkingDb);
        }

        let working = self.state_path_rel(&self.sqlite_db);
        let clean = self.state_path_rel(&self.sqlite_clean_db);
        if working == clean {
            return Err(ConfigError::OverlappingPaths(working));
        }

        Ok(Target::Persistent { working, clean })
    }

    /// Applies every configured flag override to `store`.
    pub fn apply_overrides(&self, store: &mut dyn FlagStore) {
        for (flag, value) in &self.overrides {
            store.set_flag(flag, *value);
        }
    }
}
