// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// Errors that can occur while provisioning or releasing test databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    /// Database connection failed.
    ConnectionFailed(String),
    /// Database migration failed.
    MigrationFailed(String),
    /// Query execution failed.
    QueryFailed(String),
    /// Reading, copying, or removing a database artifact failed.
    ArtifactIo { path: PathBuf, message: String },
    /// A reused persistent artifact has no clean copy and none could be made.
    MissingCleanCopy(PathBuf),
    /// The fixture configuration is invalid.
    InvalidConfig(String),
    /// One or more cleanup actions failed during teardown.
    CleanupFailed(String),
}

impl FixtureError {
    /// Builds an [`FixtureError::ArtifactIo`] for the given path.
    pub fn artifact_io(path: &Path, err: &std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Database connection failed: {msg}"),
            Self::MigrationFailed(msg) => write!(f, "Migration failed: {msg}"),
            Self::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            Self::ArtifactIo { path, message } => {
                write!(f, "Artifact I/O failed for {}: {message}", path.display())
            }
            Self::MissingCleanCopy(path) => {
                write!(f, "Clean database copy is missing: {}", path.display())
            }
            Self::InvalidConfig(msg) => write!(f, "Invalid fixture configuration: {msg}"),
            Self::CleanupFailed(msg) => write!(f, "Cleanup failed: {msg}"),
        }
    }
}

impl std::error::Error for FixtureError {}

impl From<diesel::result::Error> for FixtureError {
    fn from(err: diesel::result::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

impl From<diesel::ConnectionError> for FixtureError {
    fn from(err: diesel::ConnectionError) -> Self {
        Self::ConnectionFailed(err.to_string())
    }
}

impl From<ConfigError> for FixtureError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
