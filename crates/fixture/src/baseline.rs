// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Baseline construction.
//!
//! The [`BaselineBuilder`] migrates a database once and captures it as a
//! [`Baseline`]:
//!
//! - in-memory targets are dumped to a [`DumpScript`]
//! - file-backed targets are copied byte for byte to a clean path
//!
//! A file-backed working database left behind by an earlier run
//! short-circuits the build. Whether that file is trusted blindly or checked
//! against the newest migration is governed by [`StaleArtifactPolicy`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{FixtureConfig, StaleArtifactPolicy, Target};
use crate::driver::{MigrationDriver, Revision};
use crate::dump::DumpScript;
use crate::error::FixtureError;
use crate::hooks::{FixtureHooks, SchemaDefinitions};

/// An immutable, fully migrated starting point for working copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Statement dump of an in-memory database.
    Script(DumpScript),
    /// Byte-exact copy of a migrated database file.
    File {
        /// Path working copies are restored to.
        working: PathBuf,
        /// Path of the pristine copy.
        clean: PathBuf,
    },
}

impl Baseline {
    /// Adopts the artifacts of an earlier run for a file-backed target.
    ///
    /// If the clean copy is missing it is seeded from the existing working
    /// file, which is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error for in-memory targets, if neither file exists, or if
    /// seeding the clean copy fails.
    pub fn adopt_existing(target: &Target) -> Result<Self, FixtureError> {
        let Target::Persistent { working, clean } = target else {
            return Err(FixtureError::InvalidConfig(
                "in-memory targets have no artifact to adopt".to_string(),
            ));
        };

        if !clean.exists() {
            if !working.exists() {
                return Err(FixtureError::MissingCleanCopy(clean.clone()));
            }
            warn!(
                working = %working.display(),
                clean = %clean.display(),
                "Seeding missing clean copy from existing working database"
            );
            fs::copy(working, clean).map_err(|e| FixtureError::artifact_io(clean, &e))?;
        }

        Ok(Self::File {
            working: working.clone(),
            clean: clean.clone(),
        })
    }

    /// The dump script, for in-memory baselines.
    #[must_use]
    pub const fn script(&self) -> Option<&DumpScript> {
        match self {
            Self::Script(script) => Some(script),
            Self::File { .. } => None,
        }
    }

    /// The clean copy path, for file-backed baselines.
    #[must_use]
    pub fn clean_path(&self) -> Option<&Path> {
        match self {
            Self::Script(_) => None,
            Self::File { clean, .. } => Some(clean),
        }
    }
}

/// Migrates a target once and captures it as a [`Baseline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineBuilder {
    target: Target,
    stale_artifacts: StaleArtifactPolicy,
}

impl BaselineBuilder {
    /// Creates a builder for `target`.
    #[must_use]
    pub const fn new(target: Target, stale_artifacts: StaleArtifactPolicy) -> Self {
        Self {
            target,
            stale_artifacts,
        }
    }

    /// Creates a builder from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not resolve to a target.
    pub fn from_config(config: &FixtureConfig) -> Result<Self, FixtureError> {
        Ok(Self::new(config.target()?, config.stale_artifacts))
    }

    /// The target this builder migrates.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Builds the baseline.
    ///
    /// Returns `Ok(None)` when a file-backed working database from an
    /// earlier run is reused; nothing is migrated or copied in that case.
    /// The driver's engine holds no connection when this returns, whether it
    /// succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns an error if migration, the post-migration hook, or capturing
    /// the baseline fails.
    pub fn build<D, S, H>(
        &self,
        driver: &mut D,
        schema: &S,
        hooks: &H,
    ) -> Result<Option<Baseline>, FixtureError>
    where
        D: MigrationDriver + ?Sized,
        S: SchemaDefinitions + ?Sized,
        H: FixtureHooks + ?Sized,
    {
        driver.engine().dispose();

        let built = match &self.target {
            Target::Transient => Self::build_transient(driver, schema, hooks).map(Some),
            Target::Persistent { working, clean } => {
                self.build_persistent(driver, hooks, working, clean)
            }
        };

        driver.engine().dispose();
        built
    }

    fn build_transient<D, S, H>(
        driver: &mut D,
        schema: &S,
        hooks: &H,
    ) -> Result<Baseline, FixtureError>
    where
        D: MigrationDriver + ?Sized,
        S: SchemaDefinitions + ?Sized,
        H: FixtureHooks + ?Sized,
    {
        if driver.version()?.is_none() {
            info!("Creating in-memory schema from model definitions");
            schema.create_all(driver.engine().connect()?)?;
            driver.stamp(&Revision::Head)?;
        } else {
            driver.upgrade(&Revision::Head)?;
        }

        hooks.post_migrations(driver.engine().connect()?)?;

        let script = DumpScript::capture(driver.engine().connect()?)?;
        info!(statements = script.len(), "Captured in-memory baseline");
        Ok(Baseline::Script(script))
    }

    fn build_persistent<D, H>(
        &self,
        driver: &mut D,
        hooks: &H,
        working: &Path,
        clean: &Path,
    ) -> Result<Option<Baseline>, FixtureError>
    where
        D: MigrationDriver + ?Sized,
        H: FixtureHooks + ?Sized,
    {
        if working.exists() {
            if self.reuse_existing(driver)? {
                warn!(
                    path = %working.display(),
                    "Reusing existing working database; migrations skipped"
                );
                return Ok(None);
            }
            remove_if_exists(working)?;
            remove_if_exists(clean)?;
        }

        if let Some(parent) = working.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FixtureError::artifact_io(parent, &e))?;
        }

        info!(path = %working.display(), "Migrating file-backed database");
        driver.upgrade(&Revision::Head)?;
        hooks.post_migrations(driver.engine().connect()?)?;

        // Close the file before copying it.
        driver.engine().dispose();
        fs::copy(working, clean).map_err(|e| FixtureError::artifact_io(clean, &e))?;
        info!(clean = %clean.display(), "Captured file-backed baseline");

        Ok(Some(Baseline::File {
            working: working.to_path_buf(),
            clean: clean.to_path_buf(),
        }))
    }

    /// Decides whether an existing working file may be reused as is.
    fn reuse_existing<D>(&self, driver: &mut D) -> Result<bool, FixtureError>
    where
        D: MigrationDriver + ?Sized,
    {
        match self.stale_artifacts {
            StaleArtifactPolicy::Reuse => Ok(true),
            StaleArtifactPolicy::VerifyVersion => {
                let recorded = driver.version();
                driver.engine().dispose();
                let head = driver.head()?;

                match recorded {
                    Ok(version) if version == head => Ok(true),
                    Ok(version) => {
                        warn!(
                            recorded = ?version,
                            head = ?head,
                            "Existing working database is out of date; rebuilding"
                        );
                        Ok(false)
                    }
                    Err(err) => {
                        warn!(%err, "Existing working database is unreadable; rebuilding");
                        Ok(false)
                    }
                }
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<(), FixtureError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FixtureError::artifact_io(path, &e)),
    }
}
