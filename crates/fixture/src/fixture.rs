// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The fixture controller.
//!
//! A [`FixtureContext`] owns the baseline cache for one suite of tests.
//! Each test calls [`FixtureContext::set_up`] and receives a
//! [`WorkingCopy`] restored from the baseline; the working copy's cleanup
//! actions run on [`WorkingCopy::tear_down`] or, if the test never got that
//! far, when it is dropped.
//!
//! The context is `Sync` whenever its driver is `Send` and its schema and
//! hooks are `Sync`, so a single context may back a whole test binary
//! through a `LazyLock` static. The baseline is built exactly once even when
//! tests race for it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use diesel::SqliteConnection;
use diesel::migration::MigrationSource;
use diesel::sqlite::Sqlite;
use tracing::{debug, error, info};

use crate::baseline::{Baseline, BaselineBuilder};
use crate::cleanup::CleanupStack;
use crate::config::{FixtureConfig, Target};
use crate::driver::{DieselMigrationDriver, MigrationDriver};
use crate::engine::Engine;
use crate::error::FixtureError;
use crate::flags::FlagStore;
use crate::hooks::{FixtureHooks, NoHooks, SchemaDefinitions};

/// Lifecycle of a [`FixtureContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// No baseline has been built yet.
    Uninitialized,
    /// A baseline is cached and no working copy is live.
    BaselineReady,
    /// At least one working copy is live.
    WorkingCopyActive,
}

struct Cache<D> {
    driver: D,
    baseline: Option<Arc<Baseline>>,
    builds: usize,
}

/// Build-once, restore-per-test database fixture.
pub struct FixtureContext<D, S, H = NoHooks> {
    config: FixtureConfig,
    builder: BaselineBuilder,
    schema: S,
    hooks: H,
    cache: Mutex<Cache<D>>,
    working_slot: Mutex<()>,
    active: AtomicUsize,
}

impl<M, S> FixtureContext<DieselMigrationDriver<M>, S, NoHooks>
where
    M: MigrationSource<Sqlite>,
    S: SchemaDefinitions,
{
    /// Creates a context migrating with embedded Diesel migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_migrations(
        config: FixtureConfig,
        migrations: M,
        schema: S,
    ) -> Result<Self, FixtureError> {
        let driver = DieselMigrationDriver::for_target(&config.target()?, migrations)?;
        Self::new(config, driver, schema)
    }
}

impl<D, S> FixtureContext<D, S, NoHooks>
where
    D: MigrationDriver,
    S: SchemaDefinitions,
{
    /// Creates a context around an existing driver.
    ///
    /// The driver's engine must point at the configured target.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: FixtureConfig, driver: D, schema: S) -> Result<Self, FixtureError> {
        let builder = BaselineBuilder::from_config(&config)?;
        Ok(Self {
            config,
            builder,
            schema,
            hooks: NoHooks,
            cache: Mutex::new(Cache {
                driver,
                baseline: None,
                builds: 0,
            }),
            working_slot: Mutex::new(()),
            active: AtomicUsize::new(0),
        })
    }
}

impl<D, S, H> FixtureContext<D, S, H>
where
    D: MigrationDriver,
    S: SchemaDefinitions,
    H: FixtureHooks,
{
    /// Replaces the build hooks.
    #[must_use]
    pub fn with_hooks<H2: FixtureHooks>(self, hooks: H2) -> FixtureContext<D, S, H2> {
        let Self {
            config,
            builder,
            schema,
            cache,
            working_slot,
            active,
            hooks: _,
        } = self;

        FixtureContext {
            config,
            builder,
            schema,
            hooks,
            cache,
            working_slot,
            active,
        }
    }

    /// The configuration this context was created with.
    #[must_use]
    pub const fn config(&self) -> &FixtureConfig {
        &self.config
    }

    /// The resolved database target.
    #[must_use]
    pub const fn target(&self) -> &Target {
        self.builder.target()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FixtureState {
        if self.active.load(Ordering::SeqCst) > 0 {
            FixtureState::WorkingCopyActive
        } else if self.lock_cache().baseline.is_some() {
            FixtureState::BaselineReady
        } else {
            FixtureState::Uninitialized
        }
    }

    /// Number of successful baseline builds. Never exceeds one.
    #[must_use]
    pub fn baseline_builds(&self) -> usize {
        self.lock_cache().builds
    }

    /// Returns the cached baseline, building it first if necessary.
    ///
    /// A failed build leaves the cache empty, so the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline cannot be built.
    pub fn baseline(&self) -> Result<Arc<Baseline>, FixtureError> {
        let mut cache = self.lock_cache();
        if let Some(baseline) = &cache.baseline {
            return Ok(Arc::clone(baseline));
        }

        info!(target = ?self.builder.target(), "Building baseline database");
        let baseline = match self
            .builder
            .build(&mut cache.driver, &self.schema, &self.hooks)?
        {
            Some(baseline) => baseline,
            None => Baseline::adopt_existing(self.builder.target())?,
        };

        let baseline = Arc::new(baseline);
        cache.baseline = Some(Arc::clone(&baseline));
        cache.builds += 1;
        Ok(baseline)
    }

    /// Restores a fresh working copy from the baseline.
    ///
    /// File-backed working copies share one path; this call blocks while
    /// another file-backed working copy from this context is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline cannot be built or restored.
    pub fn set_up(&self) -> Result<WorkingCopy<'_>, FixtureError> {
        let baseline = self.baseline()?;

        match baseline.as_ref() {
            Baseline::Script(script) => {
                let mut engine = Engine::transient();
                script.replay(engine.connect()?)?;

                let mut cleanups = CleanupStack::new();
                cleanups.push("dispose engine", |engine: &mut Engine| {
                    engine.dispose();
                    Ok(())
                });

                debug!("Restored in-memory working copy");
                Ok(WorkingCopy::new(engine, cleanups, None, None, &self.active))
            }
            Baseline::File { working, clean } => {
                let slot = self
                    .working_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let engine = Engine::file(working)?;

                fs::copy(clean, working).map_err(|e| FixtureError::artifact_io(working, &e))?;

                let mut cleanups = CleanupStack::new();
                let path = working.clone();
                cleanups.push("remove working database", move |_: &mut Engine| {
                    fs::remove_file(&path).map_err(|e| FixtureError::artifact_io(&path, &e))
                });
                cleanups.push("dispose engine", |engine: &mut Engine| {
                    engine.dispose();
                    Ok(())
                });

                debug!(path = %working.display(), "Restored file-backed working copy");
                Ok(WorkingCopy::new(
                    engine,
                    cleanups,
                    Some(working.clone()),
                    Some(slot),
                    &self.active,
                ))
            }
        }
    }

    /// Applies the configured flag overrides to `flags`, then calls
    /// [`Self::set_up`].
    ///
    /// # Errors
    ///
    /// Returns an error if the working copy cannot be restored.
    pub fn set_up_with_flags(
        &self,
        flags: &mut dyn FlagStore,
    ) -> Result<WorkingCopy<'_>, FixtureError> {
        self.config.apply_overrides(flags);
        self.set_up()
    }

    fn lock_cache(&self) -> MutexGuard<'_, Cache<D>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live database owned by exactly one test.
pub struct WorkingCopy<'ctx> {
    engine: Engine,
    cleanups: CleanupStack<Engine>,
    path: Option<PathBuf>,
    active: &'ctx AtomicUsize,
    released: bool,
    // Dropped after the cleanups have run.
    _slot: Option<MutexGuard<'ctx, ()>>,
}

impl std::fmt::Debug for WorkingCopy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("engine", &self.engine)
            .field("cleanups", &self.cleanups)
            .field("path", &self.path)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<'ctx> WorkingCopy<'ctx> {
    fn new(
        engine: Engine,
        cleanups: CleanupStack<Engine>,
        path: Option<PathBuf>,
        slot: Option<MutexGuard<'ctx, ()>>,
        active: &'ctx AtomicUsize,
    ) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            engine,
            cleanups,
            path,
            active,
            released: false,
            _slot: slot,
        }
    }

    /// Connection to the working copy.
    ///
    /// # Errors
    ///
    /// Returns an error if a file-backed working copy cannot be opened.
    pub fn connection(&mut self) -> Result<&mut SqliteConnection, FixtureError> {
        self.engine.connect()
    }

    /// The working copy's engine.
    pub const fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Path of the working file, for file-backed working copies.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Registers an extra action to run at teardown, before every action
    /// registered earlier.
    pub fn add_cleanup<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce(&mut Engine) -> Result<(), FixtureError> + 'static,
    {
        self.cleanups.push(label, action);
    }

    /// Releases the working copy.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::CleanupFailed`] if any cleanup action failed.
    /// Every action has still been attempted.
    pub fn tear_down(mut self) -> Result<(), FixtureError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), FixtureError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = self.cleanups.run_all(&mut self.engine);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Drop for WorkingCopy<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(%err, "Working copy cleanup failed during drop");
        }
    }
}
