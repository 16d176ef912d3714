// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use pristine_schema::MIGRATIONS;
use tempfile::TempDir;

use crate::introspect::row_counts;
use crate::tests::{
    CountingDriver, DriverCalls, SchemaFn, diesel_driver, goal_count, insert_goal, oldest_version,
    schema,
};
use crate::{
    DieselMigrationDriver, FixtureConfig, FixtureContext, FixtureError, FixtureState,
    MigrationDriver, Revision, StaleArtifactPolicy, Target,
};

const WORKING_DB: &str = "tests.sqlite";

fn file_config(dir: &TempDir) -> FixtureConfig {
    FixtureConfig::file_backed(dir.path(), WORKING_DB)
}

fn counting_context(
    config: FixtureConfig,
) -> (FixtureContext<CountingDriver, SchemaFn>, DriverCalls) {
    crate::logging::init_test_logging();
    let (driver, calls) = CountingDriver::new(&config.target().unwrap());
    let context = FixtureContext::new(config, driver, schema()).unwrap();
    (context, calls)
}

fn write_garbage(path: &Path) {
    fs::write(path, b"not a database ".repeat(128)).unwrap();
}

#[test]
fn test_first_set_up_migrates_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let (context, calls) = counting_context(file_config(&dir));
    let working = dir.path().join(WORKING_DB);
    let clean = dir.path().join("clean.sqlite");

    let copy = context.set_up().unwrap();

    assert_eq!(copy.path(), Some(working.as_path()));
    assert!(clean.exists());
    assert_eq!(fs::read(&working).unwrap(), fs::read(&clean).unwrap());
    assert_eq!(calls.upgrades(), 1);
    assert_eq!(calls.stamps(), 0);

    copy.tear_down().unwrap();
}

#[test]
fn test_tear_down_removes_working_file_only() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _) = counting_context(file_config(&dir));

    let mut copy = context.set_up().unwrap();
    insert_goal(copy.connection().unwrap(), "scratch");
    copy.tear_down().unwrap();

    assert!(!dir.path().join(WORKING_DB).exists());
    assert!(dir.path().join("clean.sqlite").exists());
    assert_eq!(context.state(), FixtureState::BaselineReady);
}

#[test]
fn test_each_set_up_restores_pristine_file() {
    let dir = tempfile::tempdir().unwrap();
    let (context, calls) = counting_context(file_config(&dir));

    let mut first = context.set_up().unwrap();
    insert_goal(first.connection().unwrap(), "leaked");
    assert_eq!(goal_count(first.connection().unwrap()), 1);
    first.tear_down().unwrap();

    let mut second = context.set_up().unwrap();
    let counts = row_counts(second.connection().unwrap()).unwrap();
    assert!(counts.values().all(|count| *count == 0), "{counts:?}");
    second.tear_down().unwrap();

    assert_eq!(context.baseline_builds(), 1);
    assert_eq!(calls.upgrades(), 1);
}

#[test]
fn test_custom_clean_name_and_nested_state_path() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("nested").join("state");
    let config = FixtureConfig::file_backed(&state, WORKING_DB).with_clean_db("pristine.sqlite");
    let (context, _) = counting_context(config);

    let baseline = context.baseline().unwrap();

    assert_eq!(
        baseline.clean_path(),
        Some(state.join("pristine.sqlite").as_path())
    );
    assert!(state.join(WORKING_DB).exists());
}

#[test]
fn test_existing_working_file_short_circuits_build() {
    let dir = tempfile::tempdir().unwrap();
    let working = dir.path().join(WORKING_DB);
    write_garbage(&working);
    let (context, calls) = counting_context(file_config(&dir));

    context.baseline().unwrap();

    assert_eq!(calls.upgrades(), 0);
    assert_eq!(calls.stamps(), 0);
    assert_eq!(fs::read(&working).unwrap(), b"not a database ".repeat(128));
    // The missing clean copy is seeded from the reused file.
    assert_eq!(
        fs::read(dir.path().join("clean.sqlite")).unwrap(),
        fs::read(&working).unwrap()
    );
    assert_eq!(context.baseline_builds(), 1);
}

#[test]
fn test_existing_clean_copy_is_left_alone_on_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let working = dir.path().join(WORKING_DB);
    let clean = dir.path().join("clean.sqlite");
    write_garbage(&working);
    fs::write(&clean, b"older snapshot").unwrap();
    let (context, _) = counting_context(file_config(&dir));

    context.baseline().unwrap();

    assert_eq!(fs::read(&clean).unwrap(), b"older snapshot");
}

#[test]
fn test_verify_version_rebuilds_unreadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let working = dir.path().join(WORKING_DB);
    write_garbage(&working);
    let config = file_config(&dir).with_stale_artifacts(StaleArtifactPolicy::VerifyVersion);
    let (context, calls) = counting_context(config);

    let mut copy = context.set_up().unwrap();

    assert_eq!(calls.upgrades(), 1);
    assert_eq!(goal_count(copy.connection().unwrap()), 0);
    copy.tear_down().unwrap();
}

#[test]
fn test_verify_version_rebuilds_outdated_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir).with_stale_artifacts(StaleArtifactPolicy::VerifyVersion);
    let target = config.target().unwrap();

    let mut old = diesel_driver(&target);
    old.upgrade(&Revision::Version(oldest_version())).unwrap();
    old.engine().dispose();

    let (context, calls) = counting_context(config);
    context.baseline().unwrap();
    assert_eq!(calls.upgrades(), 1);

    let mut check = diesel_driver(&target);
    assert_eq!(check.version().unwrap(), check.head().unwrap());
}

#[test]
fn test_verify_version_reuses_current_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir).with_stale_artifacts(StaleArtifactPolicy::VerifyVersion);

    let (first, first_calls) = counting_context(config.clone());
    first.baseline().unwrap();
    assert_eq!(first_calls.upgrades(), 1);
    drop(first);

    let (second, second_calls) = counting_context(config);
    second.baseline().unwrap();
    assert_eq!(second_calls.upgrades(), 0);
}

#[test]
fn test_panicking_test_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _) = counting_context(file_config(&dir));

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut copy = context.set_up().unwrap();
        insert_goal(copy.connection().unwrap(), "doomed");
        panic!("test body failed");
    }));

    assert!(outcome.is_err());
    assert!(!dir.path().join(WORKING_DB).exists());
    assert_eq!(context.state(), FixtureState::BaselineReady);

    // The working slot is usable again after the panic.
    let mut copy = context.set_up().unwrap();
    assert_eq!(goal_count(copy.connection().unwrap()), 0);
    copy.tear_down().unwrap();
}

#[test]
fn test_cleanup_failure_is_reported_after_all_actions_run() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _) = counting_context(file_config(&dir));

    let mut copy = context.set_up().unwrap();
    copy.connection().unwrap();
    fs::remove_file(dir.path().join(WORKING_DB)).unwrap();

    let err = copy.tear_down().unwrap_err();

    match err {
        FixtureError::CleanupFailed(message) => {
            assert!(message.contains("remove working database"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(context.state(), FixtureState::BaselineReady);
}

#[test]
fn test_with_migrations_resolves_file_target() {
    let dir = tempfile::tempdir().unwrap();
    let context: FixtureContext<DieselMigrationDriver, SchemaFn> =
        FixtureContext::with_migrations(file_config(&dir), MIGRATIONS, schema()).unwrap();

    assert_eq!(
        context.target(),
        &Target::Persistent {
            working: dir.path().join(WORKING_DB),
            clean: dir.path().join("clean.sqlite"),
        }
    );

    let copy = context.set_up().unwrap();
    assert!(copy.path().is_some_and(Path::exists));
    copy.tear_down().unwrap();
}
