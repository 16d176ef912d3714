// Copyright (C) 2024-2025 Fred Clausen and the ratatui project contributors
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! # xtask - Project Automation
//!
//! Besides the usual build, lint, and test wrappers, this xtask carries
//! three fixture-specific commands:
//!
//! - `cargo xtask verify-schema` migrates one in-memory database, creates
//!   another from the model definitions, and fails if their structure
//!   differs
//! - `cargo xtask dump-baseline` prints the in-memory baseline script that
//!   every test's working copy is restored from
//! - `cargo xtask clean-artifacts` removes file-backed working and clean
//!   databases left behind by an interrupted run
//!
//! None of these need external services; everything runs against `SQLite`.

#![deny(
    clippy::pedantic,
    //clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all
)]

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Output,
};

use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use color_eyre::{
    eyre::{bail, eyre, Context},
    Result,
};
use duct::cmd;
use pristine::introspect::introspect;
use pristine::{
    DieselMigrationDriver, Engine, FixtureConfig, FixtureContext, MigrationDriver, Revision,
    Target, DEFAULT_CLEAN_DB,
};
use pristine_schema::{create_all, MIGRATIONS, MODEL_TABLES};
use tracing::level_filters::LevelFilter;
use tracing_log::AsTrace;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .without_time()
        .init();

    match args.run() {
        Ok(()) => (),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(bin_name = "cargo xtask", styles = clap_cargo::style::CLAP_STYLING)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

impl Args {
    fn run(self) -> Result<()> {
        self.command.run()
    }

    fn log_level(&self) -> LevelFilter {
        self.verbosity.log_level_filter().as_trace()
    }
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Run CI checks (lint, build, test, schema parity)
    CI,

    /// Build the project
    #[command(visible_alias = "b")]
    Build,

    /// Run cargo check
    #[command(visible_alias = "c")]
    Check,

    /// Generate code coverage report
    #[command(visible_alias = "cov")]
    Coverage,

    /// Check dependencies
    #[command(visible_alias = "cd")]
    Deny,

    // Check unused dependencies
    #[command(visible_alias = "m")]
    Machete,

    /// Lint formatting, typos, clippy, and docs
    #[command(visible_alias = "l")]
    Lint,

    /// Run clippy on the project
    #[command(visible_alias = "cl")]
    LintClippy,

    /// Check documentation for errors and warnings
    #[command(visible_alias = "d")]
    LintDocs,

    /// Check for formatting issues in the project
    #[command(visible_alias = "lf")]
    LintFormatting,

    /// Lint markdown files
    #[command(visible_alias = "md")]
    LintMarkdown,

    /// Check for typos in the project
    #[command(visible_alias = "lt")]
    LintTypos,

    /// Fix clippy warnings in the project
    #[command(visible_alias = "fc")]
    FixClippy,

    /// Fix formatting issues in the project
    #[command(visible_alias = "fmt")]
    FixFormatting,

    /// Fix typos in the project
    #[command(visible_alias = "typos")]
    FixTypos,

    /// Run tests
    #[command(visible_alias = "t")]
    Test,

    /// Run doc tests
    #[command(visible_alias = "td")]
    TestDocs,

    /// Run lib tests
    #[command(visible_alias = "tl")]
    TestLibs,

    /// Verify that migrations and model definitions build the same schema
    #[command(visible_alias = "vs")]
    VerifySchema,

    /// Print the in-memory baseline script
    #[command(visible_alias = "db")]
    DumpBaseline {
        /// Emit the statement list as JSON instead of SQL text
        #[arg(long)]
        json: bool,
    },

    /// Remove file-backed fixture databases left by an earlier run
    #[command(visible_alias = "ca")]
    CleanArtifacts {
        /// Directory holding the fixture databases
        #[arg(long)]
        state_path: PathBuf,

        /// Working database file name; kept if omitted
        #[arg(long)]
        db: Option<String>,

        /// Clean copy file name
        #[arg(long, default_value = DEFAULT_CLEAN_DB)]
        clean_db: String,
    },
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Self::CI => ci(),
            Self::Build => build(),
            Self::Check => check(),
            Self::Deny => deny(),
            Self::Machete => machete(),
            Self::Coverage => coverage(),
            Self::Lint => lint(),
            Self::LintClippy => lint_clippy(),
            Self::LintDocs => lint_docs(),
            Self::LintFormatting => lint_format(),
            Self::LintTypos => lint_typos(),
            Self::LintMarkdown => lint_markdown(),
            Self::FixClippy => fix_clippy(),
            Self::FixFormatting => fix_format(),
            Self::FixTypos => fix_typos(),
            Self::Test => test(),
            Self::TestDocs => test_docs(),
            Self::TestLibs => test_libs(),
            Self::VerifySchema => verify_schema(),
            Self::DumpBaseline { json } => dump_baseline(json),
            Self::CleanArtifacts {
                state_path,
                db,
                clean_db,
            } => clean_artifacts(&state_path, db, clean_db),
        }
    }
}

/// Run CI checks (lint, build, test, schema parity)
fn ci() -> Result<()> {
    lint()?;
    deny()?;
    machete()?;
    build()?;
    test()?;
    verify_schema()?;
    Ok(())
}

fn deny() -> Result<()> {
    run_cargo(vec!["deny", "check"])
}

fn machete() -> Result<()> {
    cmd!("cargo-machete").run_with_trace()?;
    Ok(())
}

/// Build the project
fn build() -> Result<()> {
    run_cargo(vec!["build", "--all-targets", "--all-features"])
}

/// Run cargo check
fn check() -> Result<()> {
    run_cargo(vec!["check", "--all-targets", "--all-features"])
}

/// Generate code coverage report
fn coverage() -> Result<()> {
    run_cargo(vec![
        "llvm-cov",
        "--lcov",
        "--output-path",
        "target/lcov.info",
        "--all-features",
    ])
}

/// Lint formatting, typos, clippy, and docs (and a soft fail on markdown)
fn lint() -> Result<()> {
    lint_clippy()?;
    lint_docs()?;
    lint_format()?;
    lint_typos()?;
    if let Err(err) = lint_markdown() {
        tracing::warn!("markdownlint failed; not treated as fatal: {err}");
    }
    Ok(())
}

/// Run clippy on the project
fn lint_clippy() -> Result<()> {
    run_cargo(vec![
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ])
}

/// Fix clippy warnings in the project
fn fix_clippy() -> Result<()> {
    run_cargo(vec![
        "clippy",
        "--all-targets",
        "--all-features",
        "--fix",
        "--allow-dirty",
        "--allow-staged",
        "--",
        "-D",
        "warnings",
    ])
}

/// Check that docs build without errors using docs.rs-equivalent flags
fn lint_docs() -> Result<()> {
    let meta = MetadataCommand::new()
        .exec()
        .wrap_err("failed to get cargo metadata")?;

    for package in meta.workspace_default_packages() {
        cmd(
            "cargo",
            [
                "doc",
                "--no-deps",
                "--all-features",
                "--package",
                &package.name,
            ],
        )
        .env_remove("CARGO")
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .env("RUSTDOCFLAGS", "--cfg docsrs -D warnings")
        .run_with_trace()?;
    }

    Ok(())
}

/// Lint formatting issues in the project
fn lint_format() -> Result<()> {
    run_cargo_nightly(vec!["fmt", "--all", "--check"])
}

/// Fix formatting issues in the project
fn fix_format() -> Result<()> {
    run_cargo_nightly(vec!["fmt", "--all"])
}

/// Lint markdown files using [markdownlint-cli2](https://github.com/DavidAnson/markdownlint-cli2)
fn lint_markdown() -> Result<()> {
    cmd!("markdownlint-cli2", "**/*.md", "!target", "!**/target").run_with_trace()?;

    Ok(())
}

/// Check for typos in the project using [typos-cli](https://github.com/crate-ci/typos/)
fn lint_typos() -> Result<()> {
    cmd!("typos").run_with_trace()?;
    Ok(())
}

/// Fix typos in the project
fn fix_typos() -> Result<()> {
    cmd!("typos", "-w").run_with_trace()?;
    Ok(())
}

/// Run tests for libs and docs
fn test() -> Result<()> {
    test_libs()?;
    test_docs()?; // run last because it's slow
    Ok(())
}

/// Run doc tests for the workspace's default packages
fn test_docs() -> Result<()> {
    run_cargo(vec!["test", "--doc", "--all-features"])
}

/// Run lib tests for the workspace's default packages
fn test_libs() -> Result<()> {
    run_cargo(vec!["test", "--all-targets", "--all-features"])
}

/// Run a cargo subcommand with the default toolchain
fn run_cargo(args: Vec<&str>) -> Result<()> {
    cmd("cargo", args).run_with_trace()?;
    Ok(())
}

/// Run a cargo subcommand with the nightly toolchain
fn run_cargo_nightly(args: Vec<&str>) -> Result<()> {
    cmd("cargo", args)
        // CARGO env var is set because we're running in a cargo subcommand
        .env_remove("CARGO")
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .run_with_trace()?;
    Ok(())
}

/// Verify schema parity between the migration history and the model
/// definitions.
///
/// In-memory fixtures skip the migration history and create the schema
/// straight from the models, so the two must never drift apart. Both
/// databases are introspected and compared on:
///
/// - table set
/// - column names, normalized types, and nullability
/// - primary keys
/// - foreign keys
/// - unique constraints
/// - named indexes
///
/// The Diesel bookkeeping table is ignored.
fn verify_schema() -> Result<()> {
    tracing::info!("Starting schema parity verification");

    let mut driver = DieselMigrationDriver::new(Engine::transient(), MIGRATIONS);
    driver
        .upgrade(&Revision::Head)
        .wrap_err("Failed to apply migrations")?;
    let migrated = introspect(driver.engine().connect()?)
        .wrap_err("Failed to introspect migrated schema")?;

    let mut modeled = Engine::transient();
    create_all(modeled.connect()?).wrap_err("Failed to create schema from models")?;
    let models =
        introspect(modeled.connect()?).wrap_err("Failed to introspect model schema")?;

    let mut expected: Vec<&str> = MODEL_TABLES.to_vec();
    expected.sort_unstable();
    if migrated.table_names() != expected {
        bail!(
            "Migrated tables {:?} do not match model tables {:?}",
            migrated.table_names(),
            expected
        );
    }

    let differences = migrated.diff(&models);
    if !differences.is_empty() {
        for difference in &differences {
            tracing::error!("{difference}");
        }
        return Err(eyre!(
            "Schema parity check failed with {} difference(s)",
            differences.len()
        ));
    }

    tracing::info!(
        tables = migrated.tables.len(),
        "Migrations and model definitions agree"
    );
    Ok(())
}

/// Print the in-memory baseline script to stdout
fn dump_baseline(json: bool) -> Result<()> {
    let context =
        FixtureContext::with_migrations(FixtureConfig::in_memory(), MIGRATIONS, create_all)?;
    let baseline = context.baseline().wrap_err("Failed to build baseline")?;
    let script = baseline
        .script()
        .ok_or_else(|| eyre!("In-memory fixture produced a file-backed baseline"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(script)?);
    } else {
        println!("{}", script.to_sql());
    }

    tracing::info!(statements = script.len(), "Dumped baseline");
    Ok(())
}

/// Remove file-backed fixture databases left by an earlier run
fn clean_artifacts(state_path: &Path, db: Option<String>, clean_db: String) -> Result<()> {
    let paths = match db {
        Some(db) => {
            let config = FixtureConfig::file_backed(state_path, db).with_clean_db(clean_db);
            let Target::Persistent { working, clean } = config.target()? else {
                bail!("Artifact cleanup needs a file-backed configuration");
            };
            vec![working, clean]
        }
        None => vec![state_path.join(clean_db)],
    };

    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => tracing::info!("Removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("Not present: {}", path.display());
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("Failed to remove {}", path.display()));
            }
        }
    }

    Ok(())
}

/// An extension trait for `duct::Expression` that logs the command being run
/// before running it.
trait ExpressionExt {
    /// Run the command and log the command being run
    fn run_with_trace(&self) -> io::Result<Output>;
}

impl ExpressionExt for duct::Expression {
    fn run_with_trace(&self) -> io::Result<Output> {
        tracing::info!("running command: {:?}", self);
        self.run().inspect_err(|_| {
            // The command that was run may have scrolled off the screen, so repeat it here
            tracing::error!("failed to run command: {:?}", self);
        })
    }
}
