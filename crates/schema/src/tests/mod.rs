// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_migrations::MigrationHarness;

use crate::diesel_schema::{audits, goals, strategies};
use crate::{MIGRATIONS, MODEL_TABLES, create_all};

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn user_tables(conn: &mut SqliteConnection) -> Vec<String> {
    diesel::sql_query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         AND name != '__diesel_schema_migrations' ORDER BY name",
    )
    .load::<TableName>(conn)
    .unwrap()
    .into_iter()
    .map(|t| t.name)
    .collect()
}

fn expected_tables() -> Vec<String> {
    let mut tables: Vec<String> = MODEL_TABLES.iter().map(ToString::to_string).collect();
    tables.sort();
    tables
}

#[test]
fn test_create_all_creates_every_model_table() {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    create_all(&mut conn).unwrap();

    assert_eq!(user_tables(&mut conn), expected_tables());
}

#[test]
fn test_create_all_twice_fails() {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    create_all(&mut conn).unwrap();

    assert!(
        create_all(&mut conn).is_err(),
        "create_all must not silently succeed on an existing schema"
    );
}

#[test]
fn test_migrations_create_every_model_table() {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();

    assert_eq!(user_tables(&mut conn), expected_tables());
}

#[test]
fn test_migrated_schema_accepts_model_rows() {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();

    diesel::insert_into(goals::table)
        .values((
            goals::uuid.eq("6b1a3e2c-0000-4000-8000-000000000001"),
            goals::name.eq("server_consolidation"),
            goals::display_name.eq("Server Consolidation"),
        ))
        .execute(&mut conn)
        .unwrap();
    let goal_id: i64 = goals::table
        .select(goals::goal_id)
        .first(&mut conn)
        .unwrap();

    diesel::insert_into(strategies::table)
        .values((
            strategies::uuid.eq("6b1a3e2c-0000-4000-8000-000000000002"),
            strategies::name.eq("basic"),
            strategies::display_name.eq("Basic offline consolidation"),
            strategies::goal_id.eq(goal_id),
        ))
        .execute(&mut conn)
        .unwrap();

    diesel::insert_into(audits::table)
        .values((
            audits::uuid.eq("6b1a3e2c-0000-4000-8000-000000000003"),
            audits::audit_type.eq("ONESHOT"),
            audits::goal_id.eq(goal_id),
            audits::name.eq(Some("nightly")),
        ))
        .execute(&mut conn)
        .unwrap();

    let state: String = audits::table
        .select(audits::state)
        .first(&mut conn)
        .unwrap();
    assert_eq!(state, "PENDING");

    let audits_count = diesel::sql_query("SELECT COUNT(*) AS count FROM audits")
        .get_result::<CountRow>(&mut conn)
        .unwrap()
        .count;
    assert_eq!(audits_count, 1);
}
