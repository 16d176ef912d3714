// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::QueryableByName;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use pristine_schema::create_all;

use crate::introspect::{introspect, row_counts};
use crate::tests::{goal_count, insert_goal};
use crate::{DumpScript, Engine, FixtureError};

#[derive(QueryableByName, Debug, PartialEq, Eq)]
struct GoalText {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    efficacy_specification: Option<String>,
}

fn load_goal_text(conn: &mut SqliteConnection) -> Vec<GoalText> {
    diesel::sql_query("SELECT name, efficacy_specification FROM goals ORDER BY goal_id")
        .load(conn)
        .unwrap()
}

#[test]
fn test_empty_database_dumps_to_bare_transaction() {
    let mut engine = Engine::transient();
    let script = DumpScript::capture(engine.connect().unwrap()).unwrap();

    assert_eq!(script.statements(), ["BEGIN TRANSACTION;", "COMMIT;"]);
}

#[test]
fn test_tables_precede_indexes() {
    let mut engine = Engine::transient();
    create_all(engine.connect().unwrap()).unwrap();

    let script = DumpScript::capture(engine.connect().unwrap()).unwrap();
    let statements = script.statements();

    let goals_at = statements
        .iter()
        .position(|s| s.starts_with("CREATE TABLE goals"))
        .unwrap();
    let index_at = statements
        .iter()
        .position(|s| s.starts_with("CREATE INDEX idx_audits_state"))
        .unwrap();

    assert!(goals_at < index_at, "table DDL must come before index DDL");
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN TRANSACTION;"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT;"));
}

#[test]
fn test_round_trip_reproduces_schema_and_rows() {
    let mut source = Engine::transient();
    let conn = source.connect().unwrap();
    create_all(conn).unwrap();
    insert_goal(conn, "dummy");
    conn.batch_execute(
        "INSERT INTO goals (uuid, name, display_name, efficacy_specification) \
         VALUES ('uuid-quoted', 'it''s quoted', 'Quoted', NULL)",
    )
    .unwrap();

    let script = DumpScript::capture(conn).unwrap();
    let expected_shape = introspect(conn).unwrap();
    let expected_rows = load_goal_text(conn);

    let mut restored = Engine::transient();
    let restored_conn = restored.connect().unwrap();
    script.replay(restored_conn).unwrap();

    assert!(introspect(restored_conn).unwrap().diff(&expected_shape).is_empty());
    assert_eq!(load_goal_text(restored_conn), expected_rows);
    assert_eq!(goal_count(restored_conn), 2);
}

#[test]
fn test_replay_is_repeatable() {
    let mut source = Engine::transient();
    create_all(source.connect().unwrap()).unwrap();
    let script = DumpScript::capture(source.connect().unwrap()).unwrap();

    for _ in 0..3 {
        let mut copy = Engine::transient();
        let conn = copy.connect().unwrap();
        script.replay(conn).unwrap();

        assert!(row_counts(conn).unwrap().values().all(|count| *count == 0));
        insert_goal(conn, "per-copy");
    }
}

#[test]
fn test_autoincrement_sequence_survives_round_trip() {
    let mut source = Engine::transient();
    let conn = source.connect().unwrap();
    create_all(conn).unwrap();
    let first = insert_goal(conn, "first");
    conn.batch_execute("DELETE FROM goals").unwrap();

    let script = DumpScript::capture(conn).unwrap();
    assert!(
        script
            .statements()
            .iter()
            .any(|s| s == "DELETE FROM \"sqlite_sequence\";")
    );

    let mut restored = Engine::transient();
    let restored_conn = restored.connect().unwrap();
    script.replay(restored_conn).unwrap();

    let next = insert_goal(restored_conn, "second");
    assert_eq!(next, first + 1, "AUTOINCREMENT must not reuse ids");
}

#[test]
fn test_replay_into_populated_database_fails() {
    let mut source = Engine::transient();
    create_all(source.connect().unwrap()).unwrap();
    let script = DumpScript::capture(source.connect().unwrap()).unwrap();

    let mut target = Engine::transient();
    let conn = target.connect().unwrap();
    create_all(conn).unwrap();

    let result = script.replay(conn);
    assert!(matches!(result, Err(FixtureError::QueryFailed(_))));
}

#[test]
fn test_script_serializes_as_statement_list() {
    let mut source = Engine::transient();
    create_all(source.connect().unwrap()).unwrap();
    let script = DumpScript::capture(source.connect().unwrap()).unwrap();

    let json = serde_json::to_string(&script).unwrap();
    let decoded: DumpScript = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded.len(), script.len());
    assert_eq!(decoded.to_sql(), script.to_sql());
}

#[derive(QueryableByName)]
struct NoteMatch {
    #[diesel(sql_type = Text)]
    body: String,
}

#[test]
fn test_virtual_table_restores_through_its_own_ddl() {
    let mut source = Engine::transient();
    source
        .connect()
        .unwrap()
        .batch_execute(
            "CREATE VIRTUAL TABLE notes USING fts5(body); \
             INSERT INTO notes (body) VALUES ('pristine baseline'), ('working copy');",
        )
        .unwrap();

    let script = DumpScript::capture(source.connect().unwrap()).unwrap();
    assert!(!script.statements().iter().any(|s| s.contains("notes_data")));

    let mut target = Engine::transient();
    script.replay(target.connect().unwrap()).unwrap();

    let matches: Vec<NoteMatch> =
        diesel::sql_query("SELECT body FROM notes WHERE notes MATCH 'baseline'")
            .load(target.connect().unwrap())
            .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].body, "pristine baseline");
}
