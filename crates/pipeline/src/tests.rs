use std::path::Path;

use engine::Engine;
use serde_json::json;
use tempfile::tempdir;

use crate::{execute, parse, Response, Session};

fn engine_at(dir: &Path) -> Engine {
    Engine::new(dir.to_path_buf(), "adminpw")
}

fn run(engine: &Engine, session: &mut Session, request: serde_json::Value) -> Response {
    let stmt = parse(&request.to_string()).expect("request parses");
    execute(engine, session, stmt).response
}

#[test]
fn create_table_then_insert_then_select_round_trips() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    let created = run(
        &engine,
        &mut session,
        json!({
            "command": "create_table",
            "table": "users",
            "columns": [
                {"name": "id", "type": "INT"},
                {"name": "name", "type": "STRING", "size": 32},
            ],
        }),
    );
    assert!(matches!(created, Response::Ack { .. }));

    let inserted = run(
        &engine,
        &mut session,
        json!({"command": "insert", "table": "users", "values": [1, "alice"]}),
    );
    match inserted {
        Response::Ack { affected_rows, .. } => assert_eq!(affected_rows, Some(1)),
        other => panic!("unexpected response: {other:?}"),
    }

    let selected = run(
        &engine,
        &mut session,
        json!({"command": "select", "table": "users"}),
    );
    match selected {
        Response::Rows { results, count } => {
            assert_eq!(count, 1);
            assert_eq!(results[0]["name"], json!("alice"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn select_with_where_filters_rows() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    run(
        &engine,
        &mut session,
        json!({
            "command": "create_table",
            "table": "users",
            "columns": [
                {"name": "id", "type": "INT"},
                {"name": "age", "type": "INT"},
            ],
        }),
    );
    run(&engine, &mut session, json!({"command": "insert", "table": "users", "values": [1, 20]}));
    run(&engine, &mut session, json!({"command": "insert", "table": "users", "values": [2, 40]}));

    let selected = run(
        &engine,
        &mut session,
        json!({
            "command": "select",
            "table": "users",
            "where": {"column": "age", "operator": ">", "value": 30},
        }),
    );
    match selected {
        Response::Rows { count, results } => {
            assert_eq!(count, 1);
            assert_eq!(results[0]["id"], json!(2));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn select_with_unknown_projected_column_is_an_error() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    run(
        &engine,
        &mut session,
        json!({
            "command": "create_table",
            "table": "users",
            "columns": [{"name": "id", "type": "INT"}, {"name": "name", "type": "STRING", "size": 8}],
        }),
    );
    run(&engine, &mut session, json!({"command": "insert", "table": "users", "values": [1, "alice"]}));

    let selected = run(
        &engine,
        &mut session,
        json!({"command": "select", "table": "users", "columns": ["id", "nope"]}),
    );
    assert!(matches!(selected, Response::Err { .. }));
}

#[test]
fn write_is_rejected_without_login_when_acl_enabled() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    run(
        &engine,
        &mut session,
        json!({
            "command": "create_table",
            "table": "users",
            "columns": [{"name": "id", "type": "INT"}],
        }),
    );
    run(&engine, &mut session, json!({"command": "enable_auth"}));
    run(&engine, &mut session, json!({"command": "logout"}));

    let response = run(
        &engine,
        &mut session,
        json!({"command": "insert", "table": "users", "values": [1]}),
    );
    assert!(matches!(response, Response::Err { .. }));
}

#[test]
fn create_user_requires_admin_role() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    run(
        &engine,
        &mut session,
        json!({"command": "login", "username": "admin", "password": "adminpw"}),
    );
    let response = run(
        &engine,
        &mut session,
        json!({"command": "create_user", "username": "bob", "password": "pw", "role": "developer"}),
    );
    assert!(matches!(response, Response::Ack { .. }));

    run(&engine, &mut session, json!({"command": "logout"}));
    run(&engine, &mut session, json!({"command": "login", "username": "bob", "password": "pw"}));
    let denied = run(
        &engine,
        &mut session,
        json!({"command": "create_user", "username": "carol", "password": "pw", "role": "user"}),
    );
    assert!(matches!(denied, Response::Err { .. }));
}

#[test]
fn transaction_rollback_through_meta_commands_restores_prior_rows() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    run(
        &engine,
        &mut session,
        json!({
            "command": "create_table",
            "table": "users",
            "columns": [{"name": "id", "type": "INT"}, {"name": "age", "type": "INT"}],
        }),
    );
    run(&engine, &mut session, json!({"command": "insert", "table": "users", "values": [1, 20]}));

    let begin = run(&engine, &mut session, json!({"command": "meta", "meta_command": "txn begin"}));
    assert!(matches!(begin, Response::Ack { .. }));
    assert_ne!(session.txn_id, 0);

    run(
        &engine,
        &mut session,
        json!({
            "command": "update",
            "table": "users",
            "column": "age",
            "value": 99,
            "where": {"column": "id", "operator": "=", "value": 1},
        }),
    );

    let rollback = run(&engine, &mut session, json!({"command": "meta", "meta_command": "txn rollback"}));
    assert!(matches!(rollback, Response::Ack { .. }));
    assert_eq!(session.txn_id, 0);

    let selected = run(&engine, &mut session, json!({"command": "select", "table": "users"}));
    match selected {
        Response::Rows { results, .. } => assert_eq!(results[0]["age"], json!(20)),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn meta_exit_closes_the_connection() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    let stmt = parse(&json!({"command": "meta", "meta_command": "exit"}).to_string()).unwrap();
    let outcome = execute(&engine, &mut session, stmt);
    assert!(outcome.close);
}

#[test]
fn unparseable_request_body_is_rejected_by_parse() {
    assert!(parse("not json").is_err());
}

#[test]
fn show_sessions_is_admin_only_and_lists_logged_in_users() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path());
    let mut session = Session::new("demo");

    let denied = run(&engine, &mut session, json!({"command": "show_sessions"}));
    assert!(matches!(denied, Response::Err { .. }));

    run(
        &engine,
        &mut session,
        json!({"command": "login", "username": "admin", "password": "adminpw"}),
    );
    let response = run(&engine, &mut session, json!({"command": "show_sessions"}));
    match response {
        Response::Rows { results, count } => {
            assert_eq!(count, 1);
            assert_eq!(results[0]["username"], json!("admin"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}
