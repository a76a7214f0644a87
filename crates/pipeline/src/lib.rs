//! Command pipeline: parse → permission-check → execute → format.
//! `execute` is the whole contract — deserialize has already happened
//! (`statement::parse`), and the caller (the request server) only needs to
//! thread a per-connection `Session` through one call per message.

mod format;
mod response;
mod statement;
mod value;

pub use format::Format;
pub use response::{Outcome, Response};
pub use statement::{parse, ColumnSpec, Statement, WherePredicate};

use acl::{CommandClass, Role};
use catalog::{ColumnDef, TableDef};
use common::{DbError, DbResult};
use engine::{CompareOp, Database, Engine, Predicate};
use value::{json_to_value, parse_sql_type, value_to_json};

/// The pipeline-relevant slice of a connection's state: the rest (socket,
/// peer address, receive buffer, last-activity timestamp) is the request
/// server's concern and lives alongside this in its own `Connection` type.
pub struct Session {
    pub database: String,
    pub username: Option<String>,
    pub txn_id: u32,
    pub format: Format,
}

impl Session {
    pub fn new(default_database: impl Into<String>) -> Self {
        Self {
            database: default_database.into(),
            username: None,
            txn_id: 0,
            format: Format::Json,
        }
    }
}

fn parse_operator(op: &str) -> DbResult<CompareOp> {
    match op {
        "=" => Ok(CompareOp::Eq),
        "!=" | "<>" | "\u{2260}" => Ok(CompareOp::Ne),
        "<" => Ok(CompareOp::Lt),
        "<=" | "\u{2264}" => Ok(CompareOp::Le),
        ">" => Ok(CompareOp::Gt),
        ">=" | "\u{2265}" => Ok(CompareOp::Ge),
        other => Err(DbError::Parse(format!("unsupported operator '{other}'"))),
    }
}

fn resolve_predicate(table: &TableDef, where_: &Option<WherePredicate>) -> DbResult<Option<Predicate>> {
    let Some(w) = where_ else { return Ok(None) };
    let col = table
        .column_index(&w.column)
        .ok_or_else(|| DbError::UnknownColumn(w.column.clone()))?;
    let ty = table.columns[col].ty;
    let value = json_to_value(&w.value, ty)?;
    Ok(Some(Predicate {
        column: w.column.clone(),
        op: parse_operator(&w.operator)?,
        value,
    }))
}

fn parse_role(name: &str) -> DbResult<Role> {
    match name.to_ascii_lowercase().as_str() {
        "admin" => Ok(Role::Admin),
        "developer" => Ok(Role::Developer),
        "user" => Ok(Role::User),
        other => Err(DbError::Parse(format!("unknown role '{other}'"))),
    }
}

/// The command class each statement is checked against. `None` means the
/// statement bypasses `check_permission` entirely: meta commands,
/// login/logout, and the admin-gated statements that enforce their own
/// check.
fn command_class(stmt: &Statement) -> Option<CommandClass> {
    use Statement::*;
    match stmt {
        Select { .. } | ShowTables | ShowIndexes { .. } => Some(CommandClass::Read),
        Insert { .. } | Update { .. } => Some(CommandClass::Write),
        Delete { .. } => Some(CommandClass::Delete),
        CreateTable { .. } | CreateIndex { .. } | CreateDatabase { .. } => Some(CommandClass::Create),
        DropUser { .. } => Some(CommandClass::Drop),
        GrantRole { .. } => Some(CommandClass::Grant),
        RevokeRole { .. } => Some(CommandClass::Revoke),
        UseDatabase { .. } | UseTable { .. } => Some(CommandClass::Read),
        CreateUser { .. } | Login { .. } | Logout { .. } | EnableAuth | DisableAuth | ShowSessions | Meta { .. } => None,
    }
}

/// Statements that bypass the role matrix but still require the acting
/// user to hold `Role::Admin`: creating users, and enabling/disabling ACL
/// enforcement itself (letting a non-admin flip enforcement off would make
/// the matrix meaningless — see DESIGN.md). `ShowSessions` is admin-gated
/// the same way: the active-session roster names other users' logged-in
/// state, not just the caller's own.
fn requires_admin(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::CreateUser { .. } | Statement::EnableAuth | Statement::DisableAuth | Statement::ShowSessions
    )
}

/// Toggling ACL enforcement is itself an operation, so it is permitted with
/// no caller at all while enforcement is currently off (§4.6: "when ACL
/// enforcement is off, every operation is permitted") — otherwise a fresh
/// database could never have auth turned on without first logging in under
/// an ACL it doesn't yet enforce. `CreateUser` and `ShowSessions` get no such
/// bypass: both are gated on the caller actually holding `Role::Admin`
/// regardless of whether enforcement happens to be on.
fn require_admin(db: &Database, username: Option<&str>, stmt: &Statement) -> DbResult<()> {
    if matches!(stmt, Statement::EnableAuth | Statement::DisableAuth) && !db.acl_enabled() {
        return Ok(());
    }
    let Some(username) = username else {
        return Err(DbError::NotLoggedIn);
    };
    if db.acl_role(username) == Role::Admin {
        Ok(())
    } else {
        Err(DbError::PermissionDenied)
    }
}

fn row_to_json(table: &TableDef, row: &common::Row, indices: &[usize]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for &i in indices {
        map.insert(table.columns[i].name.clone(), value_to_json(&row.values[i]));
    }
    serde_json::Value::Object(map)
}

fn all_column_indices(table: &TableDef) -> Vec<usize> {
    (0..table.columns.len()).collect()
}

/// Resolves a `select` projection's column names to indices up front,
/// erroring on any name the table doesn't have rather than silently
/// dropping it (spec's prepare-time "unknown column" error).
fn resolve_projection(table: &TableDef, columns: &Option<Vec<String>>) -> DbResult<Vec<usize>> {
    match columns {
        Some(names) => names
            .iter()
            .map(|n| {
                table
                    .column_index(n)
                    .ok_or_else(|| DbError::UnknownColumn(n.clone()))
            })
            .collect(),
        None => Ok(all_column_indices(table)),
    }
}

fn render_rows(table: &TableDef, rows: &[common::Row], columns: &Option<Vec<String>>, format: Format) -> DbResult<Response> {
    let indices = resolve_projection(table, columns)?;
    Ok(match format {
        Format::Json => {
            let results = rows.iter().map(|r| row_to_json(table, r, &indices)).collect();
            Response::rows(results)
        }
        Format::Table => {
            let col_names: Vec<String> = indices.iter().map(|&i| table.columns[i].name.clone()).collect();
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|r| indices.iter().map(|&i| format!("{:?}", r.values[i])).collect())
                .collect();
            Response::ack(format::render_table(&col_names, &cells))
        }
    })
}

fn build_columns(specs: &[ColumnSpec]) -> DbResult<Vec<ColumnDef>> {
    specs
        .iter()
        .map(|c| {
            let ty = parse_sql_type(&c.ty)?;
            let size = c.size.unwrap_or(0);
            if matches!(ty, types::SqlType::Str | types::SqlType::Blob) && size == 0 {
                return Err(DbError::Parse(format!(
                    "column '{}' of type {:?} requires a declared size",
                    c.name, ty
                )));
            }
            Ok(ColumnDef::new(c.name.clone(), ty, size))
        })
        .collect()
}

/// Executes one parsed statement against `engine`, updating `session` in
/// place (current database, active transaction, output format) as the
/// statement dictates.
pub fn execute(engine: &Engine, session: &mut Session, stmt: Statement) -> Outcome {
    match try_execute(engine, session, stmt) {
        Ok(outcome) => outcome,
        Err(e) => Outcome::reply(Response::error(e.to_string())),
    }
}

fn try_execute(engine: &Engine, session: &mut Session, stmt: Statement) -> DbResult<Outcome> {
    // Statements that don't need an open database at all.
    if let Statement::Meta { .. } = &stmt {
        return meta(engine, session, stmt);
    }

    let db = engine.open_or_create(&session.database)?;

    if requires_admin(&stmt) {
        require_admin(&db, session.username.as_deref(), &stmt)?;
    } else if let Some(class) = command_class(&stmt) {
        db.check_permission(session.username.as_deref(), class)?;
    }

    use Statement::*;
    let response = match stmt {
        Select { table, columns, where_ } => {
            let def = db.table_schema(&table)?;
            let pred = resolve_predicate(&def, &where_)?;
            let rows = db.select(&table, pred.as_ref())?;
            render_rows(&def, &rows, &columns, session.format)?
        }
        Insert { table, values } => {
            let def = db.table_schema(&table)?;
            if values.len() != def.columns.len() {
                return Err(DbError::Parse(format!(
                    "expected {} values for table '{table}', got {}",
                    def.columns.len(),
                    values.len()
                )));
            }
            let typed = values
                .iter()
                .zip(&def.columns)
                .map(|(v, c)| json_to_value(v, c.ty))
                .collect::<DbResult<Vec<_>>>()?;
            db.insert(&table, typed, session.txn_id)?;
            Response::affected("1 row inserted", 1)
        }
        Update { table, column, value, where_ } => {
            let def = db.table_schema(&table)?;
            let col_idx = def
                .column_index(&column)
                .ok_or_else(|| DbError::UnknownColumn(column.clone()))?;
            let typed_value = json_to_value(&value, def.columns[col_idx].ty)?;
            let pred = resolve_predicate(&def, &where_)?;
            let affected = db.update(&table, &column, typed_value, pred.as_ref(), session.txn_id)?;
            Response::affected(format!("{affected} row(s) updated"), affected)
        }
        Delete { table, where_ } => {
            let def = db.table_schema(&table)?;
            let pred = resolve_predicate(&def, &where_)?;
            let affected = db.delete(&table, pred.as_ref(), session.txn_id)?;
            Response::affected(format!("{affected} row(s) deleted"), affected)
        }
        CreateTable { table, columns } => {
            let cols = build_columns(&columns)?;
            db.create_table(&table, cols)?;
            Response::ack(format!("table '{table}' created"))
        }
        CreateIndex { index_name, table, columns, unique } => {
            let column = columns
                .first()
                .ok_or_else(|| DbError::Parse("create_index requires at least one column".to_string()))?;
            if columns.len() > 1 {
                return Err(DbError::Parse("multi-column indexes are not supported".to_string()));
            }
            db.create_index(&table, &index_name, column, unique)?;
            Response::ack(format!("index '{index_name}' created on {table}.{column}"))
        }
        ShowTables => Response::rows(
            db.show_tables()
                .into_iter()
                .map(|name| serde_json::json!({ "table": name }))
                .collect(),
        ),
        ShowSessions => Response::rows(
            db.active_sessions()
                .into_iter()
                .map(|s| {
                    serde_json::json!({
                        "username": s.username,
                        "login_at": s.login_at,
                    })
                })
                .collect(),
        ),
        ShowIndexes { table } => Response::rows(
            db.show_indexes(&table)?
                .into_iter()
                .map(|ix| {
                    serde_json::json!({
                        "name": ix.name,
                        "column": ix.column_name,
                        "unique": ix.is_unique,
                    })
                })
                .collect(),
        ),
        CreateDatabase { name } => {
            engine.open_or_create(&name)?;
            Response::ack(format!("database '{name}' created"))
        }
        UseDatabase { name } => {
            engine.open_or_create(&name)?;
            session.database = name.clone();
            Response::ack(format!("using database '{name}'"))
        }
        UseTable { name } => {
            db.use_table(&name)?;
            Response::ack(format!("using table '{name}'"))
        }
        CreateUser { username, password, role } => {
            db.create_user(&username, &password, parse_role(&role)?)?;
            Response::ack(format!("user '{username}' created"))
        }
        DropUser { username } => {
            db.drop_user(&username)?;
            Response::ack(format!("user '{username}' dropped"))
        }
        GrantRole { username, role } => {
            db.assign_role(&username, parse_role(&role)?)?;
            Response::ack(format!("role '{role}' granted to '{username}'"))
        }
        RevokeRole { username } => {
            db.assign_role(&username, Role::User)?;
            Response::ack(format!("roles revoked from '{username}'"))
        }
        Login { username, password } => {
            db.login(&username, &password)?;
            session.username = Some(username.clone());
            Response::ack(format!("logged in as '{username}'"))
        }
        Logout { username } => {
            db.logout(username.as_deref())?;
            if username.is_none() || username.as_deref() == session.username.as_deref() {
                session.username = None;
            }
            Response::ack("logged out")
        }
        EnableAuth => {
            db.enable_acl()?;
            Response::ack("ACL enforcement enabled")
        }
        DisableAuth => {
            db.disable_acl()?;
            Response::ack("ACL enforcement disabled")
        }
        Meta { .. } => unreachable!("handled above"),
    };
    Ok(Outcome::reply(response))
}

fn meta(engine: &Engine, session: &mut Session, stmt: Statement) -> DbResult<Outcome> {
    let Statement::Meta { meta_command, format_type, table } = stmt else {
        unreachable!()
    };
    match meta_command.as_str() {
        "exit" => Ok(Outcome::reply_and_close(Response::ack("bye"))),
        "format" => {
            let Some(kind) = format_type.as_deref().and_then(Format::parse) else {
                return Err(DbError::Parse("format requires a valid format_type".to_string()));
            };
            session.format = kind;
            Ok(Outcome::reply(Response::ack(format!("output format set to {format_type:?}"))))
        }
        "constants" => {
            let c = engine::constants();
            Ok(Outcome::reply(Response::rows(vec![serde_json::json!({
                "page_size": c.page_size,
                "table_max_pages": c.table_max_pages,
                "leaf_header_size": c.leaf_header_size,
                "max_tables": c.max_tables,
                "max_columns": c.max_columns,
                "max_indexes_per_table": c.max_indexes_per_table,
            })])))
        }
        "btree" => {
            let table = table.ok_or_else(|| DbError::Parse("meta btree requires a table".to_string()))?;
            let db = engine.open_or_create(&session.database)?;
            let def = db.table_schema(&table)?;
            let cells = db.dump_btree(&table)?;
            let indices = all_column_indices(&def);
            let results = cells
                .into_iter()
                .map(|(key, row)| {
                    serde_json::json!({
                        "key": key,
                        "row": row_to_json(&def, &row, &indices),
                    })
                })
                .collect();
            Ok(Outcome::reply(Response::rows(results)))
        }
        "txn begin" => {
            let db = engine.open_or_create(&session.database)?;
            if session.txn_id != 0 {
                return Err(DbError::NestedBegin);
            }
            let id = db.begin_txn()?;
            session.txn_id = id;
            Ok(Outcome::reply(Response::ack(format!("transaction {id} started"))))
        }
        "txn commit" => {
            let db = engine.open_or_create(&session.database)?;
            db.commit_txn(session.txn_id)?;
            session.txn_id = 0;
            Ok(Outcome::reply(Response::ack("transaction committed")))
        }
        "txn rollback" => {
            let db = engine.open_or_create(&session.database)?;
            db.rollback_txn(session.txn_id)?;
            session.txn_id = 0;
            Ok(Outcome::reply(Response::ack("transaction rolled back")))
        }
        "txn status" => {
            let db = engine.open_or_create(&session.database)?;
            let txn = db.txn_status(session.txn_id)?;
            Ok(Outcome::reply(Response::rows(vec![serde_json::json!({
                "id": txn.id,
                "state": format!("{:?}", txn.state),
                "changes": txn.change_count(),
            })])))
        }
        "txn enable" => {
            let db = engine.open_or_create(&session.database)?;
            db.enable_txns();
            Ok(Outcome::reply(Response::ack("transactions enabled")))
        }
        "txn disable" => {
            let db = engine.open_or_create(&session.database)?;
            db.disable_txns();
            Ok(Outcome::reply(Response::ack("transactions disabled")))
        }
        other => Err(DbError::UnrecognizedStatement(format!("meta {other}"))),
    }
}

/// Rolls back `session`'s open transaction, if any — called by the
/// request server on connection close/idle-timeout.
pub fn force_rollback(engine: &Engine, session: &mut Session) {
    if session.txn_id == 0 {
        return;
    }
    if let Ok(db) = engine.open_or_create(&session.database) {
        let _ = db.rollback_txn(session.txn_id);
    }
    session.txn_id = 0;
}

#[cfg(test)]
mod tests;
