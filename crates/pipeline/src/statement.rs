//! Parsed request shapes. One JSON document deserializes directly into a
//! `Statement` variant, tagged by its `"command"` field.

use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, Deserialize)]
pub struct WherePredicate {
    pub column: String,
    pub operator: String,
    pub value: JsonValue,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub size: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Statement {
    Select {
        table: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(rename = "where", default)]
        where_: Option<WherePredicate>,
    },
    Insert {
        table: String,
        values: Vec<JsonValue>,
    },
    Update {
        table: String,
        column: String,
        value: JsonValue,
        #[serde(rename = "where", default)]
        where_: Option<WherePredicate>,
    },
    Delete {
        table: String,
        #[serde(rename = "where", default)]
        where_: Option<WherePredicate>,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    CreateIndex {
        index_name: String,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    ShowTables,
    ShowIndexes {
        table: String,
    },
    ShowSessions,
    CreateDatabase {
        name: String,
    },
    UseDatabase {
        name: String,
    },
    UseTable {
        name: String,
    },
    CreateUser {
        username: String,
        password: String,
        role: String,
    },
    DropUser {
        username: String,
    },
    GrantRole {
        username: String,
        role: String,
    },
    RevokeRole {
        username: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout {
        #[serde(default)]
        username: Option<String>,
    },
    EnableAuth,
    DisableAuth,
    Meta {
        meta_command: String,
        #[serde(default)]
        format_type: Option<String>,
        #[serde(default)]
        table: Option<String>,
    },
}

/// Parses one newline-framed JSON request body into a `Statement`.
pub fn parse(line: &str) -> Result<Statement, serde_json::Error> {
    serde_json::from_str(line)
}
