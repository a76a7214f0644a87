//! Shared error type, configuration, and row/identifier primitives used by
//! every crate in the workspace.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::Value;

/// 32-bit unsigned primary key / row identifier.
pub type RowId = u32;

/// Page index within a table or index file. Only page 0 is ever used as
/// data storage today (leaf splitting is a non-goal), but the pager
/// addresses pages generically up to `TABLE_MAX_PAGES`.
pub type PageNum = u32;

/// A decoded row: the primary key plus the remaining column values in
/// schema order (the key is also stored as `values[0]`, matching the
/// catalog's declared column order where the first column is the
/// primary key).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// The row's primary key, taken from `values[0]`.
    pub fn key(&self) -> Option<RowId> {
        match self.values.first() {
            Some(Value::Int(v)) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Canonical error type shared across the storage engine.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("unrecognized statement: {0}")]
    UnrecognizedStatement(String),
    #[error("string too long for column '{column}' (max {max}, got {got})")]
    StringTooLong {
        column: String,
        max: u32,
        got: usize,
    },
    #[error("negative id is not permitted")]
    NegativeId,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("unknown index '{0}'")]
    UnknownIndex(String),
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("user '{0}' already exists")]
    DuplicateUser(String),
    #[error("authentication failed")]
    AuthFailed,
    #[error("permission denied")]
    PermissionDenied,
    #[error("admin role already assigned")]
    AdminExists,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("duplicate key")]
    DuplicateKey,
    #[error("duplicate index key")]
    DuplicateIndexKey,
    #[error("table is full")]
    TableFull,
    #[error("table '{0}' already exists")]
    DuplicateTable(String),
    #[error("index '{0}' already exists")]
    DuplicateIndex(String),
    #[error("transaction manager is disabled")]
    ManagerDisabled,
    #[error("transaction capacity exceeded")]
    CapacityExceeded,
    #[error("no free transaction slot")]
    NoSlot,
    #[error("no such transaction {0}")]
    NoSuchTransaction(u32),
    #[error("transaction is not active")]
    NotActive,
    #[error("a transaction is already active on this connection")]
    NestedBegin,
    #[error("page {0} is out of range")]
    PageOutOfRange(u32),
    #[error("client disconnected")]
    Disconnected,
    #[error("connection idle timeout")]
    IdleTimeout,
    #[error("server is at connection capacity")]
    OverCapacity,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the database components.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./Database"))
///     .worker_threads(8)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Root directory holding `Database/<db>/...` trees.
    #[builder(default = PathBuf::from("./Database"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes (nominally 4096).
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Bound on concurrently-running connection handlers.
    #[builder(default = 8)]
    pub worker_threads: usize,
    /// Maximum pending connections before new sockets are rejected.
    #[builder(default = 100)]
    pub max_connections: usize,
    /// Idle duration after which a connection is reaped by the monitor.
    #[builder(default = 60)]
    pub connection_timeout_secs: u64,
    /// Whether ACL permission checks are enforced.
    #[builder(default = true)]
    pub acl_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./Database"),
            page_size: 4096,
            worker_threads: 8,
            max_connections: 100,
            connection_timeout_secs: 60,
            acl_enabled: true,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, Row, RowId};
    pub use types::{SqlType, Value};
}

#[cfg(test)]
mod tests;
