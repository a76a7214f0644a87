//! Multi-database registry: `Database/<db>/...` for every `<db>` the server
//! has opened. `Database` itself models one already-open database; `Engine`
//! is the thin directory of them that the command pipeline's
//! `create_database`/`use_database` statements address.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use common::DbResult;

use crate::Database;

pub struct Engine {
    data_dir: PathBuf,
    bootstrap_admin_password: String,
    acl_enabled_default: bool,
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Engine {
    pub fn new(data_dir: PathBuf, bootstrap_admin_password: impl Into<String>) -> Self {
        Self {
            data_dir,
            bootstrap_admin_password: bootstrap_admin_password.into(),
            acl_enabled_default: false,
            databases: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides whether newly-opened databases start with ACL enforcement
    /// on. Existing open handles are unaffected; use
    /// `Database::enable_acl`/`disable_acl` for those.
    pub fn with_acl_enabled_default(mut self, enabled: bool) -> Self {
        self.acl_enabled_default = enabled;
        self
    }

    /// Opens `name`, creating its directory tree and bootstrap admin on
    /// first use, and caches the handle for subsequent lookups. Repeated
    /// calls (whether from `create_database` or `use_database`) return the
    /// same `Database` instance.
    pub fn open_or_create(&self, name: &str) -> DbResult<Arc<Database>> {
        if let Some(db) = self.databases.read().unwrap().get(name) {
            return Ok(db.clone());
        }
        let mut databases = self.databases.write().unwrap();
        if let Some(db) = databases.get(name) {
            return Ok(db.clone());
        }
        let db = Database::open(&self.data_dir, name, &self.bootstrap_admin_password)?;
        if !self.acl_enabled_default {
            db.disable_acl()?;
        }
        let db = Arc::new(db);
        databases.insert(name.to_string(), db.clone());
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_or_create_caches_the_same_database() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::new(tmp.path().to_path_buf(), "adminpw");
        let a = engine.open_or_create("demo").unwrap();
        a.create_table("t", vec![catalog::ColumnDef::new("id", types::SqlType::Int, 4)])
            .unwrap();
        let b = engine.open_or_create("demo").unwrap();
        assert_eq!(b.show_tables(), vec!["t".to_string()]);
    }
}
