//! The `Database` object: directory layout, table/index lifecycle, and the
//! glue between the catalog, pager/B-tree, transaction manager, and ACL.
//!
//! Table-level locking — writes from concurrent connections to the same
//! table must be serialized — is one `Mutex<OpenTable>` per table, held for
//! the duration of one statement's page mutation and any accompanying
//! secondary-index updates. The catalog and ACL are process-wide state
//! behind their own `RwLock`s; every engine method takes `&self` explicitly
//! rather than reaching for a global.

mod index;
mod registry;
mod row;

pub use registry::Engine;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use acl::{Acl, CommandClass, Role};
use btree::{BTree, Cursor};
use catalog::{Catalog, ColumnDef, IndexDef, TableDef};
use common::{DbError, DbResult, Row, RowId};
use txn::{RowChange, Transaction, TransactionManager};
use types::Value;

pub use row::{decode_row, encode_row, row_key};

/// Compile-time layout constants exposed by the `meta constants` command.
#[derive(Clone, Debug)]
pub struct Constants {
    pub page_size: usize,
    pub table_max_pages: usize,
    pub leaf_header_size: usize,
    pub max_tables: usize,
    pub max_columns: usize,
    pub max_indexes_per_table: usize,
}

pub fn constants() -> Constants {
    Constants {
        page_size: storage::PAGE_SIZE,
        table_max_pages: storage::TABLE_MAX_PAGES,
        leaf_header_size: btree::LeafLayout::new(0).cell_offset(0),
        max_tables: catalog::MAX_TABLES,
        max_columns: catalog::MAX_COLUMNS,
        max_indexes_per_table: catalog::MAX_INDEXES_PER_TABLE,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn matches(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Predicate {
    fn evaluate(&self, row: &Row, table: &TableDef) -> DbResult<bool> {
        let idx = table
            .column_index(&self.column)
            .ok_or_else(|| DbError::UnknownColumn(self.column.clone()))?;
        let ord = row.values[idx]
            .compare(&self.value)
            .ok_or_else(|| DbError::Parse(format!("column '{}' is not comparable", self.column)))?;
        Ok(self.op.matches(ord))
    }
}

struct IndexHandle {
    btree: BTree,
    def: IndexDef,
    column_width: u32,
}

struct OpenTable {
    btree: BTree,
    indexes: HashMap<String, IndexHandle>,
}

/// One matched row, the cursor it was found at (for update/delete), and
/// its decoded key/values.
struct Located {
    cursor: Cursor,
    key: RowId,
    row: Row,
}

pub struct Database {
    pub name: String,
    data_dir: PathBuf,
    catalog_path: PathBuf,
    acl_path: PathBuf,
    catalog: RwLock<Catalog>,
    acl: RwLock<Acl>,
    txns: Mutex<TransactionManager>,
    tables: RwLock<HashMap<String, Mutex<OpenTable>>>,
}

const DEFAULT_TXN_CAPACITY: usize = 64;

impl Database {
    /// Opens (creating if absent) `Database/<name>` under `data_dir`,
    /// loading or bootstrapping its catalog and ACL.
    pub fn open(data_dir: &Path, name: &str, bootstrap_admin_password: &str) -> DbResult<Self> {
        let dir = data_dir.join(name);
        fs::create_dir_all(&dir)?;
        let catalog_path = dir.join(format!("{name}.catalog"));
        let acl_path = dir.join(format!("{name}.acl"));

        let mut cat = Catalog::load_from_path(&catalog_path, data_dir.to_path_buf())?;
        if cat.database_name.is_empty() {
            cat.database_name = name.to_string();
        }
        cat.migrate_table_paths()?;
        cat.save(&catalog_path)?;

        let acl = if acl_path.exists() {
            Acl::load(&acl_path)?
        } else {
            let acl = Acl::with_bootstrap_admin(bootstrap_admin_password);
            acl.save(&acl_path)?;
            acl
        };

        log::info!("database '{name}' opened at {}", dir.display());
        Ok(Self {
            name: name.to_string(),
            data_dir: data_dir.to_path_buf(),
            catalog_path,
            acl_path,
            catalog: RwLock::new(cat),
            acl: RwLock::new(acl),
            txns: Mutex::new(TransactionManager::new(DEFAULT_TXN_CAPACITY)),
            tables: RwLock::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn save_catalog(&self, cat: &Catalog) -> DbResult<()> {
        cat.save(&self.catalog_path)
    }

    fn save_acl(&self, acl: &Acl) -> DbResult<()> {
        acl.save(&self.acl_path)
    }

    // ---- catalog / table lifecycle -------------------------------------

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDef>) -> DbResult<()> {
        let table_def = {
            let mut cat = self.catalog.write().unwrap();
            let table = cat.add_table(name, columns)?;
            let table = table.clone();
            self.save_catalog(&cat)?;
            table
        };
        let btree = BTree::open(Path::new(&table_def.filename), table_def.row_width() as usize)?;
        btree.close()?;
        log::info!("table '{name}' created");
        Ok(())
    }

    pub fn show_tables(&self) -> Vec<String> {
        self.catalog
            .read()
            .unwrap()
            .tables
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn use_table(&self, name: &str) -> DbResult<()> {
        let mut cat = self.catalog.write().unwrap();
        cat.set_active(name)?;
        self.save_catalog(&cat)
    }

    pub fn active_table(&self) -> Option<String> {
        self.catalog
            .read()
            .unwrap()
            .active_name()
            .map(|s| s.to_string())
    }

    fn table_def(&self, name: &str) -> DbResult<TableDef> {
        self.catalog.read().unwrap().table(name).cloned()
    }

    /// The table's column/index layout, for callers (the command pipeline)
    /// that need to type-direct value conversion without reaching into the
    /// catalog directly.
    pub fn table_schema(&self, name: &str) -> DbResult<TableDef> {
        self.table_def(name)
    }

    /// Returns the open table handle, opening its pager/B-tree (and those
    /// of its indexes) on first access.
    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&TableDef, &mut OpenTable) -> DbResult<T>,
    ) -> DbResult<T> {
        let table_def = self.table_def(name)?;
        {
            let tables = self.tables.read().unwrap();
            if let Some(open) = tables.get(name) {
                let mut open = open.lock().unwrap();
                return f(&table_def, &mut open);
            }
        }
        let open_table = self.open_table(&table_def)?;
        let mut tables = self.tables.write().unwrap();
        let entry = tables.entry(name.to_string()).or_insert_with(|| Mutex::new(open_table));
        let mut open = entry.lock().unwrap();
        f(&table_def, &mut open)
    }

    fn open_table(&self, table_def: &TableDef) -> DbResult<OpenTable> {
        let btree = BTree::open(Path::new(&table_def.filename), table_def.row_width() as usize)?;
        let mut indexes = HashMap::new();
        for idx in &table_def.indexes {
            let col = table_def
                .columns
                .iter()
                .find(|c| c.name == idx.column_name)
                .ok_or_else(|| DbError::UnknownColumn(idx.column_name.clone()))?;
            let value_size = index::value_size_for_index(col.width());
            let ibtree = BTree::open(Path::new(&idx.filename), value_size)?;
            indexes.insert(
                idx.name.clone(),
                IndexHandle {
                    btree: ibtree,
                    def: idx.clone(),
                    column_width: col.width(),
                },
            );
        }
        Ok(OpenTable { btree, indexes })
    }

    // ---- secondary indexes ----------------------------------------------

    pub fn create_index(
        &self,
        table_name: &str,
        index_name: &str,
        column: &str,
        is_unique: bool,
    ) -> DbResult<()> {
        let table_def = {
            let mut cat = self.catalog.write().unwrap();
            cat.create_index(table_name, index_name, column, is_unique)?;
            self.save_catalog(&cat)?;
            cat.table(table_name)?.clone()
        };
        let idx_def = table_def.find_index(index_name).unwrap().clone();
        let col = table_def
            .columns
            .iter()
            .find(|c| c.name == column)
            .expect("catalog validated column exists");
        let value_size = index::value_size_for_index(col.width());
        let mut ibtree = BTree::open(Path::new(&idx_def.filename), value_size)?;

        self.with_table(table_name, |_, open| {
            for (row_key, raw) in open.btree.iter_all()? {
                let row = decode_row(&table_def, &raw)?;
                let col_idx = table_def.column_index(column).unwrap();
                let key_bytes = index::index_key_bytes(&row.values[col_idx], col.width());
                let hash = index::djb2(&key_bytes);
                if is_unique && unique_collision(&mut ibtree, hash, &key_bytes)? {
                    return Err(DbError::DuplicateIndexKey);
                }
                let payload = index::encode_index_value(row_key, &key_bytes, col.width() as usize);
                ibtree.insert_duplicate(hash, &payload)?;
            }
            Ok(())
        })?;

        let mut tables = self.tables.write().unwrap();
        if let Some(open) = tables.get_mut(table_name) {
            open.get_mut().unwrap().indexes.insert(
                index_name.to_string(),
                IndexHandle {
                    btree: ibtree,
                    def: idx_def,
                    column_width: col.width(),
                },
            );
        }
        log::info!("index '{index_name}' built on {table_name}.{column}");
        Ok(())
    }

    pub fn show_indexes(&self, table_name: &str) -> DbResult<Vec<IndexDef>> {
        Ok(self.table_def(table_name)?.indexes)
    }

    // ---- row operations ---------------------------------------------------

    pub fn insert(&self, table_name: &str, values: Vec<Value>, txn_id: u32) -> DbResult<RowId> {
        let table_def = self.table_def(table_name)?;
        let key = row_key(&values)?;
        let bytes = encode_row(&table_def, &values)?;

        self.with_table(table_name, |table_def, open| {
            // Check for a duplicate key before recording any pre-image: if
            // the insert is going to be rejected, there is nothing to undo,
            // and logging an "empty" (`old_bytes: None`) pre-image for a
            // slot that already holds a committed row would make rollback
            // delete that row instead of leaving it untouched.
            let landing = open.btree.find(key)?;
            if let Some((existing_key, _)) = open.btree.cell_at(&landing)? {
                if existing_key == key {
                    return Err(DbError::DuplicateKey);
                }
            }
            if txn_id != 0 {
                self.record_change(txn_id, &table_def.filename, landing.cell_num, key, None)?;
            }
            open.btree.insert(key, &bytes)?;
            self.update_indexes_on_insert(table_def, open, key, &values)?;
            Ok(key)
        })
    }

    fn update_indexes_on_insert(
        &self,
        table_def: &TableDef,
        open: &mut OpenTable,
        row_id: RowId,
        values: &[Value],
    ) -> DbResult<()> {
        for idx in table_def.indexes.clone() {
            let col_idx = table_def.column_index(&idx.column_name).unwrap();
            let handle = open.indexes.get_mut(&idx.name).unwrap();
            let key_bytes = index::index_key_bytes(&values[col_idx], handle.column_width);
            let hash = index::djb2(&key_bytes);
            if idx.is_unique && unique_collision(&mut handle.btree, hash, &key_bytes)? {
                return Err(DbError::DuplicateIndexKey);
            }
            let payload = index::encode_index_value(row_id, &key_bytes, handle.column_width as usize);
            handle.btree.insert_duplicate(hash, &payload)?;
        }
        Ok(())
    }

    pub fn select(&self, table_name: &str, predicate: Option<&Predicate>) -> DbResult<Vec<Row>> {
        self.with_table(table_name, |table_def, open| {
            let located = self.locate(table_def, open, predicate)?;
            Ok(located.into_iter().map(|l| l.row).collect())
        })
    }

    pub fn update(
        &self,
        table_name: &str,
        column: &str,
        value: Value,
        predicate: Option<&Predicate>,
        txn_id: u32,
    ) -> DbResult<u64> {
        self.with_table(table_name, |table_def, open| {
            let col_idx = table_def
                .column_index(column)
                .ok_or_else(|| DbError::UnknownColumn(column.to_string()))?;
            let located = self.locate(table_def, open, predicate)?;
            let mut affected = 0u64;
            for item in located {
                let mut new_values = item.row.values.clone();
                new_values[col_idx] = value.clone();
                let new_bytes = encode_row(table_def, &new_values)?;
                let (_, old_bytes) = open.btree.cell_at(&item.cursor)?.expect("cursor still valid");
                if txn_id != 0 {
                    self.record_change(
                        txn_id,
                        &table_def.filename,
                        item.cursor.cell_num,
                        item.key,
                        Some(old_bytes),
                    )?;
                }
                open.btree.restore_value(&item.cursor, &new_bytes)?;
                if col_idx != 0 {
                    self.reindex_column(table_def, open, column, &item.row.values, &new_values, item.key)?;
                }
                affected += 1;
            }
            Ok(affected)
        })
    }

    fn reindex_column(
        &self,
        table_def: &TableDef,
        open: &mut OpenTable,
        column: &str,
        old_values: &[Value],
        new_values: &[Value],
        row_id: RowId,
    ) -> DbResult<()> {
        let Some(idx) = table_def.find_index_by_column(column).cloned() else {
            return Ok(());
        };
        let col_idx = table_def.column_index(column).unwrap();
        let handle = open.indexes.get_mut(&idx.name).unwrap();
        let old_key_bytes = index::index_key_bytes(&old_values[col_idx], handle.column_width);
        let old_hash = index::djb2(&old_key_bytes);
        remove_index_entry(&mut handle.btree, old_hash, row_id)?;
        let new_key_bytes = index::index_key_bytes(&new_values[col_idx], handle.column_width);
        let new_hash = index::djb2(&new_key_bytes);
        if idx.is_unique && unique_collision(&mut handle.btree, new_hash, &new_key_bytes)? {
            return Err(DbError::DuplicateIndexKey);
        }
        let payload = index::encode_index_value(row_id, &new_key_bytes, handle.column_width as usize);
        handle.btree.insert_duplicate(new_hash, &payload)?;
        Ok(())
    }

    pub fn delete(
        &self,
        table_name: &str,
        predicate: Option<&Predicate>,
        txn_id: u32,
    ) -> DbResult<u64> {
        self.with_table(table_name, |table_def, open| {
            let located = self.locate(table_def, open, predicate)?;
            let mut affected = 0u64;
            for item in located {
                let cell_num = item.cursor.cell_num;
                let (_, old_bytes) = open.btree.delete_at(&item.cursor)?;
                if txn_id != 0 {
                    self.record_change(
                        txn_id,
                        &table_def.filename,
                        cell_num,
                        item.key,
                        Some(old_bytes),
                    )?;
                }
                for idx in &table_def.indexes {
                    let handle = open.indexes.get_mut(&idx.name).unwrap();
                    let col_idx = table_def.column_index(&idx.column_name).unwrap();
                    let key_bytes = index::index_key_bytes(&item.row.values[col_idx], handle.column_width);
                    let hash = index::djb2(&key_bytes);
                    remove_index_entry(&mut handle.btree, hash, item.key)?;
                }
                affected += 1;
            }
            Ok(affected)
        })
    }

    /// Locates every row satisfying `predicate`, index-assisted when
    /// possible.
    fn locate(
        &self,
        table_def: &TableDef,
        open: &mut OpenTable,
        predicate: Option<&Predicate>,
    ) -> DbResult<Vec<Located>> {
        let Some(pred) = predicate else {
            return self.scan_all(table_def, open);
        };

        if pred.column == table_def.columns[0].name && pred.op == CompareOp::Eq {
            let key = row_key(std::slice::from_ref(&pred.value))?;
            let cursor = open.btree.find(key)?;
            return match open.btree.cell_at(&cursor)? {
                Some((k, bytes)) if k == key => {
                    let row = decode_row(table_def, &bytes)?;
                    Ok(vec![Located { cursor, key, row }])
                }
                _ => Ok(Vec::new()),
            };
        }

        if pred.op == CompareOp::Eq {
            if let Some(idx) = table_def.find_index_by_column(&pred.column).cloned() {
                return self.locate_via_index(table_def, open, &idx, pred);
            }
        }

        let mut out = Vec::new();
        for located in self.scan_all(table_def, open)? {
            if pred.evaluate(&located.row, table_def)? {
                out.push(located);
            }
        }
        Ok(out)
    }

    fn locate_via_index(
        &self,
        table_def: &TableDef,
        open: &mut OpenTable,
        idx: &IndexDef,
        pred: &Predicate,
    ) -> DbResult<Vec<Located>> {
        let handle = open.indexes.get_mut(&idx.name).unwrap();
        let target_bytes = index::index_key_bytes(&pred.value, handle.column_width);
        let hash = index::djb2(&target_bytes);
        let mut cursor = handle.btree.find(hash)?;
        let mut row_ids = Vec::new();
        while !cursor.end_of_table {
            let (k, payload) = handle.btree.cursor_value(&cursor)?;
            if k != hash {
                break;
            }
            let (row_id, key_bytes) = index::decode_index_value(&payload);
            if key_bytes == target_bytes {
                row_ids.push(row_id);
            }
            handle.btree.advance(&mut cursor)?;
        }

        let mut out = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            let pk_cursor = open.btree.find(row_id)?;
            if let Some((k, bytes)) = open.btree.cell_at(&pk_cursor)? {
                if k == row_id {
                    out.push(Located {
                        cursor: pk_cursor,
                        key: row_id,
                        row: decode_row(table_def, &bytes)?,
                    });
                }
            }
        }
        Ok(out)
    }

    fn scan_all(&self, table_def: &TableDef, open: &mut OpenTable) -> DbResult<Vec<Located>> {
        let mut out = Vec::new();
        let mut cursor = open.btree.start()?;
        while !cursor.end_of_table {
            let (key, bytes) = open.btree.cursor_value(&cursor)?;
            out.push(Located {
                cursor,
                key,
                row: decode_row(table_def, &bytes)?,
            });
            open.btree.advance(&mut cursor)?;
        }
        Ok(out)
    }

    /// All (key, row) cells in key order, for the `meta btree` diagnostic
    /// dump.
    pub fn dump_btree(&self, table_name: &str) -> DbResult<Vec<(RowId, Row)>> {
        self.with_table(table_name, |table_def, open| {
            open.btree
                .iter_all()?
                .into_iter()
                .map(|(k, bytes)| Ok((k, decode_row(table_def, &bytes)?)))
                .collect()
        })
    }

    // ---- transactions -------------------------------------------------

    fn record_change(
        &self,
        txn_id: u32,
        target: &str,
        cell_num: usize,
        key: u32,
        old_bytes: Option<Vec<u8>>,
    ) -> DbResult<()> {
        let mut txns = self.txns.lock().unwrap();
        txns.record_change(
            txn_id,
            RowChange {
                target: target.to_string(),
                page_num: 0,
                cell_num: cell_num as u32,
                key,
                old_bytes,
            },
        );
        Ok(())
    }

    pub fn begin_txn(&self) -> DbResult<u32> {
        self.txns.lock().unwrap().begin()
    }

    pub fn commit_txn(&self, id: u32) -> DbResult<()> {
        self.txns.lock().unwrap().commit(id)
    }

    /// Undoes every change `id` recorded, then rebuilds the secondary
    /// indexes of any table touched: only the primary B-tree's pre-images
    /// are logged (see `RowChange`), so an index insert/removal made
    /// alongside a since-undone row write is never itself replayed — it's
    /// cheaper and just as correct to resync the index from the
    /// post-rollback table contents than to log a parallel pre-image per
    /// index cell.
    pub fn rollback_txn(&self, id: u32) -> DbResult<()> {
        let changes = self.txns.lock().unwrap().rollback(id)?;
        let mut tables = self.tables.write().unwrap();
        let mut touched = HashSet::new();
        for change in changes {
            let table_name = table_name_for_target(&self.catalog.read().unwrap(), &change.target);
            if let Some(table_name) = table_name {
                if let Some(open) = tables.get_mut(&table_name) {
                    apply_rollback(open.get_mut().unwrap(), &change)?;
                    touched.insert(table_name);
                }
            }
        }
        for table_name in touched {
            let table_def = self.table_def(&table_name)?;
            if table_def.indexes.is_empty() {
                continue;
            }
            if let Some(open) = tables.get_mut(&table_name) {
                rebuild_indexes(&table_def, open.get_mut().unwrap())?;
            }
        }
        Ok(())
    }

    pub fn txn_status(&self, id: u32) -> DbResult<Transaction> {
        self.txns.lock().unwrap().status(id).cloned()
    }

    pub fn enable_txns(&self) {
        self.txns.lock().unwrap().enable();
    }

    pub fn disable_txns(&self) {
        self.txns.lock().unwrap().disable();
    }

    // ---- ACL ------------------------------------------------------------

    pub fn login(&self, username: &str, password: &str) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.login(username, password)?;
        self.save_acl(&acl)
    }

    pub fn logout(&self, username: Option<&str>) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.logout(username);
        self.save_acl(&acl)
    }

    pub fn create_user(&self, username: &str, password: &str, role: Role) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.create_user(username, password, role)?;
        self.save_acl(&acl)
    }

    pub fn drop_user(&self, username: &str) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.drop_user(username)?;
        self.save_acl(&acl)
    }

    pub fn assign_role(&self, username: &str, role: Role) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.assign_role(username, role)?;
        self.save_acl(&acl)
    }

    pub fn check_permission(&self, username: Option<&str>, class: CommandClass) -> DbResult<()> {
        self.acl.read().unwrap().check_permission(username, class)
    }

    /// The role `username` currently holds (`Role::User` if unassigned),
    /// used by callers that gate a statement on admin-only access
    /// themselves rather than through `check_permission`'s matrix.
    pub fn acl_role(&self, username: &str) -> Role {
        self.acl.read().unwrap().role_of(username)
    }

    pub fn acl_enabled(&self) -> bool {
        self.acl.read().unwrap().enabled()
    }

    pub fn enable_acl(&self) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.enable();
        self.save_acl(&acl)
    }

    pub fn disable_acl(&self) -> DbResult<()> {
        let mut acl = self.acl.write().unwrap();
        acl.disable();
        self.save_acl(&acl)
    }

    pub fn active_sessions(&self) -> Vec<acl::Session> {
        self.acl.read().unwrap().active_sessions().to_vec()
    }
}

fn unique_collision(btree: &mut BTree, hash: u32, key_bytes: &[u8]) -> DbResult<bool> {
    let mut cursor = btree.find(hash)?;
    while !cursor.end_of_table {
        let (k, payload) = btree.cursor_value(&cursor)?;
        if k != hash {
            break;
        }
        let (_, existing_bytes) = index::decode_index_value(&payload);
        if existing_bytes == key_bytes {
            return Ok(true);
        }
        btree.advance(&mut cursor)?;
    }
    Ok(false)
}

fn remove_index_entry(btree: &mut BTree, hash: u32, row_id: RowId) -> DbResult<()> {
    let mut cursor = btree.find(hash)?;
    while !cursor.end_of_table {
        let (k, payload) = btree.cursor_value(&cursor)?;
        if k != hash {
            break;
        }
        let (candidate_row_id, _) = index::decode_index_value(&payload);
        if candidate_row_id == row_id {
            btree.delete_at(&cursor)?;
            return Ok(());
        }
        btree.advance(&mut cursor)?;
    }
    Ok(())
}

/// Clears and repopulates every index on `table_def` from `open.btree`'s
/// current cells, in primary-key order. Used after rollback, where index
/// cells inserted/removed alongside an undone row write have no pre-image
/// of their own (see `rollback_txn`).
fn rebuild_indexes(table_def: &TableDef, open: &mut OpenTable) -> DbResult<()> {
    let rows = open.btree.iter_all()?;
    for idx in &table_def.indexes {
        open.indexes.get_mut(&idx.name).unwrap().btree.clear()?;
    }
    for (row_id, raw) in &rows {
        let row = decode_row(table_def, raw)?;
        for idx in &table_def.indexes {
            let col_idx = table_def.column_index(&idx.column_name).unwrap();
            let handle = open.indexes.get_mut(&idx.name).unwrap();
            let key_bytes = index::index_key_bytes(&row.values[col_idx], handle.column_width);
            let hash = index::djb2(&key_bytes);
            let payload = index::encode_index_value(*row_id, &key_bytes, handle.column_width as usize);
            handle.btree.insert_duplicate(hash, &payload)?;
        }
    }
    Ok(())
}

fn table_name_for_target(cat: &Catalog, target: &str) -> Option<String> {
    cat.tables
        .iter()
        .find(|t| t.filename == target)
        .map(|t| t.name.clone())
}

/// Inverts one `RowChange` against the table's primary B-tree. Whether the
/// change was an insert or an update/delete is inferred, not stored: if the
/// slot the change names still holds the recorded key, the change only
/// replaced a value in place (undo restores
/// it); otherwise the slot was vacated by a later delete-of-this-row or
/// never existed before this change (undo removes/reinserts accordingly).
fn apply_rollback(open: &mut OpenTable, change: &RowChange) -> DbResult<()> {
    let cursor = Cursor {
        page_num: change.page_num as usize,
        cell_num: change.cell_num as usize,
        end_of_table: false,
    };
    match &change.old_bytes {
        None => {
            // This change was a fresh insert; undo by removing the cell
            // if it still holds the key it was given.
            if let Some((k, _)) = open.btree.cell_at(&cursor)? {
                if k == change.key {
                    open.btree.delete_at(&cursor)?;
                }
            }
        }
        Some(old_bytes) => match open.btree.cell_at(&cursor)? {
            Some((k, _)) if k == change.key => {
                // Key still present at this slot: it was an in-place update.
                open.btree.restore_value(&cursor, old_bytes)?;
            }
            _ => {
                // Key is gone: it was deleted. Reinsert its pre-image.
                open.btree.insert(change.key, old_bytes)?;
            }
        },
    }
    Ok(())
}
