//! Catalog: the persistent directory of tables (and, in-memory only,
//! indexes) within one database.
//!
//! The on-disk catalog file persists table/column metadata only. Index
//! definitions are kept in memory for the life of the process and are not
//! written to the `.catalog` file; they are rebuilt by `create_index` calls,
//! not by catalog reload. See DESIGN.md.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::{DbError, DbResult};
use types::SqlType;

pub const MAX_TABLE_NAME: usize = 64;
pub const MAX_COLUMN_NAME: usize = 64;
pub const MAX_INDEX_NAME: usize = 64;
pub const MAX_TABLES: usize = 32;
pub const MAX_COLUMNS: usize = 16;
pub const MAX_INDEXES_PER_TABLE: usize = 16;
pub const FILENAME_SIZE: usize = 256;
pub const DATABASE_NAME_SIZE: usize = 256;

fn write_fixed(w: &mut impl Write, s: &str, len: usize) -> io::Result<()> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf)
}

fn read_fixed(r: &mut impl Read, len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    pub size: u32,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: SqlType, size: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            size,
        }
    }

    /// On-disk width of one value of this column.
    pub fn width(&self) -> u32 {
        self.ty.width(self.size)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub column_name: String,
    pub root_page_num: u32,
    pub filename: String,
    pub is_unique: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub root_page_num: u32,
    pub filename: String,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row_width(&self) -> u32 {
        self.columns.iter().map(|c| c.width()).sum()
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|ix| ix.name == name)
    }

    pub fn find_index_by_column(&self, column: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|ix| ix.column_name == column)
    }

    fn write(&self, w: &mut impl Write) -> DbResult<()> {
        write_fixed(w, &self.name, MAX_TABLE_NAME)?;
        w.write_u32::<LittleEndian>(self.columns.len() as u32)?;
        for col in &self.columns {
            write_fixed(w, &col.name, MAX_COLUMN_NAME)?;
            w.write_u32::<LittleEndian>(col.ty as u32)?;
            w.write_u32::<LittleEndian>(col.size)?;
        }
        w.write_u32::<LittleEndian>(self.root_page_num)?;
        write_fixed(w, &self.filename, FILENAME_SIZE)?;
        Ok(())
    }

    fn read(r: &mut impl Read) -> DbResult<Self> {
        let name = read_fixed(r, MAX_TABLE_NAME)?;
        let num_columns = r.read_u32::<LittleEndian>()?;
        let mut columns = Vec::with_capacity(num_columns as usize);
        for _ in 0..num_columns {
            let col_name = read_fixed(r, MAX_COLUMN_NAME)?;
            let ty_tag = r.read_u32::<LittleEndian>()?;
            let ty = SqlType::from_u32(ty_tag)
                .ok_or_else(|| DbError::Parse(format!("corrupt column type tag {ty_tag}")))?;
            let size = r.read_u32::<LittleEndian>()?;
            columns.push(ColumnDef::new(col_name, ty, size));
        }
        let root_page_num = r.read_u32::<LittleEndian>()?;
        let filename = read_fixed(r, FILENAME_SIZE)?;
        Ok(Self {
            name,
            columns,
            root_page_num,
            filename,
            indexes: Vec::new(),
        })
    }
}

/// Set of named table definitions for one database.
#[derive(Clone, Debug)]
pub struct Catalog {
    pub tables: Vec<TableDef>,
    pub active_table: u32,
    pub database_name: String,
    /// Root directory `Table`/`Index` paths are built under — not persisted
    /// to the catalog file, supplied fresh by the caller (`Database::open`)
    /// on every load, the same way `data_dir` itself is a runtime config
    /// value rather than an on-disk field.
    data_dir: PathBuf,
}

impl Catalog {
    pub fn new(database_name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            tables: Vec::new(),
            active_table: 0,
            database_name: database_name.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Loads a catalog from `path`. If the file does not exist, returns an
    /// empty catalog whose `database_name` is parsed out of the path's
    /// `Database/<name>/...` convention, matching `catalog_load_from_path`'s
    /// fallback behavior. `data_dir` is the root table/index files are
    /// rooted under, the same value `Database::open` derives its own
    /// catalog/ACL paths from.
    pub fn load_from_path(path: &Path, data_dir: impl Into<PathBuf>) -> DbResult<Self> {
        let data_dir = data_dir.into();
        if !path.exists() {
            let database_name = parse_database_name(path).unwrap_or_default();
            return Ok(Self::new(database_name, data_dir));
        }
        let mut file = File::open(path)?;
        let num_tables = file.read_u32::<LittleEndian>()?;
        if num_tables as usize > MAX_TABLES {
            return Err(DbError::Parse("catalog file exceeds MAX_TABLES".into()));
        }
        let active_table = file.read_u32::<LittleEndian>()?;
        let database_name = read_fixed(&mut file, DATABASE_NAME_SIZE)?;
        let mut tables = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            tables.push(TableDef::read(&mut file)?);
        }
        Ok(Self {
            tables,
            active_table,
            database_name,
            data_dir,
        })
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_u32::<LittleEndian>(self.tables.len() as u32)?;
        file.write_u32::<LittleEndian>(self.active_table)?;
        write_fixed(&mut file, &self.database_name, DATABASE_NAME_SIZE)?;
        for table in &self.tables {
            table.write(&mut file)?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn table_file_path(&self, table_name: &str) -> String {
        self.data_dir
            .join(&self.database_name)
            .join("Tables")
            .join(format!("{table_name}.tbl"))
            .to_string_lossy()
            .into_owned()
    }

    pub fn find_table(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    pub fn table(&self, name: &str) -> DbResult<&TableDef> {
        self.find_table(name)
            .map(|idx| &self.tables[idx])
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> DbResult<&mut TableDef> {
        let idx = self
            .find_table(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        Ok(&mut self.tables[idx])
    }

    pub fn add_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> DbResult<&TableDef> {
        if self.tables.len() >= MAX_TABLES {
            return Err(DbError::CapacityExceeded);
        }
        if columns.len() > MAX_COLUMNS {
            return Err(DbError::Parse(format!(
                "table '{name}' declares more than {MAX_COLUMNS} columns"
            )));
        }
        if self.find_table(name).is_some() {
            return Err(DbError::DuplicateTable(name.to_string()));
        }
        let filename = self.table_file_path(name);
        self.tables.push(TableDef {
            name: name.to_string(),
            columns,
            root_page_num: 0,
            filename,
            indexes: Vec::new(),
        });
        Ok(self.tables.last().unwrap())
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<TableDef> {
        let idx = self
            .find_table(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        Ok(self.tables.remove(idx))
    }

    pub fn set_active(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .find_table(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        self.active_table = idx as u32;
        Ok(())
    }

    pub fn active(&self) -> Option<&TableDef> {
        self.tables.get(self.active_table as usize)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active().map(|t| t.name.as_str())
    }

    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        column: &str,
        is_unique: bool,
    ) -> DbResult<&IndexDef> {
        let index_path = self
            .data_dir
            .join(&self.database_name)
            .join("Tables")
            .join(format!("{table_name}_{index_name}.idx"));
        let table = self.table_mut(table_name)?;
        if table.columns.iter().all(|c| c.name != column) {
            return Err(DbError::UnknownColumn(column.to_string()));
        }
        if table.indexes.iter().any(|ix| ix.name == index_name) {
            return Err(DbError::DuplicateIndex(index_name.to_string()));
        }
        if table.indexes.len() >= MAX_INDEXES_PER_TABLE {
            return Err(DbError::CapacityExceeded);
        }
        let filename = index_path.to_string_lossy().into_owned();
        table.indexes.push(IndexDef {
            name: index_name.to_string(),
            column_name: column.to_string(),
            root_page_num: 0,
            filename,
            is_unique,
        });
        Ok(table.indexes.last().unwrap())
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<IndexDef> {
        let table = self.table_mut(table_name)?;
        let idx = table
            .indexes
            .iter()
            .position(|ix| ix.name == index_name)
            .ok_or_else(|| DbError::UnknownIndex(index_name.to_string()))?;
        Ok(table.indexes.remove(idx))
    }

    /// Re-synthesizes each table's canonical file path and renames the
    /// on-disk file if it was previously filed elsewhere. Renaming a
    /// missing source path is a no-op, not an error.
    pub fn migrate_table_paths(&mut self) -> DbResult<()> {
        let data_dir = self.data_dir.clone();
        let database_name = self.database_name.clone();
        for table in &mut self.tables {
            let canonical = data_dir
                .join(&database_name)
                .join("Tables")
                .join(format!("{}.tbl", table.name))
                .to_string_lossy()
                .into_owned();
            if table.filename != canonical {
                let old = Path::new(&table.filename);
                if old.exists() {
                    if let Some(parent) = Path::new(&canonical).parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::rename(old, &canonical)?;
                }
                table.filename = canonical;
            }
        }
        Ok(())
    }
}

fn parse_database_name(path: &Path) -> Option<String> {
    let s = path.to_str()?;
    let idx = s.find("Database/")? + "Database/".len();
    let rest = &s[idx..];
    let end = rest.find('/')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests;
