//! Leaf-only B-tree. Used both for a table's primary-key index and for
//! secondary indexes, which store a hashed key instead of a `u32` primary
//! key but share the same cell/cursor machinery.
//!
//! Splitting is an explicit non-goal: once a leaf's `max_cells` is reached,
//! `insert` returns `DbError::TableFull` rather than growing a second level.

mod node;

use std::cmp::Ordering;
use std::path::Path;

use common::DbResult;
use storage::Pager;

pub use node::{LeafLayout, LEAF_HEADER_SIZE};
pub use storage::PAGE_SIZE;

/// Cursor locating a cell by page and slot. The page/cell-number form is
/// canonical; there is no row-number variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub page_num: usize,
    pub cell_num: usize,
    pub end_of_table: bool,
}

/// A single-leaf B-tree over one pager. `value_size` is the fixed on-disk
/// width of each cell's payload (the row's packed bytes for a primary
/// table, or `row_id + key_size + key_bytes` for a secondary index).
pub struct BTree {
    pager: Pager,
    layout: LeafLayout,
}

impl BTree {
    pub fn open(path: &Path, value_size: usize) -> DbResult<Self> {
        let mut pager = Pager::open(path)?;
        let layout = LeafLayout::new(value_size);
        if pager.num_pages() == 0 {
            let page = pager.allocate_page()?;
            debug_assert_eq!(page, 0);
            node::initialize_leaf(pager.get_page(0)?);
            pager.flush(0)?;
        }
        Ok(Self { pager, layout })
    }

    pub fn layout(&self) -> &LeafLayout {
        &self.layout
    }

    pub fn len(&mut self) -> DbResult<usize> {
        Ok(node::num_cells(self.pager.get_page(0)?) as usize)
    }

    pub fn is_empty(&mut self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn start(&mut self) -> DbResult<Cursor> {
        let num_cells = self.len()?;
        Ok(Cursor {
            page_num: 0,
            cell_num: 0,
            end_of_table: num_cells == 0,
        })
    }

    /// Binary search for `key`. If present, the cursor lands on its cell;
    /// otherwise it lands on the cell a new entry with that key would
    /// occupy (a lower-bound find).
    pub fn find(&mut self, key: u32) -> DbResult<Cursor> {
        let page = self.pager.get_page(0)?;
        let num_cells = node::num_cells(page) as usize;
        let mut lo = 0usize;
        let mut hi = num_cells;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = node::cell_key(page, &self.layout, mid);
            match mid_key.cmp(&key) {
                Ordering::Equal => {
                    return Ok(Cursor {
                        page_num: 0,
                        cell_num: mid,
                        end_of_table: false,
                    });
                }
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Ok(Cursor {
            page_num: 0,
            cell_num: lo,
            end_of_table: lo >= num_cells,
        })
    }

    pub fn advance(&mut self, cursor: &mut Cursor) -> DbResult<()> {
        let num_cells = node::num_cells(self.pager.get_page(cursor.page_num)?) as usize;
        cursor.cell_num += 1;
        cursor.end_of_table = cursor.cell_num >= num_cells;
        Ok(())
    }

    pub fn cursor_value(&mut self, cursor: &Cursor) -> DbResult<(u32, Vec<u8>)> {
        let page = self.pager.get_page(cursor.page_num)?;
        let key = node::cell_key(page, &self.layout, cursor.cell_num);
        let value = node::cell_value(page, &self.layout, cursor.cell_num).to_vec();
        Ok((key, value))
    }

    fn insert_at(&mut self, cell_num: usize, key: u32, value: &[u8]) -> DbResult<()> {
        debug_assert_eq!(value.len(), self.layout.value_size);
        let page = self.pager.get_page(0)?;
        let num_cells = node::num_cells(page) as usize;
        if num_cells >= self.layout.max_cells {
            return Err(common::DbError::TableFull);
        }
        for i in (cell_num..num_cells).rev() {
            let src = self.layout.cell_offset(i);
            let dst = self.layout.cell_offset(i + 1);
            let len = self.layout.cell_size;
            page.copy_within(src..src + len, dst);
        }
        node::set_cell_key(page, &self.layout, cell_num, key);
        node::set_cell_value(page, &self.layout, cell_num, value);
        node::set_num_cells(page, num_cells as u32 + 1);
        self.pager.flush(0)?;
        Ok(())
    }

    /// Inserts `value` under `key`. Shifts every cell at or after the
    /// insertion point one slot to the right. Fails with `DuplicateKey` if
    /// `key` is already present (the primary-key and unique-index case).
    pub fn insert(&mut self, key: u32, value: &[u8]) -> DbResult<()> {
        let cursor = self.find(key)?;
        {
            let page = self.pager.get_page(0)?;
            let num_cells = node::num_cells(page) as usize;
            if cursor.cell_num < num_cells
                && node::cell_key(page, &self.layout, cursor.cell_num) == key
            {
                return Err(common::DbError::DuplicateKey);
            }
        }
        self.insert_at(cursor.cell_num, key, value)
    }

    /// Inserts `value` under `key` without rejecting an existing equal
    /// key, landing after any cells already sharing that key: a hashed
    /// secondary-index key is expected to collide across distinct rows.
    pub fn insert_duplicate(&mut self, key: u32, value: &[u8]) -> DbResult<()> {
        let mut cursor = self.find(key)?;
        {
            let page = self.pager.get_page(0)?;
            let num_cells = node::num_cells(page) as usize;
            while cursor.cell_num < num_cells
                && node::cell_key(page, &self.layout, cursor.cell_num) == key
            {
                cursor.cell_num += 1;
            }
        }
        self.insert_at(cursor.cell_num, key, value)
    }

    /// Removes the cell keyed by `key`, if present. Returns whether a cell
    /// was removed.
    pub fn delete(&mut self, key: u32) -> DbResult<bool> {
        let cursor = self.find(key)?;
        let page = self.pager.get_page(0)?;
        let num_cells = node::num_cells(page) as usize;
        if cursor.cell_num >= num_cells
            || node::cell_key(page, &self.layout, cursor.cell_num) != key
        {
            return Ok(false);
        }
        drop(page);
        self.delete_at(&cursor)?;
        Ok(true)
    }

    /// Removes the cell at an already-located cursor, shifting subsequent
    /// cells left. Returns the removed cell's (key, value) so the caller
    /// can retain it as a transaction pre-image.
    pub fn delete_at(&mut self, cursor: &Cursor) -> DbResult<(u32, Vec<u8>)> {
        let page = self.pager.get_page(cursor.page_num)?;
        let num_cells = node::num_cells(page) as usize;
        debug_assert!(cursor.cell_num < num_cells, "delete_at: cursor out of range");
        let key = node::cell_key(page, &self.layout, cursor.cell_num);
        let value = node::cell_value(page, &self.layout, cursor.cell_num).to_vec();
        for i in cursor.cell_num..num_cells - 1 {
            let src = self.layout.cell_offset(i + 1);
            let dst = self.layout.cell_offset(i);
            let len = self.layout.cell_size;
            page.copy_within(src..src + len, dst);
        }
        node::set_num_cells(page, num_cells as u32 - 1);
        self.pager.flush(cursor.page_num)?;
        Ok((key, value))
    }

    /// Overwrites the value of an existing cell in place (the key and cell
    /// count are unchanged). Used to undo an update during rollback.
    pub fn restore_value(&mut self, cursor: &Cursor, value: &[u8]) -> DbResult<()> {
        let page = self.pager.get_page(cursor.page_num)?;
        node::set_cell_value(page, &self.layout, cursor.cell_num, value);
        self.pager.flush(cursor.page_num)?;
        Ok(())
    }

    /// The cell currently at `cursor`, if `cursor` still names a live
    /// slot (used to decide whether a recorded change was an update — the
    /// key is still present — or a delete, during rollback).
    pub fn cell_at(&mut self, cursor: &Cursor) -> DbResult<Option<(u32, Vec<u8>)>> {
        let page = self.pager.get_page(cursor.page_num)?;
        let num_cells = node::num_cells(page) as usize;
        if cursor.cell_num >= num_cells {
            return Ok(None);
        }
        let key = node::cell_key(page, &self.layout, cursor.cell_num);
        let value = node::cell_value(page, &self.layout, cursor.cell_num).to_vec();
        Ok(Some((key, value)))
    }

    /// Empties the tree. Used to rebuild a secondary index from scratch
    /// (build-by-scan, and transaction rollback's index resync) without
    /// needing per-cell deletion.
    pub fn clear(&mut self) -> DbResult<()> {
        let page = self.pager.get_page(0)?;
        node::set_num_cells(page, 0);
        self.pager.flush(0)?;
        Ok(())
    }

    /// All (key, value) cells in ascending key order. Used for full-table
    /// scans and the `meta btree` diagnostic dump.
    pub fn iter_all(&mut self) -> DbResult<Vec<(u32, Vec<u8>)>> {
        let mut out = Vec::with_capacity(self.len()?);
        let mut cursor = self.start()?;
        while !cursor.end_of_table {
            out.push(self.cursor_value(&cursor)?);
            self.advance(&mut cursor)?;
        }
        Ok(out)
    }

    pub fn close(self) -> DbResult<()> {
        self.pager.close()
    }
}

#[cfg(test)]
mod tests;
