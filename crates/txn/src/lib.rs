//! Transaction manager: a fixed-size slot table of in-flight transactions,
//! each owning a pre-image log used to undo its writes on rollback.
//!
//! `RowChange` is pushed onto a plain `Vec` and walked in newest-first
//! order on rollback.

use std::time::{SystemTime, UNIX_EPOCH};

use common::{DbError, DbResult};

/// One recorded pre-image: the cell's contents immediately before a
/// mutation. `old_bytes == None` means the cell did not exist before the
/// write (a plain insert/append), so rollback should delete it instead of
/// restoring bytes.
///
/// `target` names the backing file the change applies to (a table's
/// `.tbl` path or an index's `.idx` path). A transaction may touch a table
/// and its secondary indexes together; a plain
/// `(page_num, cell_num, key, old_bytes)` tuple can't tell the engine which
/// B-tree to replay into on rollback, so `target` is carried alongside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowChange {
    pub target: String,
    pub page_num: u32,
    pub cell_num: u32,
    pub key: u32,
    pub old_bytes: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Active,
    Committed,
    Aborted,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: u32,
    pub state: TxnState,
    pub start_ts: u64,
    pub changes: Vec<RowChange>,
}

impl Transaction {
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Slotted table of transactions. `id` is monotonic and never zero; zero
/// denotes "no transaction" to callers (e.g. `Connection`).
pub struct TransactionManager {
    slots: Vec<Option<Transaction>>,
    next_id: u32,
    enabled: bool,
}

impl TransactionManager {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            next_id: 1,
            enabled: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        id
    }

    fn find_slot(&self, id: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(txn) if txn.id == id))
    }

    /// Begins a new transaction, returning its id.
    pub fn begin(&mut self) -> DbResult<u32> {
        if !self.enabled {
            return Err(DbError::ManagerDisabled);
        }
        let slot = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(DbError::NoSlot)?;
        let id = self.alloc_id();
        self.slots[slot] = Some(Transaction {
            id,
            state: TxnState::Active,
            start_ts: now(),
            changes: Vec::new(),
        });
        log::info!("txn {id}: begin");
        Ok(id)
    }

    pub fn status(&self, id: u32) -> DbResult<&Transaction> {
        self.find_slot(id)
            .map(|slot| self.slots[slot].as_ref().unwrap())
            .ok_or(DbError::NoSuchTransaction(id))
    }

    /// Appends a pre-image to `id`'s change list. No-ops if `id` does not
    /// name an active transaction, since callers do not know at the point
    /// of mutation whether a transaction is active.
    pub fn record_change(&mut self, id: u32, change: RowChange) {
        if let Some(slot) = self.find_slot(id) {
            if let Some(txn) = &mut self.slots[slot] {
                if txn.state == TxnState::Active {
                    txn.changes.push(change);
                }
            }
        }
    }

    /// Releases the pre-image log without applying it and frees the slot.
    pub fn commit(&mut self, id: u32) -> DbResult<()> {
        let slot = self.find_slot(id).ok_or(DbError::NoSuchTransaction(id))?;
        let txn = self.slots[slot].as_mut().unwrap();
        if txn.state != TxnState::Active {
            return Err(DbError::NotActive);
        }
        txn.state = TxnState::Committed;
        log::info!("txn {id}: commit ({} changes released)", txn.changes.len());
        self.slots[slot] = None;
        Ok(())
    }

    /// Transitions `id` to aborted and hands the caller its change list,
    /// newest-first, so the caller can restore each pre-image to the page
    /// it came from. Frees the slot.
    pub fn rollback(&mut self, id: u32) -> DbResult<Vec<RowChange>> {
        let slot = self.find_slot(id).ok_or(DbError::NoSuchTransaction(id))?;
        let txn = self.slots[slot].as_mut().unwrap();
        if txn.state != TxnState::Active {
            return Err(DbError::NotActive);
        }
        txn.state = TxnState::Aborted;
        let mut changes = std::mem::take(&mut txn.changes);
        changes.reverse();
        log::info!("txn {id}: rollback ({} changes applied)", changes.len());
        self.slots[slot] = None;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests;
