use super::*;

fn change(key: u32, old: Option<&[u8]>) -> RowChange {
    RowChange {
        target: "users.tbl".to_string(),
        page_num: 0,
        cell_num: key,
        key,
        old_bytes: old.map(|b| b.to_vec()),
    }
}

#[test]
fn begin_fails_when_disabled() {
    let mut mgr = TransactionManager::new(4);
    mgr.disable();
    assert!(matches!(mgr.begin(), Err(DbError::ManagerDisabled)));
}

#[test]
fn begin_commit_releases_slot() {
    let mut mgr = TransactionManager::new(2);
    mgr.enable();
    let id = mgr.begin().unwrap();
    assert_eq!(mgr.status(id).unwrap().state, TxnState::Active);
    mgr.commit(id).unwrap();
    assert!(matches!(mgr.status(id), Err(DbError::NoSuchTransaction(_))));
}

#[test]
fn double_commit_fails_because_slot_is_freed() {
    let mut mgr = TransactionManager::new(2);
    mgr.enable();
    let id = mgr.begin().unwrap();
    mgr.commit(id).unwrap();
    assert!(matches!(mgr.commit(id), Err(DbError::NoSuchTransaction(_))));
}

#[test]
fn rollback_returns_changes_newest_first() {
    let mut mgr = TransactionManager::new(2);
    mgr.enable();
    let id = mgr.begin().unwrap();
    mgr.record_change(id, change(1, None));
    mgr.record_change(id, change(2, Some(&[9, 9])));
    let changes = mgr.rollback(id).unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].key, 2);
    assert_eq!(changes[1].key, 1);
}

#[test]
fn record_change_on_inactive_txn_is_noop() {
    let mut mgr = TransactionManager::new(2);
    mgr.enable();
    // not-yet-begun id: no matching slot, no-op, no panic.
    mgr.record_change(42, change(1, None));
}

#[test]
fn capacity_exhausted_yields_no_slot() {
    let mut mgr = TransactionManager::new(1);
    mgr.enable();
    let _id = mgr.begin().unwrap();
    assert!(matches!(mgr.begin(), Err(DbError::NoSlot)));
}

#[test]
fn ids_never_reissue_zero() {
    let mut mgr = TransactionManager::new(1);
    mgr.enable();
    mgr.next_id = u32::MAX;
    let id = mgr.begin().unwrap();
    assert_ne!(id, 0);
}
