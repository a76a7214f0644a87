use super::*;
use common::DbError;
use tempfile::tempdir;

fn value(n: u8) -> Vec<u8> {
    vec![n; 8]
}

#[test]
fn insert_and_find_round_trip() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    tree.insert(3, &value(3)).unwrap();
    tree.insert(1, &value(1)).unwrap();
    tree.insert(2, &value(2)).unwrap();

    let cursor = tree.find(2).unwrap();
    let (key, val) = tree.cursor_value(&cursor).unwrap();
    assert_eq!(key, 2);
    assert_eq!(val, value(2));
}

#[test]
fn iter_all_is_sorted_by_key() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    for k in [5, 1, 4, 2, 3] {
        tree.insert(k, &value(k as u8)).unwrap();
    }
    let keys: Vec<u32> = tree.iter_all().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![1, 2, 3, 4, 5]);
}

#[test]
fn duplicate_key_is_rejected() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    tree.insert(1, &value(1)).unwrap();
    let err = tree.insert(1, &value(9)).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey));
}

#[test]
fn delete_removes_cell_and_shifts() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    tree.insert(1, &value(1)).unwrap();
    tree.insert(2, &value(2)).unwrap();
    tree.insert(3, &value(3)).unwrap();

    assert!(tree.delete(2).unwrap());
    let keys: Vec<u32> = tree.iter_all().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![1, 3]);
    assert!(!tree.delete(2).unwrap());
}

#[test]
fn table_full_once_max_cells_reached() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    let max = tree.layout().max_cells as u32;
    for k in 0..max {
        tree.insert(k, &value(1)).unwrap();
    }
    let err = tree.insert(max, &value(1)).unwrap_err();
    assert!(matches!(err, DbError::TableFull));
}

#[test]
fn insert_duplicate_clusters_equal_keys_in_insertion_order() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.idx"), 8).unwrap();
    tree.insert_duplicate(7, &value(1)).unwrap();
    tree.insert_duplicate(7, &value(2)).unwrap();
    tree.insert_duplicate(3, &value(3)).unwrap();

    let all = tree.iter_all().unwrap();
    assert_eq!(
        all,
        vec![(3, value(3)), (7, value(1)), (7, value(2))]
    );
}

#[test]
fn restore_value_overwrites_in_place_without_shifting() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    tree.insert(1, &value(1)).unwrap();
    tree.insert(2, &value(2)).unwrap();

    let cursor = tree.find(1).unwrap();
    tree.restore_value(&cursor, &value(9)).unwrap();
    let (key, val) = tree.cursor_value(&cursor).unwrap();
    assert_eq!(key, 1);
    assert_eq!(val, value(9));
    assert_eq!(tree.len().unwrap(), 2);
}

#[test]
fn delete_at_returns_removed_cell() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(&dir.path().join("t.tbl"), 8).unwrap();
    tree.insert(5, &value(5)).unwrap();
    let cursor = tree.find(5).unwrap();
    let (key, val) = tree.delete_at(&cursor).unwrap();
    assert_eq!((key, val), (5, value(5)));
    assert_eq!(tree.len().unwrap(), 0);
}

#[test]
fn persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tbl");
    {
        let mut tree = BTree::open(&path, 8).unwrap();
        tree.insert(10, &value(10)).unwrap();
        tree.close().unwrap();
    }
    let mut tree = BTree::open(&path, 8).unwrap();
    let cursor = tree.find(10).unwrap();
    let (key, val) = tree.cursor_value(&cursor).unwrap();
    assert_eq!(key, 10);
    assert_eq!(val, value(10));
}
