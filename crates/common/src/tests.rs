use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.worker_threads, 8);
    assert!(cfg.acl_enabled);
}

#[test]
fn config_builder_overrides_defaults() {
    let cfg = Config::builder()
        .data_dir(PathBuf::from("/tmp/db"))
        .worker_threads(16)
        .acl_enabled(false)
        .build();
    assert_eq!(cfg.data_dir, PathBuf::from("/tmp/db"));
    assert_eq!(cfg.worker_threads, 16);
    assert!(!cfg.acl_enabled);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::TableFull;
    assert_eq!(format!("{err}"), "table is full");
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn row_key_reads_leading_int_column() {
    let row = Row::new(vec![Value::Int(7), Value::Str("alice".into())]);
    assert_eq!(row.key(), Some(7));
}

#[test]
fn row_key_rejects_negative_or_non_int() {
    assert_eq!(Row::new(vec![Value::Int(-1)]).key(), None);
    assert_eq!(Row::new(vec![Value::Str("x".into())]).key(), None);
}
