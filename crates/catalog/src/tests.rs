use super::*;
use tempfile::tempdir;

fn sample_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", SqlType::Int, 4),
        ColumnDef::new("name", SqlType::Str, 32),
    ]
}

fn expected_path(data_dir: &Path, file: &str) -> String {
    data_dir
        .join("demo")
        .join("Tables")
        .join(file)
        .to_string_lossy()
        .into_owned()
}

#[test]
fn add_and_find_table() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    assert_eq!(cat.find_table("users"), Some(0));
    let table = cat.table("users").unwrap();
    assert_eq!(table.filename, expected_path(data_dir.path(), "users.tbl"));
    assert_eq!(table.column_index("name"), Some(1));
}

#[test]
fn rejects_duplicate_table_names() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    let err = cat.add_table("users", sample_columns()).unwrap_err();
    assert!(matches!(err, DbError::DuplicateTable(_)));
}

#[test]
fn set_and_read_active_table() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    cat.add_table("orders", sample_columns()).unwrap();
    cat.set_active("orders").unwrap();
    assert_eq!(cat.active().unwrap().name, "orders");
}

#[test]
fn create_index_validates_column_and_rejects_duplicates() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    cat.create_index("users", "idx_name", "name", false).unwrap();
    let dup = cat
        .create_index("users", "idx_name", "name", false)
        .unwrap_err();
    assert!(matches!(dup, DbError::DuplicateIndex(_)));

    let bad_col = cat
        .create_index("users", "idx_bogus", "nope", false)
        .unwrap_err();
    assert!(matches!(bad_col, DbError::UnknownColumn(_)));
}

#[test]
fn catalog_round_trips_bit_for_bit() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    cat.set_active("users").unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("demo.catalog");
    cat.save(&path).unwrap();

    let loaded = Catalog::load_from_path(&path, data_dir.path()).unwrap();
    assert_eq!(loaded.database_name, "demo");
    assert_eq!(loaded.active_table, 0);
    let table = loaded.table("users").unwrap();
    assert_eq!(table.columns, sample_columns());
    assert_eq!(table.filename, expected_path(data_dir.path(), "users.tbl"));
}

#[test]
fn load_from_missing_path_parses_database_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Database").join("demo").join("demo.catalog");
    let cat = Catalog::load_from_path(&path, dir.path().join("Database")).unwrap();
    assert_eq!(cat.database_name, "demo");
    assert!(cat.tables.is_empty());
}

#[test]
fn drop_table_removes_it() {
    let data_dir = tempdir().unwrap();
    let mut cat = Catalog::new("demo", data_dir.path());
    cat.add_table("users", sample_columns()).unwrap();
    cat.drop_table("users").unwrap();
    assert!(cat.table("users").is_err());
}
