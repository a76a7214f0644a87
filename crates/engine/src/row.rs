//! Row encode/decode against a `TableDef`'s fixed-width layout.

use catalog::TableDef;
use common::{DbError, DbResult, Row, RowId};
use types::Value;

/// Packs `values` into the table's fixed-width on-disk row layout. The
/// first column's value must be a non-negative `Int`: the first column is
/// always the primary key (INT, unique, unsigned).
pub fn encode_row(table: &TableDef, values: &[Value]) -> DbResult<Vec<u8>> {
    if values.len() != table.columns.len() {
        return Err(DbError::Parse(format!(
            "expected {} values for table '{}', got {}",
            table.columns.len(),
            table.name,
            values.len()
        )));
    }
    let mut buf = Vec::with_capacity(table.row_width() as usize);
    for (col, value) in table.columns.iter().zip(values) {
        if value.sql_type() != col.ty {
            return Err(DbError::Parse(format!(
                "column '{}' expects {:?}, got {:?}",
                col.name,
                col.ty,
                value.sql_type()
            )));
        }
        let bytes = value.to_fixed_bytes(col.size).map_err(|e| match e {
            types::ValueError::StringTooLong { max, got } => DbError::StringTooLong {
                column: col.name.clone(),
                max,
                got,
            },
            other => DbError::Parse(other.to_string()),
        })?;
        buf.extend_from_slice(&bytes);
    }
    Ok(buf)
}

/// Unpacks one row's worth of bytes per the table's declared columns.
pub fn decode_row(table: &TableDef, bytes: &[u8]) -> DbResult<Row> {
    let mut values = Vec::with_capacity(table.columns.len());
    let mut offset = 0usize;
    for col in &table.columns {
        let width = col.width() as usize;
        let slice = &bytes[offset..offset + width];
        let value = Value::from_fixed_bytes(col.ty, col.size, slice)
            .map_err(|e| DbError::Parse(e.to_string()))?;
        values.push(value);
        offset += width;
    }
    Ok(Row::new(values))
}

/// Extracts the unsigned primary key from a row's first value.
pub fn row_key(values: &[Value]) -> DbResult<RowId> {
    match values.first() {
        Some(Value::Int(v)) if *v >= 0 => Ok(*v as u32),
        Some(Value::Int(_)) => Err(DbError::NegativeId),
        _ => Err(DbError::Parse("primary key column must be INT".to_string())),
    }
}
