//! JSON <-> `types::Value` conversion, type-directed by a column's declared
//! `SqlType`: wire values carry no type tag of their own, so the schema must
//! supply it.

use common::{DbError, DbResult};
use serde_json::Value as JsonValue;
use types::{SqlType, Value};

pub fn parse_sql_type(name: &str) -> DbResult<SqlType> {
    match name.to_ascii_uppercase().as_str() {
        "INT" => Ok(SqlType::Int),
        "STRING" => Ok(SqlType::Str),
        "FLOAT" => Ok(SqlType::Float),
        "BOOL" => Ok(SqlType::Bool),
        "DATE" => Ok(SqlType::Date),
        "TIME" => Ok(SqlType::Time),
        "TIMESTAMP" => Ok(SqlType::Timestamp),
        "BLOB" => Ok(SqlType::Blob),
        other => Err(DbError::Parse(format!("unknown column type '{other}'"))),
    }
}

/// Converts one JSON scalar into a typed `Value`, per the column's
/// declared `SqlType`.
pub fn json_to_value(json: &JsonValue, ty: SqlType) -> DbResult<Value> {
    match ty {
        SqlType::Int => json
            .as_i64()
            .map(|v| Value::Int(v as i32))
            .ok_or_else(|| type_err("INT", json)),
        SqlType::Float => json
            .as_f64()
            .map(|v| Value::Float(v as f32))
            .ok_or_else(|| type_err("FLOAT", json)),
        SqlType::Bool => json.as_bool().map(Value::Bool).ok_or_else(|| type_err("BOOL", json)),
        SqlType::Date => json
            .as_i64()
            .map(|v| Value::Date(v as i32))
            .ok_or_else(|| type_err("DATE", json)),
        SqlType::Time => json
            .as_i64()
            .map(|v| Value::Time(v as i32))
            .ok_or_else(|| type_err("TIME", json)),
        SqlType::Timestamp => json
            .as_i64()
            .map(Value::Timestamp)
            .ok_or_else(|| type_err("TIMESTAMP", json)),
        SqlType::Str => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| type_err("STRING", json)),
        SqlType::Blob => json
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_u64().map(|n| n as u8))
                    .collect::<Vec<u8>>()
            })
            .map(Value::Blob)
            .ok_or_else(|| type_err("BLOB", json)),
    }
}

fn type_err(expected: &str, got: &JsonValue) -> DbError {
    DbError::Parse(format!("expected a JSON value coercible to {expected}, got {got}"))
}

/// Converts a typed `Value` back into JSON for a select result row.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Int(v) => JsonValue::from(*v),
        Value::Float(v) => JsonValue::from(*v),
        Value::Bool(v) => JsonValue::from(*v),
        Value::Date(v) => JsonValue::from(*v),
        Value::Time(v) => JsonValue::from(*v),
        Value::Timestamp(v) => JsonValue::from(*v),
        Value::Str(v) => JsonValue::from(v.clone()),
        Value::Blob(v) => JsonValue::from(v.iter().map(|b| JsonValue::from(*b)).collect::<Vec<_>>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        let j = serde_json::json!(42);
        let v = json_to_value(&j, SqlType::Int).unwrap();
        assert_eq!(v, Value::Int(42));
        assert_eq!(value_to_json(&v), j);
    }

    #[test]
    fn blob_round_trips_as_byte_array() {
        let j = serde_json::json!([1, 2, 3]);
        let v = json_to_value(&j, SqlType::Blob).unwrap();
        assert_eq!(v, Value::Blob(vec![1, 2, 3]));
        assert_eq!(value_to_json(&v), j);
    }

    #[test]
    fn wrong_json_shape_is_a_parse_error() {
        let j = serde_json::json!("not a number");
        assert!(matches!(json_to_value(&j, SqlType::Int), Err(DbError::Parse(_))));
    }
}
