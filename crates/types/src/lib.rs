//! SQL value and type definitions shared across the storage engine.
//!
//! Column types map onto a fixed on-disk byte width (`SqlType::fixed_width`)
//! except `Str`/`Blob`, whose width is declared per-column in the catalog.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column type tag. The discriminants match the on-disk catalog encoding
/// (`u32 type // enum 0..7`) byte for byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum SqlType {
    Int = 0,
    Str = 1,
    Float = 2,
    Bool = 3,
    Date = 4,
    Time = 5,
    Timestamp = 6,
    Blob = 7,
}

impl SqlType {
    pub fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Int),
            1 => Some(Self::Str),
            2 => Some(Self::Float),
            3 => Some(Self::Bool),
            4 => Some(Self::Date),
            5 => Some(Self::Time),
            6 => Some(Self::Timestamp),
            7 => Some(Self::Blob),
            _ => None,
        }
    }

    /// Fixed on-disk width in bytes, or `None` for the variable-size types
    /// (`Str`/`Blob`), whose width is the column's declared `size`.
    pub fn fixed_width(self) -> Option<u32> {
        match self {
            SqlType::Int => Some(4),
            SqlType::Float => Some(4),
            SqlType::Bool => Some(1),
            SqlType::Date => Some(4),
            SqlType::Time => Some(4),
            SqlType::Timestamp => Some(8),
            SqlType::Str | SqlType::Blob => None,
        }
    }

    /// On-disk width for a column of this type given its declared `size`
    /// (ignored for fixed-width types). Blob additionally carries a
    /// leading 4-byte length, so its on-disk width is `size + 4`.
    pub fn width(self, declared_size: u32) -> u32 {
        match self {
            SqlType::Blob => declared_size + 4,
            other => other.fixed_width().unwrap_or(declared_size),
        }
    }
}

/// A runtime SQL value. `Date` is days since 1970-01-01, `Time` is seconds
/// since midnight, `Timestamp` is seconds since the epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Str(String),
    Float(f32),
    Bool(bool),
    Date(i32),
    Time(i32),
    Timestamp(i64),
    Blob(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("value does not match column type {0:?}")]
    TypeMismatch(SqlType),
    #[error("string value too long for column (max {max}, got {got})")]
    StringTooLong { max: u32, got: usize },
    #[error("blob value too long for column (max {max}, got {got})")]
    BlobTooLong { max: u32, got: usize },
    #[error("corrupt fixed-width encoding for {0:?}")]
    Decode(SqlType),
}

impl Value {
    pub fn sql_type(&self) -> SqlType {
        match self {
            Value::Int(_) => SqlType::Int,
            Value::Str(_) => SqlType::Str,
            Value::Float(_) => SqlType::Float,
            Value::Bool(_) => SqlType::Bool,
            Value::Date(_) => SqlType::Date,
            Value::Time(_) => SqlType::Time,
            Value::Timestamp(_) => SqlType::Timestamp,
            Value::Blob(_) => SqlType::Blob,
        }
    }

    /// Numeric comparison for INT/FLOAT/BOOL/DATE/TIME/TIMESTAMP, byte-wise
    /// for STRING. BLOB has no defined ordering.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }

    pub fn equals(&self, other: &Value) -> Option<bool> {
        self.compare(other).map(|o| o == Ordering::Equal)
    }

    /// Encode into the fixed-width on-disk form for `ty`/`declared_size`.
    /// Strings are null-padded to `declared_size` bytes; blobs are stored
    /// as a leading `u32` length followed by up to `declared_size` bytes
    /// of payload, zero-padded to a constant cell width.
    pub fn to_fixed_bytes(&self, declared_size: u32) -> Result<Vec<u8>, ValueError> {
        match self {
            Value::Int(v) => Ok(v.to_le_bytes().to_vec()),
            Value::Float(v) => Ok(v.to_le_bytes().to_vec()),
            Value::Bool(v) => Ok(vec![if *v { 1 } else { 0 }]),
            Value::Date(v) => Ok(v.to_le_bytes().to_vec()),
            Value::Time(v) => Ok(v.to_le_bytes().to_vec()),
            Value::Timestamp(v) => Ok(v.to_le_bytes().to_vec()),
            Value::Str(s) => {
                if s.len() as u32 > declared_size {
                    return Err(ValueError::StringTooLong {
                        max: declared_size,
                        got: s.len(),
                    });
                }
                let mut buf = vec![0u8; declared_size as usize];
                buf[..s.len()].copy_from_slice(s.as_bytes());
                Ok(buf)
            }
            Value::Blob(b) => {
                if b.len() as u32 > declared_size {
                    return Err(ValueError::BlobTooLong {
                        max: declared_size,
                        got: b.len(),
                    });
                }
                let mut buf = Vec::with_capacity(4 + declared_size as usize);
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
                buf.resize(4 + declared_size as usize, 0);
                Ok(buf)
            }
        }
    }

    /// Decode a fixed-width on-disk cell for `ty`/`declared_size`.
    pub fn from_fixed_bytes(
        ty: SqlType,
        declared_size: u32,
        bytes: &[u8],
    ) -> Result<Value, ValueError> {
        match ty {
            SqlType::Int => {
                let arr: [u8; 4] = bytes[..4].try_into().map_err(|_| ValueError::Decode(ty))?;
                Ok(Value::Int(i32::from_le_bytes(arr)))
            }
            SqlType::Float => {
                let arr: [u8; 4] = bytes[..4].try_into().map_err(|_| ValueError::Decode(ty))?;
                Ok(Value::Float(f32::from_le_bytes(arr)))
            }
            SqlType::Bool => Ok(Value::Bool(bytes[0] != 0)),
            SqlType::Date => {
                let arr: [u8; 4] = bytes[..4].try_into().map_err(|_| ValueError::Decode(ty))?;
                Ok(Value::Date(i32::from_le_bytes(arr)))
            }
            SqlType::Time => {
                let arr: [u8; 4] = bytes[..4].try_into().map_err(|_| ValueError::Decode(ty))?;
                Ok(Value::Time(i32::from_le_bytes(arr)))
            }
            SqlType::Timestamp => {
                let arr: [u8; 8] = bytes[..8].try_into().map_err(|_| ValueError::Decode(ty))?;
                Ok(Value::Timestamp(i64::from_le_bytes(arr)))
            }
            SqlType::Str => {
                let slice = &bytes[..declared_size as usize];
                let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
                let s = String::from_utf8_lossy(&slice[..end]).into_owned();
                Ok(Value::Str(s))
            }
            SqlType::Blob => {
                let len_arr: [u8; 4] = bytes[..4].try_into().map_err(|_| ValueError::Decode(ty))?;
                let len = u32::from_le_bytes(len_arr) as usize;
                Ok(Value::Blob(bytes[4..4 + len].to_vec()))
            }
        }
    }
}
