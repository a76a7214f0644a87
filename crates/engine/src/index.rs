//! Secondary-index key hashing and cell payload framing.
//!
//! A secondary index's B-tree key is a djb2 hash of the indexed column's
//! raw bytes; its cell payload is logically `(row_id, key_size, key_bytes)`.
//! `btree::BTree` only supports fixed-width cell payloads (leaf geometry is
//! computed once per tree from a single `value_size`), so the payload here
//! is framed at a fixed capacity — `8 + column_width` bytes — with
//! `key_size` recording the true length of the raw key inside it.

use types::Value;

/// djb2: `h = 5381; h = h*33 + byte` for each byte.
pub fn djb2(bytes: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &b in bytes {
        h = h.wrapping_mul(33).wrapping_add(b as u32);
    }
    h
}

/// The raw bytes hashed (and re-compared on lookup) for one column value:
/// little-endian for INT/FLOAT/BOOL/DATE/TIME/TIMESTAMP, the string's used
/// length for STRING (no trailing padding), and up to `declared_size` bytes
/// for BLOB.
pub fn index_key_bytes(value: &Value, declared_size: u32) -> Vec<u8> {
    match value {
        Value::Str(s) => s.as_bytes().to_vec(),
        Value::Blob(b) => b[..b.len().min(declared_size as usize)].to_vec(),
        other => other
            .to_fixed_bytes(declared_size)
            .expect("fixed-width value always encodes"),
    }
}

/// Fixed on-disk width of one index cell's payload for a column whose raw
/// key bytes are at most `column_width` long.
pub fn value_size_for_index(column_width: u32) -> usize {
    4 + 4 + column_width as usize
}

/// Packs `(row_id, key_size, key_bytes)` into a fixed `capacity`-byte
/// payload, zero-padding `key_bytes` beyond its true length.
pub fn encode_index_value(row_id: u32, key_bytes: &[u8], capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + capacity);
    buf.extend_from_slice(&row_id.to_le_bytes());
    buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    let mut padded = key_bytes.to_vec();
    padded.resize(capacity, 0);
    buf.extend_from_slice(&padded);
    buf
}

/// Unpacks `(row_id, key_bytes)` from an index cell payload.
pub fn decode_index_value(bytes: &[u8]) -> (u32, Vec<u8>) {
    let row_id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let key_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    (row_id, bytes[8..8 + key_size].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_matches_reference_values() {
        assert_eq!(djb2(b""), 5381);
        assert_eq!(djb2(b"a"), 5381u32.wrapping_mul(33).wrapping_add(b'a' as u32));
    }

    #[test]
    fn index_value_round_trips() {
        let payload = encode_index_value(7, b"abc", 16);
        assert_eq!(payload.len(), 8 + 16);
        let (row_id, key_bytes) = decode_index_value(&payload);
        assert_eq!(row_id, 7);
        assert_eq!(key_bytes, b"abc");
    }

    #[test]
    fn string_key_bytes_are_unpadded() {
        assert_eq!(index_key_bytes(&Value::Str("hi".to_string()), 32), b"hi".to_vec());
    }
}
