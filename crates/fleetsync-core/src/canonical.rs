//! Canonical CBOR encoding of configuration tables.
//!
//! Domain checksums are computed over these bytes, so two instances holding
//! the same rows must produce identical output:
//! - Definite lengths only
//! - Lengths use the smallest valid encoding
//! - Tables encoded in the order given; rows in the order given
//!
//! Layout: `[ [name, [column...], [[value|null...]...]]... ]`

use ciborium::value::Value;

use crate::resultset::{ResultSet, Row};

/// A result set labelled with the table it came from.
pub type TableRef<'a> = (&'a str, &'a ResultSet);

/// Encode named tables to canonical bytes.
pub fn canonical_tables<'a, I>(tables: I) -> Vec<u8>
where
    I: IntoIterator<Item = TableRef<'a>>,
{
    let value = Value::Array(
        tables
            .into_iter()
            .map(|(name, set)| table_to_value(name, set))
            .collect(),
    );
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

fn table_to_value(name: &str, set: &ResultSet) -> Value {
    Value::Array(vec![
        Value::Text(name.to_string()),
        Value::Array(set.columns.iter().cloned().map(Value::Text).collect()),
        Value::Array(set.rows.iter().map(row_to_value).collect()),
    ])
}

fn row_to_value(row: &Row) -> Value {
    Value::Array(
        row.0
            .iter()
            .map(|v| match v {
                Some(s) => Value::Text(s.clone()),
                None => Value::Null,
            })
            .collect(),
    )
}

/// Recursively encode the subset of CBOR this module produces.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        // Only text, null and arrays are built above.
        _ => buf.push(0xf6),
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_encoding() {
        let bytes = canonical_tables(std::iter::empty());
        assert_eq!(bytes, vec![0x80]);
    }

    #[test]
    fn test_null_distinct_from_empty_text() {
        let with_null = ResultSet::new(["c"]).with_row(Row(vec![None]));
        let with_empty = ResultSet::new(["c"]).with_row(Row(vec![Some(String::new())]));
        assert_ne!(
            canonical_tables([("t", &with_null)]),
            canonical_tables([("t", &with_empty)])
        );
    }

    #[test]
    fn test_decodes_as_plain_cbor() {
        let set = ResultSet::new(["a", "b"]).with_row(Row::from_values(["1", "2"]));
        let bytes = canonical_tables([("t", &set)]);
        let value: Value = ciborium::from_reader(&bytes[..]).unwrap();
        match value {
            Value::Array(tables) => assert_eq!(tables.len(), 1),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_long_text_uses_wider_length() {
        let long = "x".repeat(300);
        let set = ResultSet::new(["c"]).with_row(Row::from_values([long.clone()]));
        let bytes = canonical_tables([("t", &set)]);
        // 0x79 = text string with 2-byte length
        let pos = bytes.windows(3).position(|w| w == [0x79, 0x01, 0x2c]);
        assert!(pos.is_some());
    }
}
