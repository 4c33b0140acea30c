//! Canonical JSON encoding: ASCII-only, keys sorted lexicographically at
//! every level, compact separators. Byte-identical output for
//! logically-identical values is a correctness property here, not
//! cosmetics — see SPEC_FULL.md §4.9.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;

/// Encode `value` as canonical JSON text.
pub fn canonicalize(value: &Value) -> String {
    let sorted = sort_keys(value);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
    sorted
        .serialize(&mut ser)
        .expect("serde_json::Value serialization is infallible");
    String::from_utf8(buf).expect("AsciiFormatter only ever writes ASCII bytes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// A `serde_json` formatter that re-escapes every non-ASCII character as
/// `\uXXXX` (with surrogate pairs for astral-plane characters). Everything
/// else is left to the default compact formatting.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut utf16_buf = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
                continue;
            }
            for unit in ch.encode_utf16(&mut utf16_buf) {
                write!(writer, "\\u{unit:04x}")?;
            }
        }
        Ok(())
    }
}
