//! Line-oriented record codec
//!
//! Serializes an ordered key/value record as `key<delimiter>value` lines.
//! Values are plain text, empty, or raw bytes; byte values are base64-encoded
//! behind a `b64:` marker so the file stays line-oriented. The delimiter is
//! configurable per file (`:` by default, the role ledger uses `::`).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;

/// Marker prefix for base64-encoded byte values
pub const BINARY_MARKER: &str = "b64:";

/// Default key/value delimiter
pub const DEFAULT_DELIMITER: &str = ":";

/// A single record value
///
/// `Unset` encodes identically to empty text; decoding never produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Unset,
    Bytes(Vec<u8>),
}

impl Value {
    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

/// Ordered key/value record; iteration order is insertion order
pub type Record = IndexMap<String, Value>;

/// Split a comma-joined list value, dropping empty tokens.
///
/// Member lists and role lists share this layout; non-text values parse as
/// empty lists.
pub(crate) fn split_joined(value: &Value) -> Vec<String> {
    match value.as_text() {
        Some(text) => text
            .split(',')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Decode raw file contents into a record.
///
/// Each line is split at the first occurrence of the delimiter. Lines without
/// the delimiter, with invalid UTF-8, or with an undecodable `b64:` payload
/// are skipped, not fatal.
pub fn decode(raw: &[u8], delimiter: &str) -> Record {
    let mut record = Record::new();
    for line in raw.split(|&byte| byte == b'\n') {
        if line.is_empty() {
            continue;
        }
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(_) => {
                tracing::warn!("skipping non-UTF-8 line");
                continue;
            }
        };
        let idx = match line.find(delimiter) {
            Some(idx) => idx,
            None => {
                // malformed line, ignore
                tracing::warn!("skipping malformed line without '{}'", delimiter);
                continue;
            }
        };
        let key = &line[..idx];
        let raw_value = &line[idx + delimiter.len()..];
        let value = if let Some(encoded) = raw_value.strip_prefix(BINARY_MARKER) {
            match BASE64.decode(encoded) {
                Ok(bytes) => Value::Bytes(bytes),
                Err(_) => {
                    tracing::warn!("skipping line with undecodable binary value");
                    continue;
                }
            }
        } else {
            Value::Text(raw_value.to_string())
        };
        record.insert(key.to_string(), value);
    }
    record
}

/// Encode a record as `key<delimiter>value\n` lines in iteration order.
pub fn encode(record: &Record, delimiter: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in record {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(delimiter.as_bytes());
        match value {
            Value::Text(text) => out.extend_from_slice(text.as_bytes()),
            Value::Unset => {}
            Value::Bytes(bytes) => {
                out.extend_from_slice(BINARY_MARKER.as_bytes());
                out.extend_from_slice(BASE64.encode(bytes).as_bytes());
            }
        }
        out.push(b'\n');
    }
    out
}
