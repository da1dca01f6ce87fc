//! Snapshot Records
//!
//! One [`Record`] per key. The `kind` code picks which payload field is
//! authoritative; exactly one payload field is serialized per record and a
//! payload missing from the file decodes as the kind's empty payload.
//!
//! Example file:
//!
//! ```json
//! {
//!   "hits":  { "kind": "D", "expires_at": 0, "scalar": "42" },
//!   "tags":  { "kind": "SS", "expires_at": 1754500000000, "items": ["a"] },
//!   "price": { "kind": "MI", "expires_at": 0, "int_fields": { "x": 5 } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::value::{Entry, Kind, Value};

/// The on-disk shape of a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub kind: Kind,
    /// Absolute epoch milliseconds, `0` for no expiry.
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_fields: Option<BTreeMap<String, i64>>,
}

impl Record {
    /// Captures an in-memory entry as its on-disk record.
    pub fn from_entry(entry: &Entry) -> Self {
        let mut record = Record {
            kind: entry.value.kind(),
            expires_at: entry.expires_at,
            scalar: None,
            items: None,
            fields: None,
            int_fields: None,
        };
        match &entry.value {
            Value::Str(s) | Value::Int(s) => record.scalar = Some(s.clone()),
            Value::StrList(items) | Value::IntList(items) => record.items = Some(items.clone()),
            Value::StrMap(m) => record.fields = Some(m.clone()),
            Value::IntMap(m) => record.int_fields = Some(m.clone()),
        }
        record
    }

    /// Rebuilds the in-memory entry. A payload field missing for the
    /// record's kind becomes that kind's empty payload.
    pub fn into_entry(self) -> Entry {
        let value = match self.kind {
            Kind::Str => Value::Str(self.scalar.unwrap_or_default()),
            Kind::Int => Value::Int(self.scalar.unwrap_or_default()),
            Kind::StrList => Value::StrList(self.items.unwrap_or_default()),
            Kind::IntList => Value::IntList(self.items.unwrap_or_default()),
            Kind::StrMap => Value::StrMap(self.fields.unwrap_or_default()),
            Kind::IntMap => Value::IntMap(self.int_fields.unwrap_or_default()),
        };
        Entry {
            value,
            expires_at: self.expires_at,
        }
    }
}

/// Serializes a full snapshot. The `BTreeMap` keeps the output byte-stable
/// across saves of the same state.
pub fn encode(records: &BTreeMap<String, Record>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(records)
}

/// Parses a snapshot file.
pub fn decode(bytes: &[u8]) -> serde_json::Result<BTreeMap<String, Record>> {
    serde_json::from_slice(bytes)
}
