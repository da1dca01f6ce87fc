//! Typed Values and Entries
//!
//! Every key in the store maps to exactly one [`Entry`]: a payload plus an
//! absolute expiry timestamp. The payload is a tagged union over the six
//! supported shapes, so code can never read a list out of a scalar entry or
//! a string map out of an integer map. The variant *is* the kind.
//!
//! ## Kind Inference
//!
//! A key's kind is decided once, when the key is first written:
//!
//! - Scalars: a value wrapped in `"` quotes becomes a string, a bare integer
//!   literal becomes an integer, anything else is rejected.
//! - Lists: the first pushed element decides. If it parses as a base-10
//!   integer the list is an integer list and every element must parse.
//! - Maps: if any field value is not an integer literal the whole entry is a
//!   string map, otherwise an integer map. The two shapes never mix.
//!
//! Later element-level writes must match the established kind; they never
//! change it. Only a full `set` or `hset` replaces the kind.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Short kind code for a stored entry.
///
/// These codes are the discriminator tags used in the snapshot file and
/// returned by the `KIND` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// Scalar string, e.g. `set name "alice"`
    #[serde(rename = "S")]
    Str,
    /// Scalar integer, e.g. `set hits 42`
    #[serde(rename = "D")]
    Int,
    /// Ordered list of strings
    #[serde(rename = "SS")]
    StrList,
    /// Ordered list of integer literals
    #[serde(rename = "SD")]
    IntList,
    /// Field map with string values
    #[serde(rename = "MS")]
    StrMap,
    /// Field map with integer values
    #[serde(rename = "MI")]
    IntMap,
}

impl Kind {
    /// The wire/snapshot code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Kind::Str => "S",
            Kind::Int => "D",
            Kind::StrList => "SS",
            Kind::IntList => "SD",
            Kind::StrMap => "MS",
            Kind::IntMap => "MI",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The payload of a stored entry.
///
/// Integer scalars and integer-list elements keep their validated textual
/// form (they round-trip through the wire protocol as text anyway); integer
/// map fields store real `i64` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(String),
    StrList(Vec<String>),
    IntList(Vec<String>),
    StrMap(BTreeMap<String, String>),
    IntMap(BTreeMap<String, i64>),
}

impl Value {
    /// The kind tag for this payload.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Str(_) => Kind::Str,
            Value::Int(_) => Kind::Int,
            Value::StrList(_) => Kind::StrList,
            Value::IntList(_) => Kind::IntList,
            Value::StrMap(_) => Kind::StrMap,
            Value::IntMap(_) => Kind::IntMap,
        }
    }

    /// Borrows the list items if this is a list payload.
    pub fn items(&self) -> Option<&Vec<String>> {
        match self {
            Value::StrList(items) | Value::IntList(items) => Some(items),
            _ => None,
        }
    }

    /// Mutably borrows the list items if this is a list payload.
    pub fn items_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Value::StrList(items) | Value::IntList(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for the two map payload shapes.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::StrMap(_) | Value::IntMap(_))
    }
}

/// A stored entry: payload plus expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The typed payload.
    pub value: Value,
    /// Absolute expiry as epoch milliseconds. `0` means the entry never
    /// expires. The timestamp is absolute so it survives a snapshot round
    /// trip unchanged.
    pub expires_at: u64,
}

impl Entry {
    /// Creates an entry that never expires.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: 0,
        }
    }

    /// Whether this entry is expired at the given instant.
    #[inline]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at != 0 && now_ms >= self.expires_at
    }
}

/// Whether `s` is a valid base-10 integer literal (the kind-inference test).
#[inline]
pub fn is_integer_literal(s: &str) -> bool {
    s.parse::<i64>().is_ok()
}

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
