//! The Typed Value Store
//!
//! A single map from key to [`Entry`], guarded by one reader/writer lock.
//! Reads take the lock shared, mutations take it exclusively, and every
//! operation on a single key is linearized by that lock.
//!
//! ## Locking Discipline
//!
//! The API is split into two strict layers:
//!
//! - the public methods on [`TypedStore`], which acquire the lock exactly
//!   once and never call each other while holding it, and
//! - free functions at the bottom of this module, which implement the actual
//!   semantics against `&mut HashMap` / `&mut Entry` and are forbidden from
//!   touching the lock.
//!
//! The lock is not reentrant, so any helper that locked again underneath a
//! locked public method would deadlock. Keeping the inner layer lock-free
//! makes that mistake impossible to write.
//!
//! ## Persistence
//!
//! Mutations do not write to disk. They raise a dirty flag which the
//! background sweeper checks on its tick; saving serializes a deep copy of
//! the map taken under a brief read lock, so disk I/O never stalls readers
//! or writers.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use regex::Regex;
use tracing::{debug, info};

use crate::persist::{snapshot, write_atomic};
use crate::storage::value::{is_integer_literal, now_millis, Entry, Kind, Value};

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such key")]
    KeyNotFound,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("operation against a key holding the wrong kind of value")]
    TypeMismatch,
    #[error("value does not match the required kind")]
    InvalidValue,
    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),
    #[error("snapshot I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Range selector for the pop operations.
///
/// `At(i)` pops the single element at index `i`; `Span(start, end)` pops the
/// inclusive range `[start, end]`. Indices may be negative and count from
/// the end of the list, Python style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopRange {
    At(i64),
    Span(i64, i64),
}

impl PopRange {
    /// Resolves the range against a list of `len` elements.
    ///
    /// Returns the half-open `(start, end)` pair to remove, or `None` when
    /// the range selects nothing. An end past the tail is clamped to the
    /// tail as long as the start itself resolves within the list.
    fn resolve(self, len: usize) -> Option<(usize, usize)> {
        let n = len as i64;
        let (start, end) = match self {
            PopRange::At(i) => (i, i),
            PopRange::Span(start, end) => (start, end),
        };
        let start = if start < 0 { start + n } else { start };
        let end = if end < 0 { end + n } else { end };
        if start < 0 || start > n {
            return None;
        }
        if end >= n {
            // Pop from start to the tail.
            return Some((start as usize, len));
        }
        if end < start {
            return None;
        }
        Some((start as usize, (end + 1) as usize))
    }
}

/// The typed key-value store.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
///
/// # Example
///
/// ```
/// use slatekv::storage::TypedStore;
///
/// let store = TypedStore::new();
/// store.set("name", "\"alice\"").unwrap();
/// store.set("hits", "42").unwrap();
///
/// assert_eq!(store.get("name").unwrap(), Some("alice".to_string()));
/// assert_eq!(store.get("hits").unwrap(), Some("42".to_string()));
/// ```
#[derive(Debug, Default)]
pub struct TypedStore {
    entries: RwLock<HashMap<String, Entry>>,
    /// Raised by every successful mutation, drained by the sweeper tick.
    dirty: AtomicBool,
}

impl TypedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = now_millis();
        let entries = self.entries.read().unwrap();
        entries.values().filter(|e| !e.is_expired_at(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Scalar operations ---

    /// Stores a scalar.
    ///
    /// A value wrapped in `"` quotes is stored as a string with the quotes
    /// stripped; a bare integer literal is stored as an integer. Anything
    /// else is rejected with [`StoreError::InvalidValue`]. This is a full
    /// overwrite: any previous entry under the key, whatever its kind or
    /// expiry, is replaced.
    pub fn set(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        let value = parse_scalar(raw)?;
        {
            let mut entries = self.entries.write().unwrap();
            entries.insert(key.to_string(), Entry::new(value));
        }
        self.mark_dirty();
        Ok(())
    }

    /// Reads a scalar in its stored textual form.
    ///
    /// `Ok(None)` means the key does not exist. A key holding a list or map
    /// fails with [`StoreError::TypeMismatch`].
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) | Value::Int(s) => Ok(Some(s.clone())),
                _ => Err(StoreError::TypeMismatch),
            },
        }
    }

    /// The kind of the entry under `key`, if any.
    pub fn kind(&self, key: &str) -> Option<Kind> {
        let entries = self.entries.read().unwrap();
        entries.get(key).map(|e| e.value.kind())
    }

    // --- Map operations ---

    /// Stores a field map, replacing any map previously held by the key.
    ///
    /// Fields whose value parses as an integer are collected into the
    /// integer shape, the rest into the string shape. The two shapes are
    /// mutually exclusive: if any string-valued field is present the entry
    /// becomes a string map and the integer fields from the same call are
    /// discarded. An existing expiry on the key survives.
    ///
    /// Returns the number of fields retained. Fails with
    /// [`StoreError::TypeMismatch`] if the key holds a scalar or list.
    pub fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<usize, StoreError> {
        let count = {
            let mut entries = self.entries.write().unwrap();
            map_replace(&mut entries, key, fields)?
        };
        self.mark_dirty();
        Ok(count)
    }

    /// Looks up a single map field, rendered as text.
    ///
    /// `Ok(None)` when the key or the field is absent;
    /// [`StoreError::TypeMismatch`] when the key holds a scalar or list.
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::StrMap(m) => Ok(m.get(field).cloned()),
                Value::IntMap(m) => Ok(m.get(field).map(|n| n.to_string())),
                _ => Err(StoreError::TypeMismatch),
            },
        }
    }

    // --- List operations ---

    /// Prepends `values` to the list at `key`, creating it if absent.
    ///
    /// The input is inserted in reversed order, so the last element of the
    /// input ends up closest to the head; repeated single-element pushes
    /// behave like a stack. Returns the resulting list length.
    pub fn lpush(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        if values.is_empty() {
            return Ok(self.list_len(key));
        }
        let len = {
            let mut entries = self.entries.write().unwrap();
            list_push(&mut entries, key, values, true)?
        };
        self.mark_dirty();
        Ok(len)
    }

    /// Appends `values` to the list at `key`, creating it if absent.
    ///
    /// Returns the resulting list length.
    pub fn rpush(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        if values.is_empty() {
            return Ok(self.list_len(key));
        }
        let len = {
            let mut entries = self.entries.write().unwrap();
            list_push(&mut entries, key, values, false)?
        };
        self.mark_dirty();
        Ok(len)
    }

    /// Appends only the values not already present in the list.
    ///
    /// Membership is checked against the list as it was before this call,
    /// so duplicates already in the list stay and the surviving subset keeps
    /// its input order. Creates the list if absent. Returns the resulting
    /// list length.
    pub fn radd_to_set(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        if values.is_empty() {
            return Ok(self.list_len(key));
        }
        let len = {
            let mut entries = self.entries.write().unwrap();
            list_add_to_set(&mut entries, key, values)?
        };
        self.mark_dirty();
        Ok(len)
    }

    /// Removes and returns the selected range from the head side.
    ///
    /// A missing key or a range that selects nothing yields an empty vector
    /// and leaves the list untouched. Fails with
    /// [`StoreError::TypeMismatch`] on a non-list key.
    pub fn lpop(&self, key: &str, range: PopRange) -> Result<Vec<String>, StoreError> {
        let removed = {
            let mut entries = self.entries.write().unwrap();
            list_pop(&mut entries, key, range, false)?
        };
        if !removed.is_empty() {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Removes and returns the selected range, mirrored from the tail.
    ///
    /// The range is resolved against the reversed list, the removed elements
    /// are returned in that reversed order, and the remainder keeps its
    /// original order.
    pub fn rpop(&self, key: &str, range: PopRange) -> Result<Vec<String>, StoreError> {
        let removed = {
            let mut entries = self.entries.write().unwrap();
            list_pop(&mut entries, key, range, true)?
        };
        if !removed.is_empty() {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Replaces the element at a non-negative `index`.
    ///
    /// Fails with [`StoreError::KeyNotFound`] if the key is absent and
    /// [`StoreError::IndexOutOfRange`] if the index (negative included) is
    /// outside the list.
    pub fn lset(&self, key: &str, index: i64, value: &str) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write().unwrap();
            list_set(&mut entries, key, index, value)?;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Reads the element at a non-negative `index`. Same bounds contract as
    /// [`TypedStore::lset`].
    pub fn lget(&self, key: &str, index: i64) -> Result<String, StoreError> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key).ok_or(StoreError::KeyNotFound)?;
        let items = entry.value.items().ok_or(StoreError::TypeMismatch)?;
        if index < 0 || index as usize >= items.len() {
            return Err(StoreError::IndexOutOfRange);
        }
        Ok(items[index as usize].clone())
    }

    // --- Key enumeration ---

    /// All live keys whose name matches the regular expression.
    ///
    /// Expired-but-unswept keys are skipped. The order is unspecified.
    pub fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let re = Regex::new(pattern).map_err(|e| StoreError::InvalidPattern(e.to_string()))?;
        let now = now_millis();
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .filter(|(key, _)| re.is_match(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    // --- Expiration ---

    /// Sets the key to expire `ttl_secs` seconds from now.
    ///
    /// The timestamp is stored as absolute epoch milliseconds. Returns
    /// whether the key existed and the expiry was applied.
    pub fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        let applied = {
            let mut entries = self.entries.write().unwrap();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.expires_at =
                        now_millis().saturating_add(ttl_secs.saturating_mul(1_000));
                    true
                }
                None => false,
            }
        };
        if applied {
            self.mark_dirty();
        }
        applied
    }

    /// Lazy expiry check, called by consumers before any keyed read/write.
    ///
    /// If the key exists and its expiry has passed, the key is deleted and
    /// `true` is returned. The fast path takes only the read lock; deletion
    /// re-checks under the write lock in case the key was refreshed in
    /// between.
    pub fn check_if_expired(&self, key: &str) -> bool {
        let now = now_millis();
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.is_expired_at(now) => {}
                _ => return false,
            }
        }

        let mut entries = self.entries.write().unwrap();
        let still_expired = entries
            .get(key)
            .is_some_and(|e| e.is_expired_at(now_millis()));
        if still_expired {
            entries.remove(key);
            drop(entries);
            self.mark_dirty();
            debug!(key, "expired key removed on access");
            return true;
        }
        false
    }

    /// Active expiry: deletes every entry whose expiry has passed.
    ///
    /// Candidates are collected under the read lock, then deleted under the
    /// write lock with a re-check, so the full scan and the deletion never
    /// hold the exclusive lock together. A key that expires between the two
    /// phases is caught by the next sweep or lazily on access. Returns the
    /// number of keys removed.
    pub fn sweep(&self) -> usize {
        let now = now_millis();
        let candidates: Vec<String> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect()
        };
        if candidates.is_empty() {
            return 0;
        }

        let mut removed = 0;
        {
            let mut entries = self.entries.write().unwrap();
            for key in &candidates {
                // Re-check: the entry may have been refreshed since the scan.
                if entries
                    .get(key)
                    .is_some_and(|e| e.is_expired_at(now_millis()))
                {
                    entries.remove(key);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.mark_dirty();
            debug!(removed, "sweep removed expired keys");
        }
        removed
    }

    // --- Persistence ---

    /// Serializes the whole store and writes it atomically to `path`.
    ///
    /// The map is deep-copied under a brief read lock; serialization and
    /// file I/O happen with no lock held.
    pub fn save_to_file(&self, path: &Path) -> Result<(), StoreError> {
        let records: BTreeMap<String, snapshot::Record> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), snapshot::Record::from_entry(entry)))
                .collect()
        };
        let bytes = snapshot::encode(&records)?;
        write_atomic(path, &bytes)?;
        debug!(path = %path.display(), keys = records.len(), "snapshot written");
        Ok(())
    }

    /// Loads a snapshot, replacing the in-memory map wholesale.
    pub fn load_from_file(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = std::fs::read(path)?;
        let records = snapshot::decode(&bytes)?;
        let map: HashMap<String, Entry> = records
            .into_iter()
            .map(|(key, record)| (key, record.into_entry()))
            .collect();
        let keys = map.len();
        {
            let mut entries = self.entries.write().unwrap();
            *entries = map;
        }
        // In-memory state now matches the file.
        self.dirty.store(false, Ordering::Release);
        info!(path = %path.display(), keys, "snapshot loaded");
        Ok(())
    }

    /// Marks the store as having unsaved changes.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clears and returns the dirty flag. The sweeper calls this on each
    /// tick to decide whether a snapshot is due.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Current list length, `0` for a missing or non-list key.
    fn list_len(&self, key: &str) -> usize {
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .and_then(|e| e.value.items())
            .map_or(0, Vec::len)
    }

    /// Plants an already-expired scalar, bypassing the normal write path.
    #[cfg(test)]
    pub(crate) fn plant_expired(&self, key: &str, raw: &str) {
        let mut entry = Entry::new(parse_scalar(raw).unwrap());
        entry.expires_at = 1;
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), entry);
    }
}

// ---------------------------------------------------------------------------
// Inner layer: pure logic over the unlocked map. Nothing below this line may
// touch the lock.
// ---------------------------------------------------------------------------

/// Parses a raw scalar: quoted string or integer literal.
fn parse_scalar(raw: &str) -> Result<Value, StoreError> {
    if let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Value::Str(inner.to_string()));
    }
    if is_integer_literal(raw) {
        return Ok(Value::Int(raw.to_string()));
    }
    Err(StoreError::InvalidValue)
}

/// Rejects any value that is not an integer literal.
fn ensure_integers(values: &[String]) -> Result<(), StoreError> {
    if values.iter().all(|v| is_integer_literal(v)) {
        Ok(())
    } else {
        Err(StoreError::InvalidValue)
    }
}

/// Builds a fresh list payload, inferring the kind from the first element of
/// the original input.
fn new_list_value(items: Vec<String>, first: &str) -> Result<Value, StoreError> {
    if is_integer_literal(first) {
        ensure_integers(&items)?;
        Ok(Value::IntList(items))
    } else {
        Ok(Value::StrList(items))
    }
}

/// Borrows the list items of an entry, validating `incoming` against an
/// integer list's element contract.
fn list_slot<'a>(
    entry: &'a mut Entry,
    incoming: &[String],
) -> Result<&'a mut Vec<String>, StoreError> {
    match &mut entry.value {
        Value::StrList(items) => Ok(items),
        Value::IntList(items) => {
            ensure_integers(incoming)?;
            Ok(items)
        }
        _ => Err(StoreError::TypeMismatch),
    }
}

fn list_push(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    values: &[String],
    front: bool,
) -> Result<usize, StoreError> {
    match entries.get_mut(key) {
        Some(entry) => {
            let items = list_slot(entry, values)?;
            if front {
                let mut incoming = values.to_vec();
                incoming.reverse();
                items.splice(0..0, incoming);
            } else {
                items.extend(values.iter().cloned());
            }
            Ok(items.len())
        }
        None => {
            let mut items = values.to_vec();
            if front {
                items.reverse();
            }
            let len = items.len();
            let value = new_list_value(items, &values[0])?;
            entries.insert(key.to_string(), Entry::new(value));
            Ok(len)
        }
    }
}

fn list_add_to_set(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    values: &[String],
) -> Result<usize, StoreError> {
    match entries.get_mut(key) {
        Some(entry) => {
            let kind = entry.value.kind();
            let items = entry.value.items_mut().ok_or(StoreError::TypeMismatch)?;
            // Membership is judged against the pre-call list only.
            let fresh: Vec<String> = values
                .iter()
                .filter(|v| !items.contains(*v))
                .cloned()
                .collect();
            if kind == Kind::IntList {
                ensure_integers(&fresh)?;
            }
            items.extend(fresh);
            Ok(items.len())
        }
        None => {
            let items = values.to_vec();
            let len = items.len();
            let value = new_list_value(items, &values[0])?;
            entries.insert(key.to_string(), Entry::new(value));
            Ok(len)
        }
    }
}

fn list_pop(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    range: PopRange,
    from_tail: bool,
) -> Result<Vec<String>, StoreError> {
    let entry = match entries.get_mut(key) {
        Some(entry) => entry,
        None => return Ok(vec![]),
    };
    let items = entry.value.items_mut().ok_or(StoreError::TypeMismatch)?;

    if from_tail {
        items.reverse();
    }
    let removed = match range.resolve(items.len()) {
        Some((start, end)) => items.drain(start..end).collect(),
        None => vec![],
    };
    if from_tail {
        items.reverse();
    }
    Ok(removed)
}

fn list_set(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    index: i64,
    value: &str,
) -> Result<(), StoreError> {
    let entry = entries.get_mut(key).ok_or(StoreError::KeyNotFound)?;
    let kind = entry.value.kind();
    let items = entry.value.items_mut().ok_or(StoreError::TypeMismatch)?;
    if index < 0 || index as usize >= items.len() {
        return Err(StoreError::IndexOutOfRange);
    }
    if kind == Kind::IntList && !is_integer_literal(value) {
        return Err(StoreError::InvalidValue);
    }
    items[index as usize] = value.to_string();
    Ok(())
}

fn map_replace(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    fields: &[(String, String)],
) -> Result<usize, StoreError> {
    if let Some(entry) = entries.get(key) {
        if !entry.value.is_map() {
            return Err(StoreError::TypeMismatch);
        }
    }

    let mut strings = BTreeMap::new();
    let mut integers = BTreeMap::new();
    for (field, value) in fields {
        match value.parse::<i64>() {
            Ok(n) => {
                integers.insert(field.clone(), n);
            }
            Err(_) => {
                strings.insert(field.clone(), value.clone());
            }
        }
    }

    // Any string-valued field makes the whole entry a string map; integer
    // fields collected in the same call are dropped.
    let (value, count) = if !strings.is_empty() {
        let count = strings.len();
        (Value::StrMap(strings), count)
    } else {
        let count = integers.len();
        (Value::IntMap(integers), count)
    };

    match entries.get_mut(key) {
        Some(entry) => entry.value = value,
        None => {
            entries.insert(key.to_string(), Entry::new(value));
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    // --- Scalars ---

    #[test]
    fn set_get_integer() {
        let store = TypedStore::new();
        store.set("k", "5").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("5".to_string()));
        assert_eq!(store.kind("k"), Some(Kind::Int));
    }

    #[test]
    fn set_get_quoted_string() {
        let store = TypedStore::new();
        store.set("k", "\"5\"").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("5".to_string()));
        assert_eq!(store.kind("k"), Some(Kind::Str));
    }

    #[test]
    fn set_rejects_bare_text() {
        let store = TypedStore::new();
        assert!(matches!(
            store.set("k", "hello"),
            Err(StoreError::InvalidValue)
        ));
        assert!(matches!(
            store.set("k", "\""),
            Err(StoreError::InvalidValue)
        ));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn set_overwrites_kind_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = TypedStore::new();
        store.set("k", "\"old\"").unwrap();
        assert!(store.expire("k", 3_600));
        store.set("k", "7").unwrap();
        assert_eq!(store.kind("k"), Some(Kind::Int));
        assert_eq!(store.get("k").unwrap(), Some("7".to_string()));

        // A full overwrite starts a fresh entry with no expiry.
        store.save_to_file(&path).unwrap();
        let records = snapshot::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(records.get("k").unwrap().expires_at, 0);
    }

    #[test]
    fn get_missing_key() {
        let store = TypedStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.kind("missing"), None);
    }

    #[test]
    fn get_on_list_is_type_mismatch() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a"])).unwrap();
        assert!(matches!(store.get("l"), Err(StoreError::TypeMismatch)));
    }

    // --- Maps ---

    #[test]
    fn hset_integer_map() {
        let store = TypedStore::new();
        let n = store
            .hset(
                "m",
                &[("a".into(), "1".into()), ("b".into(), "2".into())],
            )
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.kind("m"), Some(Kind::IntMap));
        assert_eq!(store.hget("m", "a").unwrap(), Some("1".to_string()));
        assert_eq!(store.hget("m", "b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn hset_string_field_wins_and_drops_integers() {
        let store = TypedStore::new();
        let n = store
            .hset(
                "m",
                &[("a".into(), "1".into()), ("b".into(), "x".into())],
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.kind("m"), Some(Kind::StrMap));
        assert_eq!(store.hget("m", "b").unwrap(), Some("x".to_string()));
        // The integer field from the same call is gone.
        assert_eq!(store.hget("m", "a").unwrap(), None);
    }

    #[test]
    fn hset_on_scalar_or_list_fails() {
        let store = TypedStore::new();
        store.set("s", "1").unwrap();
        store.rpush("l", &strings(&["a"])).unwrap();
        let fields = [("f".to_string(), "1".to_string())];
        assert!(matches!(
            store.hset("s", &fields),
            Err(StoreError::TypeMismatch)
        ));
        assert!(matches!(
            store.hset("l", &fields),
            Err(StoreError::TypeMismatch)
        ));
    }

    #[test]
    fn hset_preserves_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = TypedStore::new();
        store
            .hset("m", &[("a".to_string(), "1".to_string())])
            .unwrap();
        assert!(store.expire("m", 3_600));
        store
            .hset("m", &[("b".to_string(), "2".to_string())])
            .unwrap();

        store.save_to_file(&path).unwrap();
        let records = snapshot::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_ne!(records.get("m").unwrap().expires_at, 0);
    }

    #[test]
    fn hget_missing_key_or_field() {
        let store = TypedStore::new();
        assert_eq!(store.hget("m", "f").unwrap(), None);
        store
            .hset("m", &[("a".to_string(), "1".to_string())])
            .unwrap();
        assert_eq!(store.hget("m", "zzz").unwrap(), None);
    }

    #[test]
    fn hget_on_scalar_fails() {
        let store = TypedStore::new();
        store.set("s", "1").unwrap();
        assert!(matches!(
            store.hget("s", "f"),
            Err(StoreError::TypeMismatch)
        ));
    }

    // --- List pushes ---

    #[test]
    fn lpush_reverses_input() {
        let store = TypedStore::new();
        store.lpush("l", &strings(&["a", "b"])).unwrap();
        assert_eq!(store.lget("l", 0).unwrap(), "b");
        assert_eq!(store.lget("l", 1).unwrap(), "a");
    }

    #[test]
    fn lpush_acts_like_stack_push() {
        let store = TypedStore::new();
        store.lpush("l", &strings(&["a"])).unwrap();
        store.lpush("l", &strings(&["b"])).unwrap();
        store.lpush("l", &strings(&["c"])).unwrap();
        assert_eq!(store.lget("l", 0).unwrap(), "c");
        assert_eq!(store.lget("l", 2).unwrap(), "a");
    }

    #[test]
    fn lpush_prepends_to_existing() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["x"])).unwrap();
        let len = store.lpush("l", &strings(&["a", "b"])).unwrap();
        assert_eq!(len, 3);
        // [b, a, x]
        assert_eq!(store.lget("l", 0).unwrap(), "b");
        assert_eq!(store.lget("l", 1).unwrap(), "a");
        assert_eq!(store.lget("l", 2).unwrap(), "x");
    }

    #[test]
    fn rpush_appends_in_order() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b"])).unwrap();
        store.rpush("l", &strings(&["c"])).unwrap();
        assert_eq!(store.lget("l", 0).unwrap(), "a");
        assert_eq!(store.lget("l", 1).unwrap(), "b");
        assert_eq!(store.lget("l", 2).unwrap(), "c");
    }

    #[test]
    fn list_kind_inferred_from_first_element() {
        let store = TypedStore::new();
        store.rpush("ints", &strings(&["1", "2"])).unwrap();
        store.rpush("strs", &strings(&["a", "2"])).unwrap();
        assert_eq!(store.kind("ints"), Some(Kind::IntList));
        assert_eq!(store.kind("strs"), Some(Kind::StrList));
    }

    #[test]
    fn integer_list_rejects_mixed_creation() {
        let store = TypedStore::new();
        assert!(matches!(
            store.rpush("l", &strings(&["1", "a"])),
            Err(StoreError::InvalidValue)
        ));
        assert_eq!(store.kind("l"), None);
    }

    #[test]
    fn integer_list_rejects_string_push() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["1"])).unwrap();
        assert!(matches!(
            store.rpush("l", &strings(&["abc"])),
            Err(StoreError::InvalidValue)
        ));
        assert!(matches!(
            store.lpush("l", &strings(&["abc"])),
            Err(StoreError::InvalidValue)
        ));
        // Untouched on rejection.
        assert_eq!(store.lget("l", 0).unwrap(), "1");
        assert!(matches!(
            store.lget("l", 1),
            Err(StoreError::IndexOutOfRange)
        ));
    }

    #[test]
    fn push_on_scalar_is_type_mismatch() {
        let store = TypedStore::new();
        store.set("s", "1").unwrap();
        assert!(matches!(
            store.rpush("s", &strings(&["a"])),
            Err(StoreError::TypeMismatch)
        ));
    }

    #[test]
    fn radd_to_set_filters_against_existing() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b"])).unwrap();
        let len = store.radd_to_set("l", &strings(&["b", "c", "a", "d"])).unwrap();
        assert_eq!(len, 4);
        assert_eq!(store.lget("l", 2).unwrap(), "c");
        assert_eq!(store.lget("l", 3).unwrap(), "d");
    }

    #[test]
    fn radd_to_set_is_idempotent() {
        let store = TypedStore::new();
        store.radd_to_set("l", &strings(&["a", "b"])).unwrap();
        let first = store.lpop("l", PopRange::Span(0, -1)).unwrap();
        store.radd_to_set("l", &strings(&["a", "b"])).unwrap();
        store.radd_to_set("l", &strings(&["a", "b"])).unwrap();
        let second = store.lpop("l", PopRange::Span(0, -1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn radd_to_set_keeps_existing_duplicates() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "a"])).unwrap();
        let len = store.radd_to_set("l", &strings(&["a", "b"])).unwrap();
        // The pre-existing duplicate stays, only "b" is new.
        assert_eq!(len, 3);
        assert_eq!(store.lget("l", 2).unwrap(), "b");
    }

    // --- Pops ---

    #[test]
    fn lpop_single_negative_index_pops_tail() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["x", "y", "z"])).unwrap();
        let popped = store.lpop("l", PopRange::At(-1)).unwrap();
        assert_eq!(popped, strings(&["z"]));
        assert_eq!(store.lget("l", 0).unwrap(), "x");
        assert_eq!(store.lget("l", 1).unwrap(), "y");
    }

    #[test]
    fn lpop_inclusive_span() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["x", "y", "z"])).unwrap();
        let popped = store.lpop("l", PopRange::Span(0, 1)).unwrap();
        assert_eq!(popped, strings(&["x", "y"]));
        assert_eq!(store.lget("l", 0).unwrap(), "z");
    }

    #[test]
    fn lpop_end_past_tail_clamps() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c"])).unwrap();
        let popped = store.lpop("l", PopRange::Span(1, 99)).unwrap();
        assert_eq!(popped, strings(&["b", "c"]));
        assert_eq!(store.lget("l", 0).unwrap(), "a");
    }

    #[test]
    fn lpop_start_beyond_length_is_a_noop() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c"])).unwrap();
        assert!(store.lpop("l", PopRange::Span(-5, 1)).unwrap().is_empty());
        assert!(store.lpop("l", PopRange::Span(4, 99)).unwrap().is_empty());
        assert_eq!(store.lget("l", 0).unwrap(), "a");
        assert_eq!(store.lget("l", 2).unwrap(), "c");
    }

    #[test]
    fn lpop_inverted_span_is_empty() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c"])).unwrap();
        assert!(store.lpop("l", PopRange::Span(2, 0)).unwrap().is_empty());
    }

    #[test]
    fn lpop_missing_key_is_empty() {
        let store = TypedStore::new();
        assert!(store.lpop("nope", PopRange::At(0)).unwrap().is_empty());
    }

    #[test]
    fn lpop_to_empty_keeps_the_key() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a"])).unwrap();
        store.lpop("l", PopRange::At(0)).unwrap();
        assert_eq!(store.kind("l"), Some(Kind::StrList));
        assert!(store.lpop("l", PopRange::At(0)).unwrap().is_empty());
    }

    #[test]
    fn rpop_mirrors_from_tail() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c", "d"])).unwrap();
        // Reversed view is [d, c, b, a]; span [0,1] takes d and c.
        let popped = store.rpop("l", PopRange::Span(0, 1)).unwrap();
        assert_eq!(popped, strings(&["d", "c"]));
        assert_eq!(store.lget("l", 0).unwrap(), "a");
        assert_eq!(store.lget("l", 1).unwrap(), "b");
    }

    #[test]
    fn rpop_single_index_pops_head_side_for_negative() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c"])).unwrap();
        // Reversed view is [c, b, a]; index -1 selects a, the original head.
        let popped = store.rpop("l", PopRange::At(-1)).unwrap();
        assert_eq!(popped, strings(&["a"]));
        assert_eq!(store.lget("l", 0).unwrap(), "b");
        assert_eq!(store.lget("l", 1).unwrap(), "c");
    }

    #[test]
    fn rpop_preserves_remainder_order() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c", "d", "e"])).unwrap();
        let popped = store.rpop("l", PopRange::Span(1, 2)).unwrap();
        // Reversed [e, d, c, b, a]: removes d and c.
        assert_eq!(popped, strings(&["d", "c"]));
        assert_eq!(store.lget("l", 0).unwrap(), "a");
        assert_eq!(store.lget("l", 1).unwrap(), "b");
        assert_eq!(store.lget("l", 2).unwrap(), "e");
    }

    #[test]
    fn pop_on_scalar_is_type_mismatch() {
        let store = TypedStore::new();
        store.set("s", "1").unwrap();
        assert!(matches!(
            store.lpop("s", PopRange::At(0)),
            Err(StoreError::TypeMismatch)
        ));
        assert!(matches!(
            store.rpop("s", PopRange::At(0)),
            Err(StoreError::TypeMismatch)
        ));
    }

    // --- LSet / LGet ---

    #[test]
    fn lset_replaces_element() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b", "c"])).unwrap();
        store.lset("l", 1, "B").unwrap();
        assert_eq!(store.lget("l", 1).unwrap(), "B");
    }

    #[test]
    fn lset_missing_key() {
        let store = TypedStore::new();
        assert!(matches!(
            store.lset("nope", 0, "x"),
            Err(StoreError::KeyNotFound)
        ));
        assert!(matches!(
            store.lget("nope", 0),
            Err(StoreError::KeyNotFound)
        ));
    }

    #[test]
    fn lset_lget_bounds() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a", "b"])).unwrap();
        assert!(matches!(
            store.lset("l", 2, "x"),
            Err(StoreError::IndexOutOfRange)
        ));
        assert!(matches!(
            store.lget("l", 2),
            Err(StoreError::IndexOutOfRange)
        ));
        // Negative indices are not accepted here, only in pops.
        assert!(matches!(
            store.lset("l", -1, "x"),
            Err(StoreError::IndexOutOfRange)
        ));
        assert!(matches!(
            store.lget("l", -1),
            Err(StoreError::IndexOutOfRange)
        ));
    }

    #[test]
    fn lset_respects_integer_kind() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["1", "2"])).unwrap();
        assert!(matches!(
            store.lset("l", 0, "abc"),
            Err(StoreError::InvalidValue)
        ));
        store.lset("l", 0, "9").unwrap();
        assert_eq!(store.lget("l", 0).unwrap(), "9");
    }

    // --- Key enumeration ---

    #[test]
    fn keys_matching_pattern() {
        let store = TypedStore::new();
        store.set("user:1", "1").unwrap();
        store.set("user:2", "2").unwrap();
        store.set("other", "3").unwrap();
        let mut keys = store.keys_matching("^user:").unwrap();
        keys.sort();
        assert_eq!(keys, strings(&["user:1", "user:2"]));
    }

    #[test]
    fn keys_matching_bad_pattern() {
        let store = TypedStore::new();
        assert!(matches!(
            store.keys_matching("(unclosed"),
            Err(StoreError::InvalidPattern(_))
        ));
    }

    #[test]
    fn keys_matching_skips_expired() {
        let store = TypedStore::new();
        store.set("live", "1").unwrap();
        store.plant_expired("dead", "2");
        let keys = store.keys_matching(".*").unwrap();
        assert_eq!(keys, strings(&["live"]));
    }

    // --- Expiration ---

    #[test]
    fn expire_missing_key() {
        let store = TypedStore::new();
        assert!(!store.expire("nope", 10));
    }

    #[test]
    fn expire_uses_seconds() {
        let store = TypedStore::new();
        store.set("k", "1").unwrap();
        // A one-second TTL must still be alive well past one millisecond.
        assert!(store.expire("k", 1));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!store.check_if_expired("k"));
        assert_eq!(store.get("k").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn zero_ttl_expires_once_the_clock_moves() {
        let store = TypedStore::new();
        store.set("k", "1").unwrap();
        assert!(store.expire("k", 0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.check_if_expired("k"));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn expired_key_removed_on_check() {
        let store = TypedStore::new();
        store.plant_expired("k", "1");
        assert!(store.check_if_expired("k"));
        assert_eq!(store.get("k").unwrap(), None);
        // Second check: the key is gone, nothing to expire.
        assert!(!store.check_if_expired("k"));
    }

    #[test]
    fn expiry_survives_list_mutation() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a"])).unwrap();
        assert!(store.expire("l", 3_600));
        store.rpush("l", &strings(&["b"])).unwrap();
        store.lset("l", 0, "z").unwrap();
        store.lpop("l", PopRange::At(0)).unwrap();
        // Pushes and pops leave the schedule in place; only a fresh set
        // would clear it, and the key is still alive.
        assert!(!store.check_if_expired("l"));
        assert_eq!(store.lget("l", 0).unwrap(), "b");
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = TypedStore::new();
        store.set("keep", "1").unwrap();
        store.plant_expired("a", "1");
        store.plant_expired("b", "2");
        assert_eq!(store.sweep(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("keep").unwrap(), Some("1".to_string()));
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn len_ignores_expired() {
        let store = TypedStore::new();
        store.set("live", "1").unwrap();
        store.plant_expired("dead", "1");
        assert_eq!(store.len(), 1);
    }

    // --- Dirty flag ---

    #[test]
    fn mutations_raise_dirty_flag() {
        let store = TypedStore::new();
        assert!(!store.take_dirty());
        store.set("k", "1").unwrap();
        assert!(store.take_dirty());
        assert!(!store.take_dirty());
        store.rpush("l", &strings(&["a"])).unwrap();
        assert!(store.take_dirty());
    }

    #[test]
    fn empty_pop_does_not_dirty() {
        let store = TypedStore::new();
        store.rpush("l", &strings(&["a"])).unwrap();
        store.take_dirty();
        store.lpop("l", PopRange::Span(5, 9)).unwrap();
        assert!(!store.take_dirty());
    }

    // --- Persistence round trip ---

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let store = TypedStore::new();
        store.set("name", "\"alice\"").unwrap();
        store.set("hits", "42").unwrap();
        store.rpush("tags", &strings(&["x", "y"])).unwrap();
        store.rpush("nums", &strings(&["1", "2", "3"])).unwrap();
        store
            .hset("prices", &[("a".to_string(), "5".to_string())])
            .unwrap();
        store
            .hset("labels", &[("a".to_string(), "red".to_string())])
            .unwrap();
        assert!(store.expire("hits", 3_600));

        store.save_to_file(&path).unwrap();

        let restored = TypedStore::new();
        restored.load_from_file(&path).unwrap();

        assert_eq!(restored.len(), store.len());
        for key in ["name", "hits", "tags", "nums", "prices", "labels"] {
            assert_eq!(restored.kind(key), store.kind(key), "kind of {key}");
        }
        assert_eq!(restored.get("name").unwrap(), Some("alice".to_string()));
        assert_eq!(restored.get("hits").unwrap(), Some("42".to_string()));
        assert_eq!(restored.lget("tags", 1).unwrap(), "y");
        assert_eq!(restored.lget("nums", 2).unwrap(), "3");
        assert_eq!(restored.hget("prices", "a").unwrap(), Some("5".to_string()));
        assert_eq!(
            restored.hget("labels", "a").unwrap(),
            Some("red".to_string())
        );
        // Expiry survived as an absolute timestamp.
        assert!(!restored.check_if_expired("hits"));
    }

    #[test]
    fn load_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let store = TypedStore::new();
        store.set("a", "1").unwrap();
        store.save_to_file(&path).unwrap();

        let other = TypedStore::new();
        other.set("b", "2").unwrap();
        other.load_from_file(&path).unwrap();
        assert_eq!(other.get("a").unwrap(), Some("1".to_string()));
        // Not merged: the pre-load key is gone.
        assert_eq!(other.get("b").unwrap(), None);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let store = TypedStore::new();
        let err = store
            .load_from_file(Path::new("/nonexistent/slatekv.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn load_clears_dirty_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = TypedStore::new();
        store.set("a", "1").unwrap();
        store.save_to_file(&path).unwrap();
        assert!(store.take_dirty());
        store.set("b", "2").unwrap();
        store.load_from_file(&path).unwrap();
        assert!(!store.take_dirty());
    }

    // --- Pop range resolution table ---

    #[test]
    fn pop_range_resolution() {
        assert_eq!(PopRange::At(-1).resolve(3), Some((2, 3)));
        assert_eq!(PopRange::At(0).resolve(3), Some((0, 1)));
        // Start equal to the length resolves, but selects nothing.
        assert_eq!(PopRange::At(3).resolve(3), Some((3, 3)));
        assert_eq!(PopRange::Span(0, 1).resolve(3), Some((0, 2)));
        assert_eq!(PopRange::Span(0, -1).resolve(3), Some((0, 3)));
        assert_eq!(PopRange::Span(1, 99).resolve(3), Some((1, 3)));
        assert_eq!(PopRange::Span(-5, 1).resolve(3), None);
        assert_eq!(PopRange::Span(2, 0).resolve(3), None);
        assert_eq!(PopRange::Span(0, -5).resolve(3), None);
        assert_eq!(PopRange::At(0).resolve(0), Some((0, 0)));
    }
}
