//! Snapshot Persistence
//!
//! The store persists as a single human-readable JSON file: one record per
//! key carrying the kind code, the absolute expiry timestamp and the payload
//! field appropriate to the kind. The whole file is rewritten on each save.
//!
//! Writes always go through [`write_atomic`]: bytes land in a temporary
//! sibling file which is then renamed over the destination, so a reader (or
//! a crashed process restarting) only ever observes the previous snapshot or
//! the new one, never a truncated in-between.

pub mod atomic;
pub mod snapshot;

pub use atomic::write_atomic;
pub use snapshot::Record;
