//! Typed Storage
//!
//! The core of slatekv: a single map from key to typed entry, guarded by one
//! reader/writer lock, with lazy plus active expiry and dirty-flag-gated
//! snapshots.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       TypedStore                          │
//! │                                                           │
//! │   RwLock<HashMap<String, Entry>>        dirty: AtomicBool │
//! │                                                           │
//! │   Entry = { Value, expires_at (epoch ms, 0 = never) }     │
//! │   Value = Str | Int | StrList | IntList | StrMap | IntMap │
//! └───────────────────────────────────────────────────────────┘
//!                 ▲                        ▲
//!                 │ operations             │ sweep + save-if-dirty
//!       ┌─────────┴────────┐     ┌─────────┴─────────┐
//!       │  command layer   │     │      Sweeper      │
//!       │ (per connection) │     │ (background task) │
//!       └──────────────────┘     └───────────────────┘
//! ```
//!
//! ## Expiry
//!
//! Keys with an expiry timestamp are removed two ways:
//!
//! 1. **Lazy**: consumers call [`TypedStore::check_if_expired`] before any
//!    keyed read or write, so an expired key behaves as absent.
//! 2. **Active**: the [`Sweeper`] scans on a fixed cadence and deletes
//!    everything past its timestamp, then snapshots if anything changed.
//!
//! ## Example
//!
//! ```
//! use slatekv::storage::{PopRange, TypedStore};
//!
//! let store = TypedStore::new();
//! store.set("visits", "3").unwrap();
//! store.lpush("queue", &["a".into(), "b".into()]).unwrap();
//!
//! // The last pushed input element sits at the head.
//! assert_eq!(store.lget("queue", 0).unwrap(), "b");
//! let popped = store.lpop("queue", PopRange::At(-1)).unwrap();
//! assert_eq!(popped, vec!["a".to_string()]);
//! ```

pub mod store;
pub mod sweeper;
pub mod value;

pub use store::{PopRange, StoreError, TypedStore};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
pub use value::{Entry, Kind, Value};
