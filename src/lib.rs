//! # slatekv: a typed in-memory key-value store
//!
//! slatekv keeps scalars, lists and field maps in one process-wide map,
//! infers each key's kind from the first value written to it, expires keys
//! on absolute timestamps, and persists the whole map to a human-readable
//! JSON snapshot through an atomic temp-file-then-rename write.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            slatekv                               │
//! │                                                                  │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────────┐           │
//! │  │ TCP server │──>│ Connection  │──>│ CommandHandler │           │
//! │  │ (main.rs)  │   │ (frames)    │   │ (dispatch)     │           │
//! │  └────────────┘   └─────────────┘   └───────┬────────┘           │
//! │                                             ▼                    │
//! │  ┌───────────┐   sweep +   ┌────────────────────────────────┐    │
//! │  │  Sweeper  │────────────>│           TypedStore           │    │
//! │  │ (bg task) │ save-if-dirty │ RwLock<HashMap<String, Entry>> │  │
//! │  └───────────┘             └───────┬────────────────────────┘    │
//! │                                    ▼                             │
//! │                      ┌──────────────────────────┐                │
//! │                      │ snapshot.json (atomic)   │                │
//! │                      └──────────────────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Typed entries
//!
//! A key's kind is fixed when it is created and element-level writes must
//! respect it:
//!
//! - `SET counter 5` makes an integer, `SET name "x"` a string
//! - the first pushed list element decides between string and integer lists
//! - `HSET` builds an integer map unless any field value is non-numeric, in
//!   which case the entry is a string map and only the string fields stay
//!
//! ## Expiry and persistence
//!
//! `EXPIRE key secs` stamps an absolute epoch-millisecond deadline. Expired
//! keys vanish lazily on access and eagerly on the sweeper's fixed cadence.
//! Mutations raise a dirty flag; the sweeper persists the store only when
//! the flag is set, and the write path is always write-temp-then-rename so
//! a crash can never leave a torn snapshot.
//!
//! ## Quick start
//!
//! ```
//! use slatekv::storage::{PopRange, TypedStore};
//!
//! let store = TypedStore::new();
//! store.set("visits", "41").unwrap();
//! store.rpush("queue", &["a".into(), "b".into(), "c".into()]).unwrap();
//!
//! let tail = store.lpop("queue", PopRange::At(-1)).unwrap();
//! assert_eq!(tail, vec!["c".to_string()]);
//! ```

pub mod commands;
pub mod connection;
pub mod persist;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{serve_connection, Connection};
pub use protocol::Frame;
pub use storage::{PopRange, StoreError, Sweeper, TypedStore};

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port.
pub const DEFAULT_PORT: u16 = 7379;

/// Default snapshot file, relative to the working directory.
pub const DEFAULT_SNAPSHOT_FILE: &str = "slatekv.json";

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
