//! Command Layer
//!
//! Translates parsed wire frames into typed-store calls and store results
//! back into reply frames. This is the consumer side of the store's expiry
//! contract: every keyed command runs the lazy expiry check first, so an
//! expired key looks absent no matter which path reaches it.
//!
//! ```text
//! Frame ──> CommandHandler ──> TypedStore ──> Frame
//!            (dispatch,         (locked
//!             arity checks)      operations)
//! ```

pub mod handler;

pub use handler::CommandHandler;
