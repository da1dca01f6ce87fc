//! Client Connections
//!
//! One async task per client. Each task owns a [`Connection`] that buffers
//! incoming bytes, cuts complete frames out of the stream (several per read
//! when clients pipeline), runs them through the command handler and writes
//! the replies back.

pub mod handler;

pub use handler::{serve_connection, Connection, ConnectionError};
