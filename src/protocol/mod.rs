//! Wire Protocol
//!
//! slatekv speaks a RESP-style frame protocol: a type prefix byte, CRLF
//! terminated lines, binary-safe bulk strings and arrays of frames. A
//! command is an array of bulk strings (`*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`);
//! a bare whitespace-separated line is also accepted so the server can be
//! poked with netcat.
//!
//! - [`types`] defines the [`Frame`] value and its serialization
//! - [`parser`] turns raw bytes into frames incrementally, reporting how
//!   many bytes each complete frame consumed

pub mod parser;
pub mod types;

pub use parser::{parse_frame, FrameError};
pub use types::Frame;
