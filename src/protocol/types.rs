//! Protocol Frames
//!
//! Frame grammar, one prefix byte each, every line CRLF terminated:
//!
//! ```text
//! +OK\r\n                     simple string
//! -ERR message\r\n            error
//! :42\r\n                     integer
//! $5\r\nhello\r\n             bulk string (binary safe)
//! $-1\r\n                     null
//! *2\r\n<frame><frame>        array
//! ```

use std::fmt;

use bytes::Bytes;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// A single protocol value, used for both requests and replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// The canonical success reply.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Frame::Error(msg.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    /// An array of bulk strings, the shape of every command and of list
    /// replies.
    pub fn bulk_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Frame::Array(
            values
                .into_iter()
                .map(|v| Frame::Bulk(Bytes::from(v.into())))
                .collect(),
        )
    }

    /// The UTF-8 text of a simple or bulk frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Serializes the frame to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Serializes into an existing buffer, reusing its capacity.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            Frame::Array(frames) => {
                buf.push(b'*');
                buf.extend_from_slice(frames.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for frame in frames {
                    frame.encode_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{s}"),
            Frame::Error(s) => write!(f, "(error) {s}"),
            Frame::Integer(n) => write!(f, "(integer) {n}"),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{s}\""),
                Err(_) => write!(f, "({} raw bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(frames) => {
                for (i, frame) in frames.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {frame}", i + 1)?;
                }
                Ok(())
            }
        }
    }
}
