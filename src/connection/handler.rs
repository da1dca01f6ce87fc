//! Connection Loop
//!
//! The lifecycle of a client:
//!
//! 1. the accept loop hands the socket to [`serve_connection`] in its own
//!    task
//! 2. the task reads frames, executes them, writes replies, until the
//!    client disconnects, sends `QUIT`, or breaks the protocol
//! 3. protocol violations get one error reply, then the connection closes
//!
//! The read buffer accumulates across reads because a frame can arrive in
//! pieces; it is capped so a client cannot grow it without bound.

use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::protocol::{parse_frame, Frame, FrameError};

/// Hard cap on buffered, unparsed input per connection (1 MB).
const MAX_BUFFER: usize = 1024 * 1024;

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(#[from] FrameError),
    #[error("connection closed mid-frame")]
    TruncatedFrame,
    #[error("read buffer limit exceeded")]
    BufferFull,
}

/// A framed TCP stream.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Reads the next complete frame.
    ///
    /// `Ok(None)` means the client closed the connection cleanly between
    /// frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some((frame, consumed)) = parse_frame(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(Some(frame));
            }
            if self.buffer.len() >= MAX_BUFFER {
                return Err(ConnectionError::BufferFull);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::TruncatedFrame)
                };
            }
        }
    }

    /// Writes and flushes one reply frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let bytes = frame.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Runs one client to completion.
pub async fn serve_connection(stream: TcpStream, addr: SocketAddr, handler: CommandHandler) {
    info!(client = %addr, "client connected");
    let mut connection = Connection::new(stream);

    loop {
        match connection.read_frame().await {
            Ok(Some(frame)) => {
                let quitting = is_quit(&frame);
                let reply = handler.execute(frame);
                if let Err(e) = connection.write_frame(&reply).await {
                    debug!(client = %addr, error = %e, "write failed");
                    break;
                }
                if quitting {
                    debug!(client = %addr, "client quit");
                    break;
                }
            }
            Ok(None) => {
                info!(client = %addr, "client disconnected");
                break;
            }
            Err(ConnectionError::Protocol(e)) => {
                warn!(client = %addr, error = %e, "protocol error, closing");
                let _ = connection
                    .write_frame(&Frame::error(format!("ERR protocol error: {e}")))
                    .await;
                break;
            }
            Err(e) => {
                debug!(client = %addr, error = %e, "connection ended");
                break;
            }
        }
    }
}

fn is_quit(frame: &Frame) -> bool {
    match frame {
        Frame::Array(args) => args
            .first()
            .and_then(|f| f.as_text())
            .is_some_and(|name| name.eq_ignore_ascii_case("QUIT")),
        _ => false,
    }
}
