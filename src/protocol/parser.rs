//! Incremental Frame Parser
//!
//! TCP delivers a byte stream, so a read may hold half a frame or several
//! frames back to back. [`parse_frame`] therefore reports three outcomes:
//!
//! - `Ok(Some((frame, consumed)))`: a complete frame; the caller advances
//!   its buffer by `consumed` bytes and may parse again (pipelining)
//! - `Ok(None)`: the buffer holds only a prefix of a frame, read more
//! - `Err(_)`: the bytes can never become a valid frame
//!
//! Lines that start with none of the known prefix bytes are treated as an
//! inline command: whitespace-separated words become an array of bulks.

use bytes::Bytes;
use thiserror::Error;

use crate::protocol::types::{Frame, CRLF};

/// Upper bound for a single bulk payload (64 MB).
pub const MAX_BULK_LEN: usize = 64 * 1024 * 1024;

/// Upper bound for array nesting.
pub const MAX_DEPTH: usize = 16;

/// Ways a byte sequence can fail to be a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid length prefix: {0}")]
    BadLength(String),
    #[error("bulk payload of {0} bytes exceeds the limit")]
    BulkTooLarge(usize),
    #[error("arrays nested deeper than {MAX_DEPTH}")]
    TooDeep,
    #[error("line is not valid UTF-8")]
    BadUtf8,
    #[error("bulk payload not terminated by CRLF")]
    MissingTerminator,
    #[error("empty inline command")]
    EmptyInline,
}

/// Attempts to parse one frame from the front of `buf`.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    parse_at_depth(buf, 0)
}

fn parse_at_depth(buf: &[u8], depth: usize) -> Result<Option<(Frame, usize)>, FrameError> {
    if depth > MAX_DEPTH {
        return Err(FrameError::TooDeep);
    }
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    match first {
        b'+' => parse_line(buf, |s| Frame::Simple(s.to_string())),
        b'-' => parse_line(buf, |s| Frame::Error(s.to_string())),
        b':' => parse_integer(buf),
        b'$' => parse_bulk(buf),
        b'*' => parse_array(buf, depth),
        _ => parse_inline(buf),
    }
}

/// A prefix byte followed by one CRLF-terminated UTF-8 line.
fn parse_line(
    buf: &[u8],
    build: impl FnOnce(&str) -> Frame,
) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| FrameError::BadUtf8)?;
    Ok(Some((build(text), 1 + end + 2)))
}

fn parse_integer(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| FrameError::BadUtf8)?;
    let n: i64 = text
        .parse()
        .map_err(|_| FrameError::BadLength(text.to_string()))?;
    Ok(Some((Frame::Integer(n), 1 + end + 2)))
}

fn parse_bulk(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(len_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let len = parse_length(&buf[1..1 + len_end])?;
    let header = 1 + len_end + 2;

    // $-1 is the null frame.
    let Some(len) = len else {
        return Ok(Some((Frame::Null, header)));
    };
    if len > MAX_BULK_LEN {
        return Err(FrameError::BulkTooLarge(len));
    }

    let total = header + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + len..total] != CRLF {
        return Err(FrameError::MissingTerminator);
    }
    let data = Bytes::copy_from_slice(&buf[header..header + len]);
    Ok(Some((Frame::Bulk(data), total)))
}

fn parse_array(buf: &[u8], depth: usize) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(count_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let count = parse_length(&buf[1..1 + count_end])?;
    let mut consumed = 1 + count_end + 2;

    // *-1 is also a null frame.
    let Some(count) = count else {
        return Ok(Some((Frame::Null, consumed)));
    };

    let mut frames = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        match parse_at_depth(&buf[consumed..], depth + 1)? {
            Some((frame, used)) => {
                frames.push(frame);
                consumed += used;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((Frame::Array(frames), consumed)))
}

/// Whitespace-separated words on a bare line, for interactive use.
fn parse_inline(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[..end]).map_err(|_| FrameError::BadUtf8)?;
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Err(FrameError::EmptyInline);
    }
    Ok(Some((Frame::bulk_array(words), end + 2)))
}

/// A decimal length field; `-1` maps to `None` (the null marker).
fn parse_length(text: &[u8]) -> Result<Option<usize>, FrameError> {
    let text = std::str::from_utf8(text).map_err(|_| FrameError::BadUtf8)?;
    let n: i64 = text
        .parse()
        .map_err(|_| FrameError::BadLength(text.to_string()))?;
    match n {
        -1 => Ok(None),
        n if n < 0 => Err(FrameError::BadLength(text.to_string())),
        n => Ok(Some(n as usize)),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> (Frame, usize) {
        parse_frame(input).unwrap().unwrap()
    }

    #[test]
    fn simple_string() {
        let (frame, used) = parse_one(b"+OK\r\n");
        assert_eq!(frame, Frame::Simple("OK".into()));
        assert_eq!(used, 5);
    }

    #[test]
    fn error_frame() {
        let (frame, _) = parse_one(b"-ERR nope\r\n");
        assert_eq!(frame, Frame::Error("ERR nope".into()));
    }

    #[test]
    fn integer_frame() {
        assert_eq!(parse_one(b":1000\r\n").0, Frame::Integer(1000));
        assert_eq!(parse_one(b":-42\r\n").0, Frame::Integer(-42));
    }

    #[test]
    fn bulk_frame() {
        let (frame, used) = parse_one(b"$5\r\nhello\r\n");
        assert_eq!(frame, Frame::bulk("hello"));
        assert_eq!(used, 11);
    }

    #[test]
    fn bulk_is_binary_safe() {
        let (frame, _) = parse_one(b"$5\r\nhe\x00lo\r\n");
        assert_eq!(frame, Frame::Bulk(Bytes::from(&b"he\x00lo"[..])));
    }

    #[test]
    fn null_frames() {
        assert_eq!(parse_one(b"$-1\r\n").0, Frame::Null);
        assert_eq!(parse_one(b"*-1\r\n").0, Frame::Null);
    }

    #[test]
    fn array_of_bulks() {
        let (frame, used) = parse_one(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert_eq!(frame, Frame::bulk_array(["GET", "k"]));
        assert_eq!(used, 18);
    }

    #[test]
    fn empty_array() {
        assert_eq!(parse_one(b"*0\r\n").0, Frame::Array(vec![]));
    }

    #[test]
    fn incomplete_frames_need_more_data() {
        assert!(parse_frame(b"").unwrap().is_none());
        assert!(parse_frame(b"+OK").unwrap().is_none());
        assert!(parse_frame(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
    }

    #[test]
    fn pipelined_frames_report_consumed_bytes() {
        let input = b"+OK\r\n:1\r\n";
        let (_, used) = parse_one(input);
        let (second, _) = parse_one(&input[used..]);
        assert_eq!(second, Frame::Integer(1));
    }

    #[test]
    fn inline_command_becomes_bulk_array() {
        let (frame, used) = parse_one(b"set counter 5\r\n");
        assert_eq!(frame, Frame::bulk_array(["set", "counter", "5"]));
        assert_eq!(used, 15);
    }

    #[test]
    fn blank_inline_line_is_rejected() {
        assert_eq!(parse_frame(b"  \r\n"), Err(FrameError::EmptyInline));
    }

    #[test]
    fn negative_bulk_length_is_rejected() {
        assert!(matches!(
            parse_frame(b"$-2\r\n"),
            Err(FrameError::BadLength(_))
        ));
    }

    #[test]
    fn non_numeric_length_is_rejected() {
        assert!(matches!(
            parse_frame(b"*x\r\n"),
            Err(FrameError::BadLength(_))
        ));
    }

    #[test]
    fn oversized_bulk_is_rejected() {
        let input = format!("${}\r\n", MAX_BULK_LEN + 1);
        assert!(matches!(
            parse_frame(input.as_bytes()),
            Err(FrameError::BulkTooLarge(_))
        ));
    }

    #[test]
    fn bulk_without_terminator_is_rejected() {
        assert_eq!(
            parse_frame(b"$5\r\nhelloXX"),
            Err(FrameError::MissingTerminator)
        );
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let mut input = Vec::new();
        for _ in 0..(MAX_DEPTH + 2) {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert_eq!(parse_frame(&input), Err(FrameError::TooDeep));
    }

    #[test]
    fn encode_parse_round_trip() {
        let original = Frame::Array(vec![
            Frame::bulk("SET"),
            Frame::bulk("k"),
            Frame::Integer(3),
            Frame::Null,
        ]);
        let (parsed, used) = parse_one(&original.encode());
        assert_eq!(parsed, original);
        assert_eq!(used, original.encode().len());
    }
}
