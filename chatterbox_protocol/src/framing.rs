// Length-prefixed text framing over TCP.
//
// Every unit of traffic, in both directions and in both the login and chat
// phases, is one frame: a 4-byte big-endian length `L`, then `L` bytes of
// UTF-8 text whose last byte is a NUL terminator. `L` counts the terminator,
// so an empty string travels as `L = 1`. The length is authoritative; there
// is no delimiter inside the payload, and NUL bytes other than the final one
// are ordinary content.
//
// `write_int` / `read_int` are the bare 4-byte prefix on its own. The frame
// functions are built from them, and older clients that think of the prefix
// as a separate "integer message" see exactly the same bytes.
//
// Any transfer that does not complete is reported as `ShortRead` or
// `ShortWrite`. Callers treat either as a dead connection.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum accepted frame length (1 MiB, terminator included). Protects
/// against unbounded allocation from a malformed length prefix. Chat lines and
/// the canned picture are orders of magnitude smaller.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Terminator byte appended to every frame and counted in its length.
pub const TERMINATOR: u8 = 0;

/// Failure to move a frame across the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// The stream ended or failed before the announced bytes arrived.
    #[error("short read: {0}")]
    ShortRead(#[source] io::Error),
    /// The stream accepted fewer bytes than requested.
    #[error("short write: {0}")]
    ShortWrite(#[source] io::Error),
    /// A zero length prefix. Legal senders always count the terminator.
    #[error("zero-length frame")]
    EmptyFrame,
    /// Length prefix above `MAX_FRAME_SIZE`.
    #[error("frame too large: {len} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge { len: usize },
    /// Payload was not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl WireError {
    /// True when the error means the peer is gone (as opposed to the peer
    /// sending something malformed).
    pub fn is_disconnect(&self) -> bool {
        matches!(self, WireError::ShortRead(_) | WireError::ShortWrite(_))
    }
}

/// Write a bare 4-byte big-endian integer.
pub fn write_int<W: Write>(writer: &mut W, value: u32) -> Result<(), WireError> {
    writer
        .write_all(&value.to_be_bytes())
        .map_err(WireError::ShortWrite)
}

/// Read a bare 4-byte big-endian integer, retrying partial reads.
pub fn read_int<R: Read>(reader: &mut R) -> Result<u32, WireError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(WireError::ShortRead)?;
    Ok(u32::from_be_bytes(buf))
}

/// Write one frame: length prefix (text length + 1), the text, the
/// terminator. Flushes before returning so buffered writers behave like the
/// raw socket.
pub fn write_frame<W: Write>(writer: &mut W, text: &str) -> Result<(), WireError> {
    let len = text.len() + 1;
    let prefix = u32::try_from(len)
        .ok()
        .filter(|&prefix| prefix <= MAX_FRAME_SIZE)
        .ok_or(WireError::TooLarge { len })?;
    write_int(writer, prefix)?;

    let mut body = Vec::with_capacity(len);
    body.extend_from_slice(text.as_bytes());
    body.push(TERMINATOR);
    writer.write_all(&body).map_err(WireError::ShortWrite)?;
    writer.flush().map_err(WireError::ShortWrite)
}

/// Read one frame and return its text with the terminator removed.
///
/// Only the final byte is treated as the terminator, and only when it is
/// NUL; a peer that forgets the terminator loses nothing.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<String, WireError> {
    let len = read_int(reader)?;
    if len == 0 {
        return Err(WireError::EmptyFrame);
    }
    if len > MAX_FRAME_SIZE {
        return Err(WireError::TooLarge { len: len as usize });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(WireError::ShortRead)?;
    if buf.last() == Some(&TERMINATOR) {
        buf.pop();
    }
    Ok(String::from_utf8(buf)?)
}
