//! Incremental frame parsers
//!
//! One parser per direction of a connection pair. Bytes are fed in whatever
//! chunks the socket delivers; the parser reports either that it is still
//! waiting for data or yields exactly one complete [`Frame`] plus the
//! overflow bytes that belong to the next frame.
//!
//! Framing rules:
//!
//! - Typed frame: 1-byte tag, then a u32 length that counts itself and the
//!   body but not the tag. Total size on the wire = length + 1.
//! - Frontend special frame (startup family, no tag): detected by a zero
//!   byte where a tag would be. Header is the zero byte, one padding byte,
//!   a u16 length counting the whole frame, and a u32 request code. The
//!   code selects startup, SSL request, or cancel; anything else is a
//!   fatal protocol error.
//!
//! Backend streams have no special frames; a zero tag there is fatal.

use crate::error::{ProxyError, Result};
use crate::protocol::buffer::FrameBuffer;
use crate::protocol::constants::{is_startup_code, CANCEL_REQUEST_CODE, SSL_REQUEST_CODE};
use crate::protocol::frame::{decode_backend, decode_frontend, decode_special, Frame, FrameKind};

/// Upper bound on a single frame; anything larger is treated as a framing
/// error rather than buffered indefinitely.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Result of feeding bytes to a parser.
#[derive(Debug)]
pub enum ParseProgress {
    /// Need more bytes.
    Incomplete,
    /// One frame completed; `overflow` holds the bytes after it.
    Complete { frame: Frame, overflow: Vec<u8> },
}

#[derive(Debug, Clone, Copy)]
struct PendingHeader {
    tag: Option<u8>,
    code: Option<u32>,
    total_len: usize,
    header_len: usize,
}

#[derive(Debug)]
struct FrameParser {
    buffer: FrameBuffer,
    frontend: bool,
    header: Option<PendingHeader>,
}

impl FrameParser {
    fn new(frontend: bool) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            frontend,
            header: None,
        }
    }

    fn consume(&mut self, bytes: &[u8]) -> Result<ParseProgress> {
        self.buffer.append(bytes);

        if self.header.is_none() {
            self.header = self.parse_header()?;
        }
        let header = match self.header {
            Some(h) => h,
            None => return Ok(ParseProgress::Incomplete),
        };

        if self.buffer.len() < header.total_len {
            return Ok(ParseProgress::Incomplete);
        }

        let (frame_bytes, overflow) = self.buffer.extract(header.total_len);
        self.header = None;

        let body = &frame_bytes[header.header_len..];
        let kind = match (header.tag, header.code) {
            (Some(tag), _) if self.frontend => decode_frontend(tag, body)?,
            (Some(tag), _) => decode_backend(tag, body)?,
            (None, Some(code)) => decode_special(code, body)?,
            (None, None) => FrameKind::Opaque,
        };

        Ok(ParseProgress::Complete {
            frame: Frame::new(frame_bytes, header.tag, kind),
            overflow,
        })
    }

    fn parse_header(&mut self) -> Result<Option<PendingHeader>> {
        self.buffer.reset_cursor();
        let first = match self.buffer.peek_u8() {
            Some(b) => b,
            None => return Ok(None),
        };

        if first != 0 {
            // Typed frame: tag + u32 length (counts itself, not the tag).
            if self.buffer.remaining() < 5 {
                return Ok(None);
            }
            let tag = self.buffer.get_u8();
            let length = self.buffer.get_u32();
            let (tag, length) = match (tag, length) {
                (Some(t), Some(l)) => (t, l),
                _ => return Ok(None),
            };
            if (length as usize) < 4 || (length as usize) + 1 > MAX_FRAME_SIZE {
                return Err(ProxyError::Protocol(format!(
                    "invalid frame length {} for type {:?}",
                    length, tag as char
                )));
            }
            return Ok(Some(PendingHeader {
                tag: Some(tag),
                code: None,
                total_len: length as usize + 1,
                header_len: 5,
            }));
        }

        if !self.frontend {
            return Err(self.unrecognized("zero type tag in backend stream"));
        }

        // Special frame: zero byte, padding, u16 length, u32 request code.
        if self.buffer.remaining() < 8 {
            self.buffer.reset_cursor();
            return Ok(None);
        }
        self.buffer.get_u8();
        self.buffer.get_u8();
        let length = self.buffer.get_u16();
        let code = self.buffer.get_u32();
        let (length, code) = match (length, code) {
            (Some(l), Some(c)) => (l, c),
            _ => return Ok(None),
        };

        if code != SSL_REQUEST_CODE && code != CANCEL_REQUEST_CODE && !is_startup_code(code) {
            return Err(self.unrecognized(&format!("unrecognized startup code {}", code)));
        }
        if (length as usize) < 8 {
            return Err(ProxyError::Protocol(format!(
                "invalid special frame length {}",
                length
            )));
        }

        Ok(Some(PendingHeader {
            tag: None,
            code: Some(code),
            total_len: length as usize,
            header_len: 8,
        }))
    }

    /// Fatal framing error quoting the leading raw bytes for diagnosis.
    fn unrecognized(&self, what: &str) -> ProxyError {
        let raw = self.buffer.as_slice();
        let shown = &raw[..raw.len().min(32)];
        ProxyError::Protocol(format!("{}; leading bytes {:02x?}", what, shown))
    }
}

/// Parser for the client-to-upstream direction.
#[derive(Debug)]
pub struct FrontendParser(FrameParser);

impl FrontendParser {
    pub fn new() -> Self {
        Self(FrameParser::new(true))
    }

    /// Feed a chunk; yields at most one frame. Overflow bytes must be fed
    /// back before (or along with) the next socket read.
    pub fn consume(&mut self, bytes: &[u8]) -> Result<ParseProgress> {
        self.0.consume(bytes)
    }
}

impl Default for FrontendParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parser for the upstream-to-client direction.
#[derive(Debug)]
pub struct BackendParser(FrameParser);

impl BackendParser {
    pub fn new() -> Self {
        Self(FrameParser::new(false))
    }

    pub fn consume(&mut self, bytes: &[u8]) -> Result<ParseProgress> {
        self.0.consume(bytes)
    }
}

impl Default for BackendParser {
    fn default() -> Self {
        Self::new()
    }
}
