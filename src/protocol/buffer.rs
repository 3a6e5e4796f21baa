//! Accumulation buffer for incremental frame parsing
//!
//! Network reads deliver arbitrary byte chunks; a [`FrameBuffer`] collects
//! them and exposes cursor-based big-endian reads so a parser can attempt to
//! decode a header, back off when too few bytes have arrived, and split off
//! the overflow once a complete frame is buffered.

/// Growable byte buffer with a read cursor.
///
/// All multi-byte reads are big-endian (network order). A read past the end
/// returns `None` and leaves the cursor untouched, so callers can treat it
/// as "incomplete, wait for more data" and retry after the next `append`.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes available past the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Rewind the cursor to the start of the buffer.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Look at the next byte without advancing.
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.cursor).copied()
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        let b = self.peek_u8()?;
        self.cursor += 1;
        Some(b)
    }

    pub fn get_u16(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let v = u16::from_be_bytes([self.data[self.cursor], self.data[self.cursor + 1]]);
        self.cursor += 2;
        Some(v)
    }

    pub fn get_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_be_bytes([
            self.data[self.cursor],
            self.data[self.cursor + 1],
            self.data[self.cursor + 2],
            self.data[self.cursor + 3],
        ]);
        self.cursor += 4;
        Some(v)
    }

    /// Read `n` bytes starting at the cursor.
    pub fn get_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.remaining() < n {
            return None;
        }
        let out = self.data[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;
        Some(out)
    }

    /// Split the buffer at `n`: the first `n` bytes are returned as the
    /// completed frame, everything after as overflow belonging to the next
    /// frame. The buffer is emptied.
    pub fn extract(&mut self, n: usize) -> (Vec<u8>, Vec<u8>) {
        debug_assert!(n <= self.data.len());
        let overflow = self.data.split_off(n);
        let frame = std::mem::take(&mut self.data);
        self.cursor = 0;
        (frame, overflow)
    }

    /// View of everything buffered so far, ignoring the cursor. Used for
    /// error reporting on unparseable input.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_big_endian() {
        let mut buf = FrameBuffer::new();
        buf.append(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(buf.get_u8(), Some(0x01));
        assert_eq!(buf.get_u16(), Some(0x0203));
        assert_eq!(buf.get_u32(), Some(0x0405_0607));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_short_read_returns_none_and_preserves_cursor() {
        let mut buf = FrameBuffer::new();
        buf.append(&[0xAA, 0xBB]);
        assert_eq!(buf.get_u8(), Some(0xAA));
        assert_eq!(buf.get_u32(), None);
        assert_eq!(buf.remaining(), 1);
        // More data arrives, the read succeeds from the same position.
        buf.append(&[0x00, 0x00, 0x01]);
        assert_eq!(buf.get_u32(), Some(0xBB00_0001));
    }

    #[test]
    fn test_reset_cursor_allows_reparse() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2, 3, 4]);
        buf.get_u16();
        buf.reset_cursor();
        assert_eq!(buf.get_u32(), Some(0x0102_0304));
    }

    #[test]
    fn test_extract_splits_frame_and_overflow() {
        let mut buf = FrameBuffer::new();
        buf.append(b"hello world");
        let (frame, overflow) = buf.extract(5);
        assert_eq!(frame, b"hello");
        assert_eq!(overflow, b" world");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_exact_length_has_empty_overflow() {
        let mut buf = FrameBuffer::new();
        buf.append(&[9, 9, 9]);
        let (frame, overflow) = buf.extract(3);
        assert_eq!(frame, vec![9, 9, 9]);
        assert!(overflow.is_empty());
    }

    #[test]
    fn test_get_bytes() {
        let mut buf = FrameBuffer::new();
        buf.append(&[1, 2, 3, 4]);
        assert_eq!(buf.get_bytes(2), Some(vec![1, 2]));
        assert_eq!(buf.get_bytes(3), None);
        assert_eq!(buf.get_bytes(2), Some(vec![3, 4]));
    }
}
