//! Inbound line framing.
//!
//! Bytes arrive from the socket in arbitrary chunks; [`LineBuffer`] holds them
//! until a terminator shows up and then hands back whole lines, one at a time.

/// Maximum number of bytes held while waiting for a line terminator.
pub const MAX_BUFFER_LEN: usize = 1024;

/// The buffer grew past [`MAX_BUFFER_LEN`] without a terminator and was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("input buffer exceeded {MAX_BUFFER_LEN} bytes without a line terminator ({discarded} bytes discarded)")]
pub struct BufferOverflow {
    pub discarded: usize,
}

/// Per-connection inbound buffer.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the socket.
    ///
    /// If the buffer ends up larger than [`MAX_BUFFER_LEN`] and still holds no
    /// `\n`, everything buffered is dropped and the overflow is reported.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferOverflow> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_BUFFER_LEN && !self.buf.contains(&b'\n') {
            let discarded = self.buf.len();
            self.buf.clear();
            return Err(BufferOverflow { discarded });
        }
        Ok(())
    }

    /// Pop the next complete line, without its `\r\n` or `\n` terminator.
    ///
    /// Returns `None` until a terminator has been buffered. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn extract_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Iterator for LineBuffer {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.extract_line()
    }
}
