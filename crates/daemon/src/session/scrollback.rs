//! Bounded scrollback buffer for terminal output.
//!
//! Each session keeps the tail of its historical output so late-joining
//! viewers can replay it. The buffer is capacity-bounded with an asymmetric
//! trim: it grows until it crosses the hard cap, then is cut back to a
//! smaller retained size, so trimming does not happen on every append.

use bytes::{Bytes, BytesMut};

/// Maximum bytes a scrollback buffer may hold at any observable instant.
pub const SCROLLBACK_MAX_BYTES: usize = 100_000;

/// Bytes retained after a trim. Once the buffer first crosses
/// [`SCROLLBACK_MAX_BYTES`] its length oscillates between this value and the
/// hard cap.
pub const SCROLLBACK_RETAIN_BYTES: usize = 50_000;

/// Append-only byte buffer holding the most recent terminal output.
///
/// Mutated only from within the coordinator's serialized command loop, so no
/// reader ever observes a partial append.
#[derive(Debug, Default)]
pub struct ScrollbackBuffer {
    data: BytesMut,
}

impl ScrollbackBuffer {
    /// Creates an empty scrollback buffer.
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
        }
    }

    /// Appends a chunk of output, trimming to the retained size if the
    /// result would exceed the hard cap.
    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
        if self.data.len() > SCROLLBACK_MAX_BYTES {
            let cut = self.data.len() - SCROLLBACK_RETAIN_BYTES;
            self.data = self.data.split_off(cut);
        }
    }

    /// Returns a snapshot of the retained output.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Returns the retained output as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Current number of retained bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no output has been retained.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
