//! Compressed input buffered between feeders and the decode worker.
//!
//! [`InputQueue`] is plain data: it lives inside the session state and is only touched while
//! the session lock is held. The blocking side (waiting for bytes or a stop request) is
//! implemented by the session on top of it.

use std::collections::VecDeque;

/// One fed buffer plus how much of it the decoder already consumed.
#[derive(Debug)]
struct PendingChunk {
    bytes: Vec<u8>,
    consumed: usize,
}

impl PendingChunk {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.consumed..]
    }
}

/// Ordered queue of byte chunks with partial-consumption tracking.
///
/// ## Invariants
/// - Chunks are read strictly in push order.
/// - A chunk's consumed offset only grows; the chunk is removed once fully drained.
/// - The queue never holds an empty chunk, so `is_empty()` means "no unread bytes".
#[derive(Debug, Default)]
pub struct InputQueue {
    chunks: VecDeque<PendingChunk>,
    pending_bytes: usize,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        self.pending_bytes += bytes.len();
        self.chunks.push_back(PendingChunk { bytes, consumed: 0 });
    }

    /// Copy up to `dst.len()` bytes from the front of the queue into `dst`.
    ///
    /// Returns the number of bytes copied; `0` only when the queue is empty or `dst` is.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let mut written = 0;

        while written < dst.len() {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            let src = front.remaining();
            let n = src.len().min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&src[..n]);
            front.consumed += n;
            written += n;

            if front.consumed == front.bytes.len() {
                self.chunks.pop_front();
            }
        }

        self.pending_bytes -= written;
        written
    }

    /// Unread bytes across all chunks.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drop all unread input.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.pending_bytes = 0;
    }
}
