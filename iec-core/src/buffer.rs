//! Transfer window shared by the pipelines.
//!
//! One `ScratchBuffer` lives in the `Interface` and is lent to whichever
//! pipeline is running. Its contents carry no meaning between phases.

use std::ops::{Deref, DerefMut};

/// Capacity of the transfer window.
pub const SCRATCH_SIZE: usize = 256;

/// Fixed-size byte buffer reused by every host link exchange.
pub struct ScratchBuffer {
    bytes: [u8; SCRATCH_SIZE],
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; SCRATCH_SIZE],
        }
    }

    /// Mutable window of the first `len` bytes, clamped to capacity.
    pub fn window(&mut self, len: usize) -> &mut [u8] {
        &mut self.bytes[..len.min(SCRATCH_SIZE)]
    }
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
