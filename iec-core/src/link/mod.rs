//! Host link: the byte stream to the storage host and the verb framing on
//! top of it.
//!
//! - `HostLink`: transport trait (timeout-bounded reads)
//! - `MemoryLink`: in-memory transport
//! - `HostCodec`: request/response verbs

mod codec;
mod memory;

pub use codec::{verb, ChunkHeader, ChunkTag, CloseReply, HostCodec, ListingReply};
pub use memory::MemoryLink;

use crate::error::IecResult;

/// Byte transport to the host.
///
/// Reads are bounded by the transport's timeout: when the host goes quiet a
/// read returns fewer bytes than asked for instead of blocking.
pub trait HostLink {
    /// Write all bytes.
    fn write_all(&mut self, bytes: &[u8]) -> IecResult<()>;

    /// Read up to `buf.len()` bytes, stopping early on timeout.
    /// Returns the number of bytes read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> IecResult<usize>;

    /// Bytes that can be read without waiting.
    fn available(&mut self) -> IecResult<usize>;

    /// Push buffered output out to the host.
    fn flush(&mut self) -> IecResult<()>;

    /// Read a single byte, `None` on timeout.
    fn read_byte(&mut self) -> IecResult<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(match self.read_bytes(&mut byte)? {
            1 => Some(byte[0]),
            _ => None,
        })
    }

    /// Read into `buf` until `terminator`, a timeout, or a full buffer.
    /// The terminator is consumed but not stored.
    fn read_bytes_until(&mut self, terminator: u8, buf: &mut [u8]) -> IecResult<usize> {
        let mut count = 0;
        while count < buf.len() {
            match self.read_byte()? {
                Some(b) if b == terminator => break,
                Some(b) => {
                    buf[count] = b;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    /// Discard bytes up to and including `terminator`, stopping early on
    /// timeout. Returns the number of bytes dropped before the terminator.
    fn skip_until(&mut self, terminator: u8) -> IecResult<usize> {
        let mut dropped = 0;
        loop {
            match self.read_byte()? {
                Some(b) if b == terminator => return Ok(dropped),
                Some(_) => dropped += 1,
                None => return Ok(dropped),
            }
        }
    }

    /// Discard whatever the host already sent. Returns the number of bytes
    /// dropped.
    fn drain(&mut self) -> IecResult<usize> {
        let mut dropped = 0;
        let mut scratch = [0u8; 64];
        loop {
            let pending = self.available()?;
            if pending == 0 {
                return Ok(dropped);
            }
            let take = pending.min(scratch.len());
            let got = self.read_bytes(&mut scratch[..take])?;
            if got == 0 {
                return Ok(dropped);
            }
            dropped += got;
        }
    }
}
