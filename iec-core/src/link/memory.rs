//! In-memory host link.

use std::collections::VecDeque;

use super::HostLink;
use crate::error::IecResult;

/// Host link backed by two byte queues.
///
/// Bytes queued with `queue_input` play the host's side; everything the
/// device writes is captured in `output`. Running out of input behaves like a
/// read timeout.
#[derive(Default)]
pub struct MemoryLink {
    input: VecDeque<u8>,
    output: Vec<u8>,
    flushes: usize,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-queued host bytes.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Queue host bytes.
    pub fn queue_input(&mut self, input: &[u8]) {
        self.input.extend(input.iter().copied());
    }

    /// Everything the device has written.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Take and clear the captured output.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Host bytes not yet read.
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl HostLink for MemoryLink {
    fn write_all(&mut self, bytes: &[u8]) -> IecResult<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> IecResult<usize> {
        let count = buf.len().min(self.input.len());
        for (slot, b) in buf.iter_mut().zip(self.input.drain(..count)) {
            *slot = b;
        }
        Ok(count)
    }

    fn available(&mut self) -> IecResult<usize> {
        Ok(self.input.len())
    }

    fn flush(&mut self) -> IecResult<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read_on_underrun() {
        let mut link = MemoryLink::with_input(b"AB");
        let mut buf = [0u8; 4];
        assert_eq!(link.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"AB");
        assert_eq!(link.read_byte().unwrap(), None);
    }

    #[test]
    fn test_read_until_consumes_terminator() {
        let mut link = MemoryLink::with_input(b"00, OK\rX");
        let mut buf = [0u8; 32];
        let n = link.read_bytes_until(b'\r', &mut buf).unwrap();
        assert_eq!(&buf[..n], b"00, OK");
        assert_eq!(link.pending(), 1);
    }

    #[test]
    fn test_skip_until() {
        let mut link = MemoryLink::with_input(b"tail\rC");
        assert_eq!(link.skip_until(b'\r').unwrap(), 4);
        assert_eq!(link.pending(), 1);
        // Timeout before the terminator.
        assert_eq!(link.skip_until(b'\r').unwrap(), 1);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn test_drain() {
        let mut link = MemoryLink::with_input(&[0u8; 100]);
        assert_eq!(link.drain().unwrap(), 100);
        assert_eq!(link.pending(), 0);
        assert_eq!(link.drain().unwrap(), 0);
    }

    #[test]
    fn test_output_capture() {
        let mut link = MemoryLink::new();
        link.write_all(b"S").unwrap();
        link.write_all(b"N\0").unwrap();
        link.flush().unwrap();
        assert_eq!(link.output(), b"SN\0");
        assert_eq!(link.flush_count(), 1);
        assert_eq!(link.take_output(), b"SN\0".to_vec());
        assert!(link.output().is_empty());
    }
}
