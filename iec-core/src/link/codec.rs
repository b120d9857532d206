//! Verb framing for the host link.
//!
//! Every exchange starts with the device writing a one-character verb. The
//! host answers with a fixed-size reply or a tag plus length-prefixed
//! payload. Sentinel replies (`>` and `:`) are found by discarding bytes
//! until the sentinel shows up or the transport times out.

use tracing::{trace, warn};

use super::HostLink;
use crate::error::{IecError, IecResult};

/// Host link verbs.
pub mod verb {
    pub const OPEN: u8 = b'i';
    pub const SIZE: u8 = b'S';
    pub const READ: u8 = b'N';
    pub const WRITE: u8 = b'W';
    pub const LINE: u8 = b'L';
    pub const LAST_LINE: u8 = b'l';
    pub const CLOSE: u8 = b'C';
    pub const ERROR: u8 = b'E';
    pub const MORE: u8 = b'B';
    pub const VERDICT: u8 = b'>';
    pub const MESSAGE: u8 = b':';
    pub const NAME: u8 = b'N';
    pub const NAME_ALT: u8 = b'n';
}

/// Bytes in an `i` frame ahead of the command text.
const OPEN_HEADER_LEN: usize = 3;

/// Tag of a read chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    /// `B`: more chunks follow.
    More,
    /// `E`: final chunk.
    Last,
}

/// Header preceding each chunk of file data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: ChunkTag,
    pub len: u8,
}

/// Reply to a listing line request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingReply {
    /// `L`: a line of `len` bytes follows.
    Line(u8),
    /// Anything else ends the listing; `l` is the clean end.
    End(u8),
}

/// Reply to a close notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReply {
    /// `N`/`n`: name of the file just closed.
    Name { tag: u8, name: Vec<u8> },
    /// `C`: the host wants the device on another bus address.
    DeviceNumber(u8),
    /// Nothing we recognise.
    Other(u8),
}

/// Request/response codec over a borrowed transport.
pub struct HostCodec<'a, L: HostLink + ?Sized> {
    link: &'a mut L,
}

impl<'a, L: HostLink + ?Sized> HostCodec<'a, L> {
    pub fn new(link: &'a mut L) -> Self {
        Self { link }
    }

    /// The underlying transport.
    pub fn link(&mut self) -> &mut L {
        self.link
    }

    /// `i`,len,channel,text. Fire and forget: the host answers later with
    /// a verdict.
    pub fn notify_open(&mut self, channel: u8, text: &[u8]) -> IecResult<()> {
        let len = OPEN_HEADER_LEN + text.len();
        if len > u8::MAX as usize {
            return Err(IecError::CommandTooLong(text.len()));
        }
        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&[verb::OPEN, len as u8, channel & 0x0F]);
        frame.extend_from_slice(text);
        self.link.write_all(&frame)
    }

    /// Discard bytes until `sentinel` arrives.
    pub fn sync(&mut self, sentinel: u8) -> IecResult<()> {
        loop {
            match self.link.read_byte()? {
                Some(b) if b == sentinel => return Ok(()),
                Some(b) => trace!(byte = b, "discarding while syncing"),
                None => {
                    return Err(IecError::SyncLost {
                        sentinel: sentinel as char,
                    })
                }
            }
        }
    }

    /// Wait for `>` and return the result byte that follows it.
    ///
    /// The host terminates the result with CR; both bytes are consumed.
    pub fn await_verdict(&mut self) -> IecResult<u8> {
        self.sync(verb::VERDICT)?;
        let mut reply = [0u8; 2];
        let got = self.link.read_bytes(&mut reply)?;
        if got != reply.len() {
            return Err(IecError::ShortRead {
                expected: reply.len(),
                actual: got,
            });
        }
        Ok(reply[0])
    }

    /// `S` → `S`,hi,lo.
    pub fn query_file_size(&mut self) -> IecResult<u16> {
        self.link.write_all(&[verb::SIZE])?;
        let mut reply = [0u8; 3];
        let got = self.link.read_bytes(&mut reply)?;
        if got != reply.len() {
            return Err(IecError::ShortRead {
                expected: reply.len(),
                actual: got,
            });
        }
        if reply[0] != verb::SIZE {
            return Err(IecError::UnexpectedResponse {
                verb: verb::SIZE as char,
                byte: reply[0],
            });
        }
        Ok(u16::from_be_bytes([reply[1], reply[2]]))
    }

    /// `N`,hint. Starts the chunk stream; a hint of 256 goes out as 0.
    pub fn begin_read(&mut self, chunk_size: usize) -> IecResult<()> {
        self.link.write_all(&[verb::READ, (chunk_size & 0xFF) as u8])
    }

    /// Next `B`/`E`,len header of the chunk stream.
    pub fn read_chunk_header(&mut self) -> IecResult<ChunkHeader> {
        let mut header = [0u8; 2];
        let got = self.link.read_bytes(&mut header)?;
        if got != header.len() {
            return Err(IecError::ShortRead {
                expected: header.len(),
                actual: got,
            });
        }
        let tag = match header[0] {
            verb::MORE => ChunkTag::More,
            verb::ERROR => ChunkTag::Last,
            other => {
                return Err(IecError::UnexpectedResponse {
                    verb: verb::READ as char,
                    byte: other,
                })
            }
        };
        Ok(ChunkHeader {
            tag,
            len: header[1],
        })
    }

    /// Fill `buf` completely or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> IecResult<()> {
        let got = self.link.read_bytes(buf)?;
        if got != buf.len() {
            return Err(IecError::ShortRead {
                expected: buf.len(),
                actual: got,
            });
        }
        Ok(())
    }

    /// Push a complete `W` frame and flush it.
    pub fn push_frame(&mut self, frame: &[u8]) -> IecResult<()> {
        self.link.write_all(frame)?;
        self.link.flush()
    }

    /// `L` → `L`,len or end of listing.
    pub fn request_listing_line(&mut self) -> IecResult<ListingReply> {
        self.link.write_all(&[verb::LINE])?;
        let mut header = [0u8; 2];
        let got = self.link.read_bytes(&mut header)?;
        if got != header.len() {
            return Err(IecError::ShortRead {
                expected: header.len(),
                actual: got,
            });
        }
        Ok(match header[0] {
            verb::LINE => ListingReply::Line(header[1]),
            other => ListingReply::End(other),
        })
    }

    /// `C` → name notification or device number change.
    pub fn request_close(&mut self) -> IecResult<CloseReply> {
        self.link.write_all(&[verb::CLOSE])?;
        let mut header = [0u8; 2];
        let got = self.link.read_bytes(&mut header)?;
        if got != header.len() {
            return Err(IecError::ShortRead {
                expected: header.len(),
                actual: got,
            });
        }
        match header[0] {
            tag @ (verb::NAME | verb::NAME_ALT) => {
                let mut name = vec![0u8; header[1] as usize];
                self.read_exact(&mut name)?;
                Ok(CloseReply::Name { tag, name })
            }
            verb::CLOSE => Ok(CloseReply::DeviceNumber(header[1])),
            other => Ok(CloseReply::Other(other)),
        }
    }

    /// `E`,code → `:` then the message up to CR. Returns the message length
    /// stored in `buf`.
    pub fn request_error_message(&mut self, code: u8, buf: &mut [u8]) -> IecResult<usize> {
        self.link.write_all(&[verb::ERROR, code])?;
        self.sync(verb::MESSAGE)?;
        let len = self.link.read_bytes_until(b'\r', buf)?;
        if len == buf.len() {
            // Buffer full before CR: the rest of the message must not leak
            // into the next exchange.
            let dropped = self.link.skip_until(b'\r')?;
            if dropped > 0 {
                warn!(kept = len, dropped, "status message truncated");
            }
        }
        Ok(len)
    }
}
