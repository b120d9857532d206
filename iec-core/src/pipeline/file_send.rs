//! File send: host chunks → bus, last byte with EOI.

use tracing::{info, trace};

use super::resync;
use crate::buffer::ScratchBuffer;
use crate::bus::{IecBus, Masked};
use crate::error::{IecError, IecResult};
use crate::link::{ChunkTag, HostCodec, HostLink};

/// Result of a completed file send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSendReport {
    /// Size the host announced for the file.
    pub total_size: u16,
    /// Bytes put on the bus.
    pub bytes_sent: u32,
}

/// Stream the currently opened file from the host onto the bus.
///
/// `chunk_size` is the read size requested from the host for every chunk.
pub fn send_file<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
    chunk_size: usize,
) -> IecResult<FileSendReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    match transfer(bus, link, buf, chunk_size) {
        Ok(report) => {
            info!(
                "Transferred {} of {} bytes",
                report.bytes_sent, report.total_size
            );
            Ok(report)
        }
        Err(e) => Err(resync(link, e)),
    }
}

fn transfer<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
    chunk_size: usize,
) -> IecResult<FileSendReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let mut codec = HostCodec::new(link);
    let total_size = codec.query_file_size()?;
    codec.begin_read(chunk_size)?;

    let mut bytes_sent: u32 = 0;
    loop {
        let header = codec.read_chunk_header()?;
        let len = header.len as usize;
        let last_chunk = header.tag == ChunkTag::Last;
        if last_chunk && len == 0 {
            return Err(IecError::EmptyFinalChunk);
        }

        let payload = buf.window(len);
        codec.read_exact(payload)?;
        trace!(len, last_chunk, "chunk");

        for (i, &byte) in payload.iter().enumerate() {
            let accepted = {
                let mut bus = Masked::new(&mut *bus);
                if last_chunk && i + 1 == len {
                    bus.send_eoi(byte)
                } else {
                    bus.send(byte)
                }
            };
            if !accepted {
                return Err(IecError::BusRejected { sent: bytes_sent });
            }
            bytes_sent += 1;
        }

        if last_chunk {
            return Ok(FileSendReport {
                total_size,
                bytes_sent,
            });
        }
    }
}
