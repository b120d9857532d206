//! File save: bus bytes → `W` frames to the host.

use tracing::{debug, warn};

use super::resync;
use crate::buffer::ScratchBuffer;
use crate::bus::{IecBus, Masked};
use crate::error::IecResult;
use crate::link::{verb, HostCodec, HostLink};

/// Largest `W` frame, including the verb and length bytes.
pub const SAVE_FRAME_LIMIT: usize = 0xF0;

/// Verb plus length byte ahead of the payload.
const FRAME_HEADER_LEN: usize = 2;

/// Result of a completed save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSaveReport {
    /// Payload bytes pushed to the host.
    pub bytes_saved: u32,
    /// `W` frames pushed.
    pub frames: u32,
    /// The bus flagged an error instead of EOI.
    pub bus_error: bool,
}

/// Receive bytes from the bus until EOI or a bus error and push them to the
/// host in `W` frames.
///
/// Frame layout is `W`, frame length (header included), payload. The byte
/// that ends the transfer is forwarded whether it carried EOI or an error.
pub fn save_file<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
) -> IecResult<FileSaveReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    match receive(bus, link, buf) {
        Ok(report) => {
            if report.bus_error {
                warn!(bytes = report.bytes_saved, "save ended by bus error");
            } else {
                debug!(
                    bytes = report.bytes_saved,
                    frames = report.frames,
                    "save complete"
                );
            }
            Ok(report)
        }
        Err(e) => Err(resync(link, e)),
    }
}

fn receive<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
) -> IecResult<FileSaveReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let mut codec = HostCodec::new(link);
    let mut report = FileSaveReport::default();

    loop {
        let mut len = FRAME_HEADER_LEN;
        let done = loop {
            let (byte, state) = {
                let mut bus = Masked::new(&mut *bus);
                let byte = bus.receive();
                (byte, bus.state())
            };
            buf[len] = byte;
            len += 1;
            if state.is_error() {
                report.bus_error = true;
                break true;
            }
            if state.is_eoi() {
                break true;
            }
            if len >= SAVE_FRAME_LIMIT {
                break false;
            }
        };

        buf[0] = verb::WRITE;
        buf[1] = len as u8;
        codec.push_frame(&buf[..len])?;
        report.bytes_saved += (len - FRAME_HEADER_LEN) as u32;
        report.frames += 1;

        if done {
            return Ok(report);
        }
    }
}
