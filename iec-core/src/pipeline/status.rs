//! Status channel: relay the host's message for the queued error code.

use tracing::{debug, warn};

use super::resync;
use crate::buffer::ScratchBuffer;
use crate::bus::{IecBus, Masked};
use crate::error::{IecError, IecResult};
use crate::link::{HostCodec, HostLink};

/// Result of a status relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    /// Error code the message was requested for.
    pub code: u8,
    /// Message bytes put on the bus.
    pub bytes_sent: usize,
}

/// Fetch the message for `code` and send it on the bus, last byte with EOI.
///
/// If the host never syncs or sends an empty message nothing goes on the
/// bus; the computer's read then times out on its own.
pub fn send_status<B, L>(
    bus: &mut B,
    link: &mut L,
    buf: &mut ScratchBuffer,
    code: u8,
) -> IecResult<StatusReport>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let len = match HostCodec::new(link).request_error_message(code, buf) {
        Ok(len) => len,
        Err(e) => return Err(resync(link, e)),
    };
    if len == 0 {
        warn!(code, "host sent an empty status message");
        return Ok(StatusReport {
            code,
            bytes_sent: 0,
        });
    }

    let message = &buf[..len];
    debug!(code, message = %String::from_utf8_lossy(message), "status");
    for (i, &b) in message.iter().enumerate() {
        let accepted = {
            let mut bus = Masked::new(&mut *bus);
            if i + 1 == len {
                bus.send_eoi(b)
            } else {
                bus.send(b)
            }
        };
        if !accepted {
            return Err(IecError::BusRejected { sent: i as u32 });
        }
    }

    Ok(StatusReport {
        code,
        bytes_sent: len,
    })
}
