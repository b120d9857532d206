//! Close: tell the host, then act on its reply.

use tracing::{debug, info, warn};

use super::resync;
use crate::bus::IecBus;
use crate::error::IecResult;
use crate::link::{CloseReply, HostCodec, HostLink};

/// What a close exchange did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The host named the file it just closed.
    Named { tag: u8, name: String },
    /// The bus device number was changed.
    DeviceChanged { from: u8, to: u8 },
    /// The host confirmed the current device number.
    DeviceUnchanged(u8),
    /// Unrecognised reply tag; nothing done.
    Ignored(u8),
}

/// Notify the host of a close and apply any device number change.
pub fn handle_close<B, L>(bus: &mut B, link: &mut L) -> IecResult<CloseOutcome>
where
    B: IecBus + ?Sized,
    L: HostLink + ?Sized,
{
    let reply = match HostCodec::new(link).request_close() {
        Ok(reply) => reply,
        Err(e) => return Err(resync(link, e)),
    };

    Ok(match reply {
        CloseReply::Name { tag, name } => {
            let name = String::from_utf8_lossy(&name).into_owned();
            debug!(tag = %(tag as char), %name, "closed");
            CloseOutcome::Named { tag, name }
        }
        CloseReply::DeviceNumber(device) => {
            let current = bus.device_number();
            if device != current {
                info!(from = current, to = device, "changing device number");
                bus.set_device_number(device);
                CloseOutcome::DeviceChanged {
                    from: current,
                    to: device,
                }
            } else {
                CloseOutcome::DeviceUnchanged(device)
            }
        }
        CloseReply::Other(tag) => {
            warn!(tag, "unexpected close reply");
            CloseOutcome::Ignored(tag)
        }
    })
}
