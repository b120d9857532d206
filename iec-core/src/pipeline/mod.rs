//! Transfer pipelines run by the dispatcher.
//!
//! Each pipeline runs to completion against a bus, a host link and the
//! shared transfer buffer. On failure it drains the host link so the next
//! exchange starts on a frame boundary, then reports the error upward.

pub mod close;
pub mod file_save;
pub mod file_send;
pub mod listing;
pub mod status;

pub use close::{handle_close, CloseOutcome};
pub use file_save::{save_file, FileSaveReport, SAVE_FRAME_LIMIT};
pub use file_send::{send_file, FileSendReport};
pub use listing::{send_line, send_listing, ListingReport, LISTING_ORIGIN};
pub use status::{send_status, StatusReport};

use tracing::{debug, warn};

use crate::error::IecError;
use crate::link::HostLink;

/// What the host asked the device to do on the next TALK, decided by its
/// verdict on the preceding OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OpenState {
    /// Nothing to send: file not found.
    #[default]
    Nothing = 0,
    /// Medium info requested; sent as a listing.
    Info = 1,
    /// A program file is open.
    File = 2,
    /// A directory listing was requested.
    Dir = 3,
    /// The file exists but has a format we cannot deliver.
    FileErr = 4,
    /// Save-with-replace was requested.
    SaveReplace = 5,
}

impl OpenState {
    /// Decode the host's verdict byte.
    pub fn from_verdict(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(OpenState::Nothing),
            1 => Some(OpenState::Info),
            2 => Some(OpenState::File),
            3 => Some(OpenState::Dir),
            4 => Some(OpenState::FileErr),
            5 => Some(OpenState::SaveReplace),
            _ => None,
        }
    }
}

/// Which pipeline produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Open,
    Verdict,
    FileSend,
    FileSave,
    Listing,
    Status,
    Close,
}

/// Outcome of the last pipeline the dispatcher ran.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineReport {
    FileSent(FileSendReport),
    FileSaved(FileSaveReport),
    Listing(ListingReport),
    Status(StatusReport),
    Closed(CloseOutcome),
    /// "File not found" was signalled for this open state.
    NotFound(OpenState),
    /// The host refused a LISTEN with this status code.
    SaveRejected(u8),
    /// The verdict asked for nothing the TALK path delivers.
    Skipped(OpenState),
    /// The pipeline aborted. `desync` is set when the host link framing was
    /// lost and the link had to be drained.
    Failed {
        pipeline: PipelineKind,
        reason: String,
        desync: bool,
    },
}

/// Drop unread host bytes after a failed exchange and hand the error back.
pub(crate) fn resync<L: HostLink + ?Sized>(link: &mut L, err: IecError) -> IecError {
    match link.drain() {
        Ok(0) => {}
        Ok(dropped) => debug!(dropped, "drained host link"),
        Err(e) => warn!(error = %e, "failed to drain host link"),
    }
    err
}
