//! IEC Device Interface Core
//!
//! This crate provides the device side of a disk-drive emulator that
//! answers a Commodore serial (IEC) bus and keeps its files on a host
//! computer reached over a serial link:
//! - ATN command dispatch (OPEN / CLOSE / TALK / LISTEN)
//! - Host link verb framing and resynchronization
//! - File send, file save, directory listing and status pipelines
//!
//! # Architecture
//!
//! The interface uses a layered design:
//! - `IecBus` trait: bit-level bus driver (external)
//! - `HostLink` trait: timeout-bounded byte transport to the host
//! - `HostCodec`: request/response verbs on top of a `HostLink`
//! - `Interface`: polls the bus and runs one pipeline per event

pub mod buffer;
pub mod bus;
pub mod config;
pub mod error;
pub mod interface;
pub mod link;
pub mod pipeline;

pub use buffer::{ScratchBuffer, SCRATCH_SIZE};
pub use bus::{
    AtnCheck, AtnCmd, AtnCode, Attention, BusByte, BusFlags, HeadlessBus, IecBus, Masked,
    COMMAND_CHANNEL,
};
pub use config::{Config, LinkConfig};
pub use error::{IecError, IecResult, HOST_FAILURE_CODE};
pub use interface::{ExchangePhase, Interface};
pub use link::{HostCodec, HostLink, MemoryLink};
pub use pipeline::{
    CloseOutcome, FileSaveReport, FileSendReport, ListingReport, OpenState, PipelineKind,
    PipelineReport, StatusReport,
};
