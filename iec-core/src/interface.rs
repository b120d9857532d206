//! IEC device interface - ATN command dispatcher.
//!
//! The caller polls `Interface::handler` from its main loop. Each poll
//! handles at most one attention event and runs at most one pipeline.
//!
//! OPEN is two-phase: the command text goes to the host right away and the
//! handler returns without waiting, so the device is free for the TALK or
//! LISTEN that follows. That later event collects the host's verdict and
//! picks the pipeline.

use tracing::{debug, error, trace, warn};

use crate::buffer::ScratchBuffer;
use crate::bus::{AtnCheck, AtnCmd, AtnCode, Attention, IecBus, Masked, COMMAND_CHANNEL};
use crate::config::Config;
use crate::error::{IecError, IecResult, HOST_FAILURE_CODE};
use crate::link::{HostCodec, HostLink};
use crate::pipeline::{
    handle_close, save_file, send_file, send_listing, send_status, OpenState, PipelineKind,
    PipelineReport, LISTING_ORIGIN,
};

/// Where the OPEN/verdict exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// No verdict outstanding.
    #[default]
    Idle,
    /// An OPEN was forwarded; the host's verdict has not been read yet.
    AwaitingVerdict { channel: u8 },
}

/// How a verdict exchange ended.
enum Verdict {
    /// `>` followed by a result byte.
    Result(u8),
    /// Synced, but the result did not arrive intact.
    Garbled,
    /// The host never sent `>`.
    NoSync,
}

/// Device-side protocol engine between an IEC bus driver and a host link.
pub struct Interface<B: IecBus, L: HostLink> {
    bus: B,
    link: L,
    buffer: ScratchBuffer,
    /// Set by the verdict on an OPEN; decides what the next TALK sends.
    open_state: OpenState,
    /// Pending status code for the command channel.
    queued_error: u8,
    phase: ExchangePhase,
    read_chunk: usize,
    listing_origin: u16,
    last_report: Option<PipelineReport>,
}

impl<B: IecBus, L: HostLink> Interface<B, L> {
    /// Create an interface with default settings.
    pub fn new(bus: B, link: L) -> Self {
        Self {
            bus,
            link,
            buffer: ScratchBuffer::new(),
            open_state: OpenState::Nothing,
            queued_error: 0,
            phase: ExchangePhase::Idle,
            read_chunk: crate::buffer::SCRATCH_SIZE,
            listing_origin: LISTING_ORIGIN,
            last_report: None,
        }
    }

    /// Create an interface using the transfer settings from `config`.
    pub fn with_config(bus: B, link: L, config: &Config) -> Self {
        let mut iface = Self::new(bus, link);
        iface.read_chunk = config.link.read_chunk;
        iface.listing_origin = config.listing_origin;
        iface
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn open_state(&self) -> OpenState {
        self.open_state
    }

    pub fn queued_error(&self) -> u8 {
        self.queued_error
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Outcome of the most recent pipeline.
    pub fn last_report(&self) -> Option<&PipelineReport> {
        self.last_report.as_ref()
    }

    pub fn take_report(&mut self) -> Option<PipelineReport> {
        self.last_report.take()
    }

    pub fn into_parts(self) -> (B, L) {
        (self.bus, self.link)
    }

    /// Poll the bus and handle one attention event.
    pub fn handler(&mut self) -> AtnCheck {
        let attention = {
            let mut bus = Masked::new(&mut self.bus);
            bus.check_atn()
        };
        let check = attention.check();

        match attention {
            Attention::Idle => {}
            Attention::Error => error!("ATN command: IEC error"),
            Attention::Cmd(cmd) | Attention::CmdListen(cmd) | Attention::CmdTalk(cmd) => {
                self.dispatch(cmd, check)
            }
        }
        check
    }

    fn dispatch(&mut self, cmd: AtnCmd, check: AtnCheck) {
        let channel = cmd.channel();
        debug!(code = cmd.code, channel, ?check, "ATN command");

        match cmd.class() {
            Some(AtnCode::Open) => self.open(&cmd),
            Some(AtnCode::Data) => match check {
                AtnCheck::CmdTalk => {
                    // Command channel requests are answered within the same
                    // TALK, so the host needs the OPEN replayed first.
                    if channel == COMMAND_CHANNEL {
                        self.open(&cmd);
                    }
                    self.data_talk(channel);
                }
                AtnCheck::CmdListen => self.data_listen(channel),
                _ => self.forward_command(&cmd),
            },
            Some(AtnCode::Close) => self.close(),
            Some(
                code @ (AtnCode::Listen | AtnCode::Talk | AtnCode::Unlisten | AtnCode::Untalk),
            ) => trace!(?code, "bus session control"),
            None => warn!(code = cmd.code, "unknown ATN command class"),
        }
    }

    /// Forward an OPEN to the host. The verdict is collected by the next
    /// TALK or LISTEN.
    fn open(&mut self, cmd: &AtnCmd) {
        match HostCodec::new(&mut self.link).notify_open(cmd.channel(), &cmd.text) {
            Ok(()) => {
                self.phase = ExchangePhase::AwaitingVerdict {
                    channel: cmd.channel(),
                }
            }
            Err(e) => self.fail(PipelineKind::Open, e),
        }
    }

    /// Send a command the host executes without answering on the bus; the
    /// result stays buffered host-side for a later status read.
    fn forward_command(&mut self, cmd: &AtnCmd) {
        if let Err(e) = HostCodec::new(&mut self.link).notify_open(cmd.channel(), &cmd.text) {
            self.fail(PipelineKind::Open, e);
        }
    }

    fn await_verdict(&mut self, channel: u8) -> Verdict {
        match self.phase {
            ExchangePhase::Idle => debug!(channel, "reading verdict with no OPEN outstanding"),
            ExchangePhase::AwaitingVerdict { channel: opened } if opened != channel => {
                warn!(opened, channel, "verdict read on a different channel than its OPEN")
            }
            ExchangePhase::AwaitingVerdict { .. } => {}
        }
        self.phase = ExchangePhase::Idle;

        let result = HostCodec::new(&mut self.link).await_verdict();
        match result {
            Ok(code) => Verdict::Result(code),
            Err(e @ IecError::SyncLost { .. }) => {
                error!("response not sync");
                self.fail(PipelineKind::Verdict, e);
                Verdict::NoSync
            }
            Err(e) => {
                warn!(error = %e, "verdict incomplete");
                Verdict::Garbled
            }
        }
    }

    fn data_talk(&mut self, channel: u8) {
        let code = match self.await_verdict(channel) {
            Verdict::NoSync => {
                self.not_found();
                return;
            }
            Verdict::Result(code) => Some(code),
            Verdict::Garbled => None,
        };

        if channel == COMMAND_CHANNEL {
            self.queued_error = code.unwrap_or(HOST_FAILURE_CODE);
            let result = send_status(
                &mut self.bus,
                &mut self.link,
                &mut self.buffer,
                self.queued_error,
            );
            self.record(PipelineKind::Status, result.map(PipelineReport::Status));
            // Dispatched to the computer: back to OK.
            self.queued_error = 0;
            return;
        }

        self.open_state = match code.map(OpenState::from_verdict) {
            Some(Some(state)) => state,
            Some(None) => {
                warn!(verdict = ?code, "unknown open verdict");
                OpenState::Nothing
            }
            None => OpenState::Nothing,
        };

        match self.open_state {
            OpenState::File => {
                let result = send_file(
                    &mut self.bus,
                    &mut self.link,
                    &mut self.buffer,
                    self.read_chunk,
                );
                self.record(PipelineKind::FileSend, result.map(PipelineReport::FileSent));
            }
            OpenState::Dir | OpenState::Info => {
                let result = send_listing(
                    &mut self.bus,
                    &mut self.link,
                    &mut self.buffer,
                    self.listing_origin,
                );
                self.record(PipelineKind::Listing, result.map(PipelineReport::Listing));
            }
            OpenState::Nothing | OpenState::FileErr => {
                self.not_found();
                self.last_report = Some(PipelineReport::NotFound(self.open_state));
            }
            OpenState::SaveReplace => {
                debug!("save-replace verdict on TALK; nothing to send");
                self.last_report = Some(PipelineReport::Skipped(self.open_state));
            }
        }
    }

    fn data_listen(&mut self, channel: u8) {
        let code = match self.await_verdict(channel) {
            Verdict::NoSync => {
                self.not_found();
                return;
            }
            Verdict::Result(code) => code,
            Verdict::Garbled => HOST_FAILURE_CODE,
        };
        self.queued_error = code;

        if code == 0 {
            let result = save_file(&mut self.bus, &mut self.link, &mut self.buffer);
            self.record(PipelineKind::FileSave, result.map(PipelineReport::FileSaved));
        } else {
            debug!(code, "host refused save");
            self.last_report = Some(PipelineReport::SaveRejected(code));
        }
    }

    fn close(&mut self) {
        let result = handle_close(&mut self.bus, &mut self.link);
        self.record(PipelineKind::Close, result.map(PipelineReport::Closed));
    }

    fn not_found(&mut self) {
        Masked::new(&mut self.bus).send_fnf();
    }

    fn record(&mut self, pipeline: PipelineKind, result: IecResult<PipelineReport>) {
        match result {
            Ok(report) => self.last_report = Some(report),
            Err(e) => self.fail(pipeline, e),
        }
    }

    fn fail(&mut self, pipeline: PipelineKind, e: IecError) {
        let desync = e.is_desync();
        if desync {
            error!(?pipeline, error = %e, "host link out of sync");
        } else {
            warn!(?pipeline, error = %e, "pipeline failed");
        }
        self.last_report = Some(PipelineReport::Failed {
            pipeline,
            reason: e.to_string(),
            desync,
        });
    }
}
