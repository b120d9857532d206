//! Scripted bus for tests and host bring-up.

use std::collections::VecDeque;

use super::{AtnCmd, AtnCode, Attention, BusFlags, IecBus};

/// One byte the device put on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusByte {
    pub value: u8,
    pub eoi: bool,
}

/// Headless bus - replays queued attention events and incoming bytes,
/// records everything sent.
///
/// It also accounts for interrupt masking: how many masked windows were
/// opened, the most bus operations seen inside one, and how many operations
/// ran with interrupts enabled.
pub struct HeadlessBus {
    attention: VecDeque<Attention>,
    incoming: VecDeque<(u8, BusFlags)>,
    sent: Vec<BusByte>,
    state: BusFlags,
    device_number: u8,
    fnf_count: usize,
    reject_after: Option<usize>,
    mask_depth: usize,
    window_ops: usize,
    max_window_ops: usize,
    windows: usize,
    unmasked_ops: usize,
}

impl Default for HeadlessBus {
    fn default() -> Self {
        Self::new(8)
    }
}

impl HeadlessBus {
    pub fn new(device_number: u8) -> Self {
        Self {
            attention: VecDeque::new(),
            incoming: VecDeque::new(),
            sent: Vec::new(),
            state: BusFlags::NONE,
            device_number,
            fnf_count: 0,
            reject_after: None,
            mask_depth: 0,
            window_ops: 0,
            max_window_ops: 0,
            windows: 0,
            unmasked_ops: 0,
        }
    }

    /// Queue a raw attention event.
    pub fn queue_attention(&mut self, attention: Attention) {
        self.attention.push_back(attention);
    }

    /// Queue OPEN on `channel` with a filename or command.
    pub fn queue_open(&mut self, channel: u8, text: &[u8]) {
        self.queue_attention(Attention::Cmd(AtnCmd::with_channel(
            AtnCode::Open,
            channel,
            text,
        )));
    }

    /// Queue a DATA secondary address followed by TALK.
    pub fn queue_talk(&mut self, channel: u8) {
        self.queue_attention(Attention::CmdTalk(AtnCmd::with_channel(
            AtnCode::Data,
            channel,
            Vec::new(),
        )));
    }

    /// Queue a DATA secondary address followed by LISTEN.
    pub fn queue_listen(&mut self, channel: u8) {
        self.queue_attention(Attention::CmdListen(AtnCmd::with_channel(
            AtnCode::Data,
            channel,
            Vec::new(),
        )));
    }

    /// Queue a DATA command with no data phase.
    pub fn queue_command(&mut self, channel: u8, text: &[u8]) {
        self.queue_attention(Attention::Cmd(AtnCmd::with_channel(
            AtnCode::Data,
            channel,
            text,
        )));
    }

    pub fn queue_close(&mut self, channel: u8) {
        self.queue_attention(Attention::Cmd(AtnCmd::with_channel(
            AtnCode::Close,
            channel,
            Vec::new(),
        )));
    }

    /// Queue bytes the computer will send; the last one carries EOI if asked.
    pub fn queue_incoming(&mut self, data: &[u8], eoi_on_last: bool) {
        let last = data.len().saturating_sub(1);
        for (i, &b) in data.iter().enumerate() {
            let flags = if eoi_on_last && i == last {
                BusFlags::EOI
            } else {
                BusFlags::NONE
            };
            self.incoming.push_back((b, flags));
        }
    }

    /// Queue one incoming byte with explicit flags.
    pub fn queue_incoming_byte(&mut self, value: u8, flags: BusFlags) {
        self.incoming.push_back((value, flags));
    }

    /// Make every send after the first `count` fail.
    pub fn reject_after(&mut self, count: usize) {
        self.reject_after = Some(count);
    }

    /// Everything sent so far.
    pub fn sent(&self) -> &[BusByte] {
        &self.sent
    }

    /// Sent values without EOI markers.
    pub fn sent_values(&self) -> Vec<u8> {
        self.sent.iter().map(|b| b.value).collect()
    }

    pub fn eoi_count(&self) -> usize {
        self.sent.iter().filter(|b| b.eoi).count()
    }

    pub fn fnf_count(&self) -> usize {
        self.fnf_count
    }

    pub fn pending_attention(&self) -> usize {
        self.attention.len()
    }

    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_masked(&self) -> bool {
        self.mask_depth > 0
    }

    /// Number of masked windows opened.
    pub fn masked_windows(&self) -> usize {
        self.windows
    }

    /// Most bus operations performed inside a single masked window.
    pub fn max_window_ops(&self) -> usize {
        self.max_window_ops
    }

    /// Bus operations performed while interrupts were enabled.
    pub fn unmasked_ops(&self) -> usize {
        self.unmasked_ops
    }

    fn count_op(&mut self) {
        if self.mask_depth > 0 {
            self.window_ops += 1;
            self.max_window_ops = self.max_window_ops.max(self.window_ops);
        } else {
            self.unmasked_ops += 1;
        }
    }

    fn push(&mut self, value: u8, eoi: bool) -> bool {
        self.count_op();
        if let Some(limit) = self.reject_after {
            if self.sent.len() >= limit {
                self.state = BusFlags::ERROR;
                return false;
            }
        }
        self.sent.push(BusByte { value, eoi });
        self.state = if eoi { BusFlags::EOI } else { BusFlags::NONE };
        true
    }
}

impl IecBus for HeadlessBus {
    fn check_atn(&mut self) -> Attention {
        self.count_op();
        self.attention.pop_front().unwrap_or(Attention::Idle)
    }

    fn send(&mut self, byte: u8) -> bool {
        self.push(byte, false)
    }

    fn send_eoi(&mut self, byte: u8) -> bool {
        self.push(byte, true)
    }

    fn receive(&mut self) -> u8 {
        self.count_op();
        match self.incoming.pop_front() {
            Some((value, flags)) => {
                self.state = flags;
                value
            }
            None => {
                // The computer never clocked a byte out: a bus timeout.
                self.state = BusFlags::ERROR;
                0
            }
        }
    }

    fn state(&self) -> BusFlags {
        self.state
    }

    fn send_fnf(&mut self) {
        self.count_op();
        self.fnf_count += 1;
    }

    fn device_number(&self) -> u8 {
        self.device_number
    }

    fn set_device_number(&mut self, device: u8) {
        self.device_number = device;
    }

    fn mask_interrupts(&mut self) {
        if self.mask_depth == 0 {
            self.windows += 1;
            self.window_ops = 0;
        }
        self.mask_depth += 1;
    }

    fn unmask_interrupts(&mut self) {
        self.mask_depth = self.mask_depth.saturating_sub(1);
    }
}
