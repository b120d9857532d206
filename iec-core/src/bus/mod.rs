//! IEC bus driver surface.
//!
//! The bit-level driver lives outside this crate. The `IecBus` trait is the
//! slice of it the dispatcher needs:
//! - attention polling, yielding an owned `AtnCmd`
//! - byte send / send with EOI / receive with state flags
//! - device addressing and the "file not found" signal
//! - interrupt masking around timing-critical transfers

mod headless;

use std::ops::{BitOr, Deref, DerefMut};

pub use headless::{BusByte, HeadlessBus};

/// Reserved command/status channel.
pub const COMMAND_CHANNEL: u8 = 15;

/// Command class carried in the high nibble of an ATN code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtnCode {
    Listen = 0x20,
    Unlisten = 0x30,
    Talk = 0x40,
    Untalk = 0x50,
    Data = 0x60,
    Close = 0xE0,
    Open = 0xF0,
}

impl AtnCode {
    /// Decode the command class from a raw ATN code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code & 0xF0 {
            0x20 => Some(AtnCode::Listen),
            0x30 => Some(AtnCode::Unlisten),
            0x40 => Some(AtnCode::Talk),
            0x50 => Some(AtnCode::Untalk),
            0x60 => Some(AtnCode::Data),
            0xE0 => Some(AtnCode::Close),
            0xF0 => Some(AtnCode::Open),
            _ => None,
        }
    }
}

/// Parsed bus command: class/channel code plus the command text (filename
/// or DOS command) that followed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtnCmd {
    pub code: u8,
    pub text: Vec<u8>,
}

impl AtnCmd {
    pub fn new(code: u8, text: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Build a command from its class and a channel number (masked to 0-15).
    pub fn with_channel(class: AtnCode, channel: u8, text: impl Into<Vec<u8>>) -> Self {
        Self::new(class as u8 | (channel & 0x0F), text)
    }

    /// Logical channel (low nibble).
    pub fn channel(&self) -> u8 {
        self.code & 0x0F
    }

    /// Command class (high nibble).
    pub fn class(&self) -> Option<AtnCode> {
        AtnCode::from_code(self.code)
    }
}

/// Result of polling the bus for attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attention {
    /// Nothing happened.
    Idle,
    /// Bus-level desync.
    Error,
    /// A command with no data phase for this device.
    Cmd(AtnCmd),
    /// A command followed by LISTEN: the computer will send data.
    CmdListen(AtnCmd),
    /// A command followed by TALK: the computer expects data.
    CmdTalk(AtnCmd),
}

impl Attention {
    pub fn check(&self) -> AtnCheck {
        match self {
            Attention::Idle => AtnCheck::Idle,
            Attention::Error => AtnCheck::Error,
            Attention::Cmd(_) => AtnCheck::Cmd,
            Attention::CmdListen(_) => AtnCheck::CmdListen,
            Attention::CmdTalk(_) => AtnCheck::CmdTalk,
        }
    }
}

/// Classification returned by the dispatcher on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtnCheck {
    Idle,
    Error,
    Cmd,
    CmdListen,
    CmdTalk,
}

/// Driver state flags reported after a receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusFlags(u8);

impl BusFlags {
    pub const NONE: Self = Self(0);
    pub const EOI: Self = Self(1 << 0);
    pub const ERROR: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_eoi(self) -> bool {
        self.contains(Self::EOI)
    }

    pub fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }
}

impl BitOr for BusFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Bus driver interface consumed by the dispatcher.
pub trait IecBus {
    /// Poll for an attention sequence.
    fn check_atn(&mut self) -> Attention;

    /// Send one byte. Returns false if the computer did not accept it.
    fn send(&mut self, byte: u8) -> bool;

    /// Send one byte flagged as end-of-transmission.
    fn send_eoi(&mut self, byte: u8) -> bool;

    /// Receive one byte. Check `state()` afterwards for EOI/error.
    fn receive(&mut self) -> u8;

    /// Flags left by the last transfer.
    fn state(&self) -> BusFlags;

    /// Signal "file not found" to the computer.
    fn send_fnf(&mut self);

    fn device_number(&self) -> u8;

    fn set_device_number(&mut self, device: u8);

    /// Mask interrupts that would disturb bus timing. No-op by default.
    fn mask_interrupts(&mut self) {}

    /// Undo `mask_interrupts`.
    fn unmask_interrupts(&mut self) {}
}

/// Scoped critical section: interrupts stay masked while the guard lives.
///
/// Keep the guard's scope to the bus operations that need it; the serial
/// receiver on real hardware drops bytes while it is held.
pub struct Masked<'a, B: IecBus + ?Sized> {
    bus: &'a mut B,
}

impl<'a, B: IecBus + ?Sized> Masked<'a, B> {
    pub fn new(bus: &'a mut B) -> Self {
        bus.mask_interrupts();
        Self { bus }
    }
}

impl<B: IecBus + ?Sized> Deref for Masked<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.bus
    }
}

impl<B: IecBus + ?Sized> DerefMut for Masked<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.bus
    }
}

impl<B: IecBus + ?Sized> Drop for Masked<'_, B> {
    fn drop(&mut self) {
        self.bus.unmask_interrupts();
    }
}
