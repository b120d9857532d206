//! Scripted bus sessions.
//!
//! A script stands in for the computer side of the bus: the attention events
//! it raises, in order, and the bytes it sends while the device listens.
//!
//! ```json
//! {
//!   "deviceNumber": 8,
//!   "events": [
//!     { "atn": "open", "channel": 0, "text": "$" },
//!     { "atn": "talk", "channel": 0 },
//!     { "atn": "close", "channel": 0 }
//!   ],
//!   "listenData": "HELLO"
//! }
//! ```
//!
//! `listenData` is either a string (sent as-is) or an array of bytes.

use std::path::Path;

use serde::Deserialize;

use iec_core::{AtnCmd, AtnCode, Attention, HeadlessBus, IecResult};

/// One attention event raised by the computer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "atn", rename_all = "lowercase")]
pub enum ScriptEvent {
    Open {
        channel: u8,
        #[serde(default)]
        text: String,
    },
    Talk {
        channel: u8,
    },
    Listen {
        channel: u8,
    },
    /// DATA with no data phase, e.g. a disk command.
    Command {
        channel: u8,
        text: String,
    },
    Close {
        channel: u8,
    },
    Unlisten,
    Untalk,
    /// Bus error during the attention handshake.
    Error,
}

impl ScriptEvent {
    fn into_attention(self) -> Attention {
        match self {
            ScriptEvent::Open { channel, text } => Attention::Cmd(AtnCmd::with_channel(
                AtnCode::Open,
                channel,
                text.into_bytes(),
            )),
            ScriptEvent::Talk { channel } => {
                Attention::CmdTalk(AtnCmd::with_channel(AtnCode::Data, channel, Vec::new()))
            }
            ScriptEvent::Listen { channel } => {
                Attention::CmdListen(AtnCmd::with_channel(AtnCode::Data, channel, Vec::new()))
            }
            ScriptEvent::Command { channel, text } => Attention::Cmd(AtnCmd::with_channel(
                AtnCode::Data,
                channel,
                text.into_bytes(),
            )),
            ScriptEvent::Close { channel } => {
                Attention::Cmd(AtnCmd::with_channel(AtnCode::Close, channel, Vec::new()))
            }
            ScriptEvent::Unlisten => {
                Attention::Cmd(AtnCmd::new(AtnCode::Unlisten as u8, Vec::new()))
            }
            ScriptEvent::Untalk => Attention::Cmd(AtnCmd::new(AtnCode::Untalk as u8, Vec::new())),
            ScriptEvent::Error => Attention::Error,
        }
    }
}

/// Bytes the computer sends during LISTEN.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListenData {
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for ListenData {
    fn default() -> Self {
        ListenData::Bytes(Vec::new())
    }
}

impl ListenData {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            ListenData::Text(text) => text.into_bytes(),
            ListenData::Bytes(bytes) => bytes,
        }
    }
}

/// A complete bus session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Overrides the configured device number when set.
    #[serde(default)]
    pub device_number: Option<u8>,
    pub events: Vec<ScriptEvent>,
    #[serde(default)]
    pub listen_data: ListenData,
}

impl Script {
    pub fn from_json_str(json: &str) -> IecResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> IecResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Build a bus that replays this session.
    pub fn into_bus(self, default_device: u8) -> HeadlessBus {
        let mut bus = HeadlessBus::new(self.device_number.unwrap_or(default_device));
        for event in self.events {
            bus.queue_attention(event.into_attention());
        }
        bus.queue_incoming(&self.listen_data.into_bytes(), true);
        bus
    }
}
