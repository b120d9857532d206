//! Interface configuration.
//!
//! Loaded from JSON; every field has a default so a config file only needs
//! the values it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::SCRATCH_SIZE;
use crate::error::{IecError, IecResult};
use crate::pipeline::LISTING_ORIGIN;

/// Default serial speed. 57600 is steadier over bluetooth dongles.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Default host read timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Default bus device number.
pub const DEFAULT_DEVICE_NUMBER: u8 = 8;

/// Host link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkConfig {
    /// Serial port name (e.g. `/dev/ttyUSB0`).
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Read timeout bounding every wait on the host.
    pub timeout_ms: u64,
    /// Chunk size requested from the host when reading files.
    pub read_chunk: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            read_chunk: SCRATCH_SIZE,
        }
    }
}

impl LinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete interface configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub link: LinkConfig,
    pub device_number: u8,
    /// Load address of directory listings.
    pub listing_origin: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            device_number: DEFAULT_DEVICE_NUMBER,
            listing_origin: LISTING_ORIGIN,
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> IecResult<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> IecResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> IecResult<()> {
        if !(4..=30).contains(&self.device_number) {
            return Err(IecError::InvalidDevice(self.device_number));
        }
        if self.link.read_chunk == 0 || self.link.read_chunk > SCRATCH_SIZE {
            return Err(IecError::InvalidConfig(format!(
                "readChunk must be 1-{}, got {}",
                SCRATCH_SIZE, self.link.read_chunk
            )));
        }
        if self.link.timeout_ms == 0 {
            return Err(IecError::InvalidConfig(
                "timeoutMs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
