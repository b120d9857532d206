//! Error types for the IEC device interface.

use thiserror::Error;

/// Status code queued for the command channel when the host gave no usable
/// answer.
pub const HOST_FAILURE_CODE: u8 = 97;

/// Errors that can occur while talking to the bus or the host link.
#[derive(Error, Debug)]
pub enum IecError {
    #[error("Lost sync waiting for '{sentinel}'")]
    SyncLost { sentinel: char },

    #[error("Expected {expected} host bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Unexpected response {byte:#04X} to '{verb}'")]
    UnexpectedResponse { verb: char, byte: u8 },

    #[error("Bus rejected byte after {sent} sent")]
    BusRejected { sent: u32 },

    #[error("Final chunk carried no data")]
    EmptyFinalChunk,

    #[error("Command too long: {0} bytes")]
    CommandTooLong(usize),

    #[error("Invalid device number: {0}")]
    InvalidDevice(u8),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IecError {
    /// True when the error means the link framing can no longer be trusted.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            IecError::SyncLost { .. }
                | IecError::ShortRead { .. }
                | IecError::UnexpectedResponse { .. }
                | IecError::EmptyFinalChunk
        )
    }
}

/// Result type for IEC interface operations.
pub type IecResult<T> = Result<T, IecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desync_classification() {
        assert!(IecError::SyncLost { sentinel: '>' }.is_desync());
        assert!(IecError::ShortRead {
            expected: 2,
            actual: 1
        }
        .is_desync());
        assert!(!IecError::BusRejected { sent: 3 }.is_desync());
        assert!(!IecError::CommandTooLong(300).is_desync());
    }

    #[test]
    fn test_messages() {
        let err = IecError::SyncLost { sentinel: ':' };
        assert_eq!(err.to_string(), "Lost sync waiting for ':'");
        let err = IecError::UnexpectedResponse {
            verb: 'S',
            byte: 0x41,
        };
        assert_eq!(err.to_string(), "Unexpected response 0x41 to 'S'");
    }
}
