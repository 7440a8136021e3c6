//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the module
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The port or socket failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No reply, or no further fragment, within the allowed time
    #[error("Timed out after {elapsed_ms}ms waiting for response to '{request_id}'")]
    Timeout {
        /// Request that was being waited on
        request_id: String,
        /// Time spent waiting
        elapsed_ms: u64,
    },

    /// No link to the module, or the link was closed
    #[error("Not connected to module")]
    NotConnected,

    /// A reply was missing an expected field
    #[error("Invalid response from module: {0}")]
    InvalidResponse(String),

    /// The module answered with a non-zero error code
    #[error("Module returned error code {code}: {message}")]
    ModuleError {
        /// Module error code
        code: i64,
        /// Module error text
        message: String,
    },

    /// A raw block did not match the length declared in its header
    #[error("Raw transfer length mismatch: header declares {declared} bytes, got {actual}")]
    RawLengthMismatch {
        /// Length in the header
        declared: usize,
        /// Length of the block
        actual: usize,
    },

    /// An incoming line grew past the size limit
    #[error("Buffer overflow: message exceeds {0} bytes")]
    BufferOverflow(usize),

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for both fixed-wait and streaming-wait timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout { .. })
    }
}
