//! Core error type.

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the core model and codecs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Heartbeat or node payload could not be encoded
    #[error("encode error: {message}")]
    Encode {
        /// Encoder message
        message: String,
    },

    /// Heartbeat or node payload could not be decoded
    #[error("decode error: {message}")]
    Decode {
        /// Decoder message
        message: String,
    },

    /// An object path string is malformed
    #[error("invalid object path {path:?}: {reason}")]
    InvalidObjectPath {
        /// Offending input
        path: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl CoreError {
    /// Create an encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
