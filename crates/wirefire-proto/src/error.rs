//! error type for wirefire-proto.

use thiserror::Error;

/// errors from protocol encoding or the noise handshake.
#[derive(Debug, Error)]
pub enum Error {
    /// the noise state machine rejected an operation.
    #[error("noise protocol error: {0}")]
    Noise(#[from] snow::Error),

    /// a handshake message was malformed.
    #[error("malformed handshake message: {0}")]
    Handshake(String),

    /// json encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
