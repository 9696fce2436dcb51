//! error type for wirefire-types.

use thiserror::Error;

/// errors produced while parsing or validating core types.
#[derive(Debug, Error)]
pub enum Error {
    /// a key string did not carry the expected prefix or hex payload.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// configuration failed to load or validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
