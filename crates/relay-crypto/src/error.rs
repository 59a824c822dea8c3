//! Crypto Error Types

use thiserror::Error;

/// Errors raised by the relay crypto primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// RC4 needs at least one key byte
    #[error("RC4 key must not be empty")]
    EmptyKey,

    /// Output buffer cannot hold the result
    #[error("Output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Input is not valid base64
    #[error("Invalid base64 input")]
    InvalidBase64,

    /// Supplied digest does not match the computed one
    #[error("Digest mismatch")]
    DigestMismatch,
}
