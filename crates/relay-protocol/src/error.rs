//! Relay protocol error types

use relay_crypto::CryptoError;
use thiserror::Error;

/// Handshake and session cipher errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Welcome received without a registration in progress
    #[error("No registration in progress")]
    NotRegistered,

    /// Welcome line is not `<token> <digest>`
    #[error("Malformed server welcome")]
    Malformed,

    /// Server echoed our own token
    #[error("Server token replays the client token")]
    Replay,

    /// Server digest does not match the shared secret
    #[error("Server digest mismatch")]
    DigestMismatch,

    /// Encrypted traffic before authentication
    #[error("Session not authenticated")]
    NotAuthenticated,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors on the message path
#[derive(Debug, Error)]
pub enum RelayError {
    /// Rendered or received text exceeds the scratch capacity
    #[error("Message exceeds {0} bytes")]
    Overflow(usize),

    /// Decoded text lacks the `MP-0 ` prefix; the connection must be dropped
    #[error("Inbound message without MP-0 prefix")]
    BadPrefix,

    /// Decoded text is not valid
    #[error("Malformed inbound message")]
    Malformed,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<CryptoError> for RelayError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BufferTooSmall { needed, .. } => RelayError::Overflow(needed),
            other => RelayError::Session(SessionError::Crypto(other)),
        }
    }
}

/// Command failures, rendered into the reply status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid syntax")]
    InvalidSyntax,

    #[error("Parameter out of range")]
    OutOfRange,

    #[error("{0}")]
    Failed(String),

    #[error("Unimplemented")]
    Unimplemented,
}
