//! CAN / OBD-II Error Types

use crate::frame::RxChannel;
use thiserror::Error;

/// Errors that can occur on the CAN and poll paths
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObdError {
    /// Identifier does not fit the 11 bit standard format
    #[error("CAN identifier {0:#05X} exceeds 11 bits")]
    InvalidIdentifier(u16),

    /// More than 8 payload bytes
    #[error("CAN payload of {0} bytes exceeds 8")]
    PayloadTooLong(usize),

    /// Receive mailbox was full when a frame arrived
    #[error("Receive overflow on {0:?} channel")]
    ReceiveOverflow(RxChannel),

    /// Receiver refuses frames until the overflow condition is cleared
    #[error("CAN receiver locked by uncleared overflow")]
    BusLocked,

    /// Controller rejected a transmit request
    #[error("CAN transmit failed: {0}")]
    TransmitFailed(String),

    /// Poll type byte not recognised
    #[error("Unknown poll type {0:#04X}")]
    UnknownPollType(u8),
}
