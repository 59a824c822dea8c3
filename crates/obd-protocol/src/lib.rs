//! OBD-II Protocol Implementation
//!
//! CAN frame records, OBD-II / UDS poll definitions, ISO-TP framing and the
//! controller traits the receive and poll paths are written against. A
//! simulated controller stands in for the hardware in tests and on hosts
//! without a CAN interface.

mod bus;
mod error;
mod frame;
mod pid;
mod poll;
mod protocol;

pub use bus::{wait_tx_ready, CanReceive, CanTransmit, MockCanBus, DEFAULT_MAILBOX_DEPTH};
pub use error::ObdError;
pub use frame::{CanFrame, RxChannel, MAX_STANDARD_ID};
pub use pid::{decode_current_data, Pid};
pub use poll::{PollDescriptor, PollType, BROADCAST_RESPONSE_HIGH, BROADCAST_RESPONSE_LOW, POLL_STATES};
pub use protocol::{flow_control_frame, IsoTpFrame};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// UDS diagnostic session control
    pub const SESSION_CONTROL: u8 = 0x10;
    /// Enhanced data by 8 bit local identifier
    pub const READ_BY_LOCAL_ID: u8 = 0x21;
    /// Enhanced data by 16 bit identifier
    pub const READ_BY_ID: u8 = 0x22;
    /// Offset added to the service id in a positive response
    pub const POSITIVE_RESPONSE: u8 = 0x40;
    /// Negative response service id
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}
