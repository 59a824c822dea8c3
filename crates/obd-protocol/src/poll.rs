//! Poll table definitions
//!
//! A vehicle driver supplies a static table of [`PollDescriptor`]s; the
//! poll sequencer walks it once per second.

use crate::error::ObdError;
use crate::frame::CanFrame;
use crate::mode;

/// Number of poll states (interval columns per descriptor)
pub const POLL_STATES: usize = 3;

/// Lowest identifier accepted for broadcast requests
pub const BROADCAST_RESPONSE_LOW: u16 = 0x7E8;

/// Highest identifier accepted for broadcast requests
pub const BROADCAST_RESPONSE_HIGH: u16 = 0x7EF;

/// Request service / poll type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PollType {
    /// Mode 01 current data, 8 bit PID, single frame
    Current = mode::CURRENT_DATA,
    /// Mode 02 freeze frame, 8 bit PID, single frame
    Freeze = mode::FREEZE_FRAME,
    /// Mode 09 vehicle information, 8 bit PID, multi frame
    Vehicle = mode::VEHICLE_INFO,
    /// UDS session control, single frame
    Session = mode::SESSION_CONTROL,
    /// Enhanced data by 8 bit PID, multi frame
    Group = mode::READ_BY_LOCAL_ID,
    /// Enhanced data by 16 bit PID, single or multi frame
    Extended = mode::READ_BY_ID,
}

impl PollType {
    /// Service byte sent in the request
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Service byte expected in a positive response
    pub fn response_code(self) -> u8 {
        self.code() + mode::POSITIVE_RESPONSE
    }

    /// Whether the PID is 16 bits wide
    pub fn has_wide_pid(self) -> bool {
        matches!(self, PollType::Extended)
    }

    /// Whether the response is expected as an ISO-TP multi frame message
    pub fn expects_multi_frame(self) -> bool {
        matches!(self, PollType::Vehicle | PollType::Group | PollType::Extended)
    }
}

impl TryFrom<u8> for PollType {
    type Error = ObdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            mode::CURRENT_DATA => Ok(PollType::Current),
            mode::FREEZE_FRAME => Ok(PollType::Freeze),
            mode::VEHICLE_INFO => Ok(PollType::Vehicle),
            mode::SESSION_CONTROL => Ok(PollType::Session),
            mode::READ_BY_LOCAL_ID => Ok(PollType::Group),
            mode::READ_BY_ID => Ok(PollType::Extended),
            other => Err(ObdError::UnknownPollType(other)),
        }
    }
}

/// One entry of a vehicle poll table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDescriptor {
    /// Identifier the request is sent to
    pub module_id: u16,
    /// Identifier the response comes from (`None` = broadcast range)
    pub response_id: Option<u16>,
    /// Request service
    pub poll_type: PollType,
    /// PID (8 or 16 bit depending on the poll type)
    pub pid: u16,
    /// Poll interval in seconds per poll state, 0 = never
    pub intervals: [u16; POLL_STATES],
}

impl PollDescriptor {
    /// Create a descriptor (usable in `static` tables)
    pub const fn new(
        module_id: u16,
        response_id: Option<u16>,
        poll_type: PollType,
        pid: u16,
        intervals: [u16; POLL_STATES],
    ) -> Self {
        Self {
            module_id,
            response_id,
            poll_type,
            pid,
            intervals,
        }
    }

    /// Interval for `state`, 0 for unknown states
    pub fn interval(&self, state: u8) -> u16 {
        self.intervals.get(usize::from(state)).copied().unwrap_or(0)
    }

    /// Inclusive identifier range a response may come from
    pub fn response_range(&self) -> (u16, u16) {
        match self.response_id {
            Some(id) => (id, id),
            None => (BROADCAST_RESPONSE_LOW, BROADCAST_RESPONSE_HIGH),
        }
    }

    /// Request frame for this descriptor
    pub fn request_frame(&self) -> CanFrame {
        let data = if self.poll_type.has_wide_pid() {
            let [hi, lo] = self.pid.to_be_bytes();
            [0x03, self.poll_type.code(), hi, lo, 0, 0, 0, 0]
        } else {
            [0x02, self.poll_type.code(), self.pid as u8, 0, 0, 0, 0, 0]
        };
        CanFrame::padded(self.module_id, data)
    }
}
