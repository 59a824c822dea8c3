//! Vehicle driver interface
//!
//! Exactly one driver is active. Every hook has a no-op default so a driver
//! only implements what its vehicle needs.

use crate::context::VehicleContext;
use obd_protocol::CanFrame;
use obd_scheduler::PollReply;

/// Reply status codes of the command protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandStatus {
    Ok = 0,
    Error = 1,
    Unimplemented = 3,
}

impl CommandStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Reply to a command handled by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub status: CommandStatus,
    /// Optional payload after the status
    pub data: heapless::String<64>,
}

impl CommandReply {
    /// Status only reply
    pub fn status(status: CommandStatus) -> Self {
        Self {
            status,
            data: heapless::String::new(),
        }
    }

    /// Reply with a payload, truncated to capacity
    pub fn with_data(status: CommandStatus, data: &str) -> Self {
        let mut reply = Self::status(status);
        for c in data.chars() {
            if reply.data.push(c).is_err() {
                break;
            }
        }
        reply
    }
}

/// Inputs of a charge time estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeEstimateRequest {
    pub charge_mode: u8,
    /// Power available from the outlet (W)
    pub watts_available: i32,
    pub range_start: i32,
    pub range_target: i32,
    pub soc_target: i32,
    /// Battery capacity in Ah * 100
    pub cac100: i32,
    pub ambient: i8,
}

/// Result of a charge time estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeEstimate {
    pub minutes: i32,
    pub expected_range: i32,
}

/// Vehicle specific behaviour
pub trait VehicleDriver: Send {
    /// Short type code, reported to the server
    fn vehicle_type(&self) -> &'static str;

    /// Capability list for the `V` report
    fn capabilities(&self) -> &'static str {
        ""
    }

    /// Whether frames on the secondary channel should be delivered
    fn wants_secondary(&self) -> bool {
        false
    }

    fn init(&mut self, _ctx: &mut VehicleContext) {}

    /// Frame from the primary channel not consumed by the poller
    fn on_primary_frame(&mut self, _ctx: &mut VehicleContext, _frame: &CanFrame) {}

    fn on_secondary_frame(&mut self, _ctx: &mut VehicleContext, _frame: &CanFrame) {}

    /// Chunk of a response to one of the driver's poll requests
    fn on_poll_reply(&mut self, _ctx: &mut VehicleContext, _reply: &PollReply) {}

    fn ticker_1s(&mut self, _ctx: &mut VehicleContext) {}

    fn ticker_10s(&mut self, _ctx: &mut VehicleContext) {}

    fn ticker_60s(&mut self, _ctx: &mut VehicleContext) {}

    fn ticker_300s(&mut self, _ctx: &mut VehicleContext) {}

    fn ticker_600s(&mut self, _ctx: &mut VehicleContext) {}

    fn ticker_10th(&mut self, _ctx: &mut VehicleContext) {}

    fn idle_poll(&mut self, _ctx: &mut VehicleContext) {}

    /// Vehicle specific command. `None` falls through to the generic handlers.
    fn handle_command(
        &mut self,
        _ctx: &mut VehicleContext,
        _msg_mode: bool,
        _code: i32,
        _arg: &str,
    ) -> Option<CommandReply> {
        None
    }

    /// Text command received by SMS. Returns whether it was consumed.
    fn handle_sms(
        &mut self,
        _ctx: &mut VehicleContext,
        _pre: bool,
        _caller: &str,
        _command: &str,
        _arguments: &str,
    ) -> bool {
        false
    }

    fn minutes_to_charge(
        &self,
        _ctx: &VehicleContext,
        _request: &ChargeEstimateRequest,
    ) -> Option<ChargeEstimate> {
        None
    }
}

/// Driver used when no vehicle type is configured
#[derive(Debug, Default)]
pub struct NoneDriver;

impl VehicleDriver for NoneDriver {
    fn vehicle_type(&self) -> &'static str {
        ""
    }
}

/// Compiled-in vehicle drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VehicleType {
    #[default]
    None,
    /// Generic OBD-II
    Obdii,
}

impl VehicleType {
    /// Select the driver for a persisted type code
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("O2") {
            VehicleType::Obdii
        } else {
            VehicleType::None
        }
    }

    /// Instantiate the driver
    pub fn driver(self) -> Box<dyn VehicleDriver> {
        match self {
            VehicleType::None => Box::new(NoneDriver),
            VehicleType::Obdii => Box::new(crate::obdii::ObdiiDriver::default()),
        }
    }
}
