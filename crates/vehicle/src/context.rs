//! Shared state handed to the active driver

use crate::features::Features;
use crate::state::{Units, VehicleState};
use bitflags::bitflags;
use obd_scheduler::PollSequencer;

bitflags! {
    /// Notifications waiting to be sent to the server
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Notify: u8 {
        /// Status alert (`PA`)
        const STATUS = 0x01;
        /// Environment report (`D`)
        const ENVIRONMENT = 0x02;
    }
}

/// Everything a driver may read or update
#[derive(Debug, Default)]
pub struct VehicleContext {
    pub state: VehicleState,
    pub features: Features,
    pub poller: PollSequencer,
    pub units: Units,
    /// Vehicle type code reported in the firmware report
    pub vehicle_type: heapless::String<4>,
    /// Capability string reported in the `V` report
    pub capabilities: &'static str,
    notify: Notify,
}

impl VehicleContext {
    /// Ask for a notification to be sent
    pub fn request_notification(&mut self, notify: Notify) {
        self.notify |= notify;
    }

    /// Pending notifications, clearing them
    pub fn take_notifications(&mut self) -> Notify {
        std::mem::take(&mut self.notify)
    }

    /// Pending notifications
    pub fn notifications(&self) -> Notify {
        self.notify
    }
}
