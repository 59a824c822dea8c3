//! Generic OBD-II driver
//!
//! Polls standard Mode 01 PIDs for temperatures, speed and fuel level (as
//! SOC) and reads the VIN once per hour with Mode 09.

use crate::context::{Notify, VehicleContext};
use crate::driver::VehicleDriver;
use crate::state::{Doors1, Doors3, Units, STALE_NEVER};
use obd_protocol::{decode_current_data, CanFrame, Pid, PollDescriptor, PollType};
use obd_scheduler::PollReply;
use tracing::{debug, info};

/// Functional broadcast request address
const BROADCAST: u16 = 0x7DF;

/// Seconds of bus silence before the car is considered asleep
const CANDATA_TIMEOUT: u8 = 60;

/// Seconds sensor data stays fresh
const FRESH: i8 = 60;

const VIN_LENGTH: usize = 17;

static POLL_TABLE: [PollDescriptor; 8] = [
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x46, [30, 30, 30]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x0D, [10, 10, 10]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x2F, [30, 30, 30]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x0C, [10, 10, 10]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x05, [10, 10, 10]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x0F, [10, 10, 10]),
    PollDescriptor::new(BROADCAST, None, PollType::Current, 0x5C, [10, 10, 10]),
    PollDescriptor::new(BROADCAST, None, PollType::Vehicle, 0x02, [3600, 3600, 3600]),
];

/// Generic OBD-II vehicle
#[derive(Debug, Default)]
pub struct ObdiiDriver {
    candata_timer: u8,
    vin: [u8; VIN_LENGTH],
}

impl ObdiiDriver {
    fn bus_seen(&mut self, ctx: &mut VehicleContext) {
        self.candata_timer = CANDATA_TIMEOUT;
        ctx.state.doors3.insert(Doors3::AWAKE);
    }

    fn current_data(&mut self, ctx: &mut VehicleContext, pid: Pid, data: &[u8]) {
        let Some(value) = decode_current_data(pid, data) else {
            return;
        };
        let state = &mut ctx.state;
        match pid {
            Pid::CoolantTemp => {
                state.stale_temps = FRESH;
                state.tbattery = clamp_i8(value);
            }
            Pid::IntakeTemp => {
                state.stale_temps = FRESH;
                state.tpem = clamp_i8(value);
            }
            Pid::OilTemp => {
                state.stale_temps = FRESH;
                state.tmotor = value.clamp(0, i32::from(u8::MAX)) as u8;
            }
            Pid::AmbientTemp => {
                state.stale_ambient = FRESH;
                state.ambient_temp = clamp_i8(value);
            }
            Pid::Speed => {
                state.speed = match ctx.units {
                    Units::Kilometers => value as u8,
                    Units::Miles => ((value * 1000 + 500) / 1609) as u8,
                };
            }
            Pid::FuelLevel => state.soc = value as u8,
            Pid::Rpm => {
                let parked = value == 0;
                let was_parked = state.park_time != 0;
                if parked {
                    state.doors1.insert(Doors1::HANDBRAKE);
                    state.doors1.remove(Doors1::CAR_ON);
                    if !was_parked {
                        // One second ago, so the report is non-zero
                        state.park_time = state.time.saturating_sub(1).max(1);
                        ctx.request_notification(Notify::ENVIRONMENT);
                    }
                } else {
                    state.doors1.remove(Doors1::HANDBRAKE);
                    state.doors1.insert(Doors1::CAR_ON);
                    if was_parked {
                        state.park_time = 0;
                        ctx.request_notification(Notify::ENVIRONMENT);
                    }
                }
            }
            Pid::EngineLoad => {}
        }
    }

    fn vin_chunk(&mut self, ctx: &mut VehicleContext, reply: &PollReply) {
        // Byte 0 of the response is the item count
        for (i, &b) in reply.data().iter().enumerate() {
            let position = usize::from(reply.offset) + i;
            if (1..=VIN_LENGTH).contains(&position) {
                self.vin[position - 1] = b;
            }
        }
        if !reply.is_complete() {
            return;
        }
        ctx.state.vin.clear();
        for &b in self.vin.iter().filter(|b| b.is_ascii_alphanumeric()) {
            let _ = ctx.state.vin.push(char::from(b));
        }
        info!("VIN {}", ctx.state.vin);
    }
}

fn clamp_i8(value: i32) -> i8 {
    value.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

impl VehicleDriver for ObdiiDriver {
    fn vehicle_type(&self) -> &'static str {
        "O2"
    }

    fn init(&mut self, ctx: &mut VehicleContext) {
        self.candata_timer = 0;
        ctx.state.stale_timer = STALE_NEVER;
        ctx.state.time = 0;
        ctx.poller.set_table(&POLL_TABLE);
    }

    fn on_primary_frame(&mut self, ctx: &mut VehicleContext, _frame: &CanFrame) {
        self.bus_seen(ctx);
    }

    fn on_poll_reply(&mut self, ctx: &mut VehicleContext, reply: &PollReply) {
        self.bus_seen(ctx);
        match reply.poll_type {
            PollType::Current => {
                if let Some(pid) = Pid::from_hex(reply.pid as u8) {
                    self.current_data(ctx, pid, reply.data());
                }
            }
            PollType::Vehicle if reply.pid == 0x02 => self.vin_chunk(ctx, reply),
            other => debug!("Unhandled poll reply {:?} {:#X}", other, reply.pid),
        }
    }

    fn ticker_1s(&mut self, ctx: &mut VehicleContext) {
        if self.candata_timer > 0 {
            self.candata_timer -= 1;
            if self.candata_timer == 0 {
                ctx.state.doors3.remove(Doors3::AWAKE);
            } else {
                ctx.state.doors3.insert(Doors3::AWAKE);
            }
        }
        ctx.state.time = ctx.state.time.wrapping_add(1);
    }
}
