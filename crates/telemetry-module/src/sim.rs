//! Simulated engine ECU
//!
//! Answers the OBD-II requests the module transmits on a [`MockCanBus`]:
//! Mode 01 current data as single frames, the Mode 09 VIN as a
//! multi-frame response released after the flow control frame.

use obd_protocol::{mode, CanFrame, MockCanBus, Pid, RxChannel};
use std::collections::VecDeque;
use tracing::debug;

/// Response identifier of the simulated engine ECU
pub const ECU_RESPONSE_ID: u16 = 0x7E8;

/// Offset of encoded OBD-II temperatures
const TEMP_OFFSET: i16 = 40;

#[derive(Debug, Clone)]
pub struct EcuSimulator {
    pub rpm: u16,
    pub speed_kph: u8,
    pub fuel_percent: u8,
    pub coolant_c: i16,
    pub intake_c: i16,
    pub oil_c: i16,
    pub ambient_c: i16,
    pub vin: [u8; 17],
    outbox: VecDeque<CanFrame>,
    vin_waiting: bool,
}

impl Default for EcuSimulator {
    fn default() -> Self {
        Self {
            rpm: 0,
            speed_kph: 0,
            fuel_percent: 64,
            coolant_c: 21,
            intake_c: 19,
            oil_c: 22,
            ambient_c: 18,
            vin: *b"W0L0000433B541326",
            outbox: VecDeque::new(),
            vin_waiting: false,
        }
    }
}

impl EcuSimulator {
    /// Answer everything transmitted since the last step and deliver as
    /// many queued responses as the receive mailbox accepts.
    pub fn step(&mut self, bus: &mut MockCanBus) {
        for request in bus.take_sent() {
            self.answer(&request);
        }
        while let Some(&frame) = self.outbox.front() {
            if bus.inject(RxChannel::Primary, frame).is_err() {
                break;
            }
            self.outbox.pop_front();
        }
    }

    /// Responses not yet delivered
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    fn answer(&mut self, request: &CanFrame) {
        let data = request.data;
        if data[0] == 0x30 {
            if self.vin_waiting {
                self.vin_waiting = false;
                let vin = self.vin;
                for (seq, chunk) in (0x21u8..).zip(vin[3..].chunks(7)) {
                    let mut payload = [0u8; 8];
                    payload[0] = seq;
                    payload[1..=chunk.len()].copy_from_slice(chunk);
                    self.queue(&payload[..=chunk.len()]);
                }
            }
            return;
        }

        match data[1] {
            mode::CURRENT_DATA => {
                let Some(pid) = Pid::from_hex(data[2]) else {
                    debug!("ECU ignores PID {:#04X}", data[2]);
                    return;
                };
                let (a, b) = self.encode(pid);
                if pid.response_bytes() == 2 {
                    self.queue(&[0x04, 0x41, data[2], a, b]);
                } else {
                    self.queue(&[0x03, 0x41, data[2], a]);
                }
            }
            mode::VEHICLE_INFO if data[2] == 0x02 => {
                // 0x49 0x02, item count, 17 VIN bytes
                let [v0, v1, v2, ..] = self.vin;
                self.queue(&[0x10, 0x14, 0x49, 0x02, 0x01, v0, v1, v2]);
                self.vin_waiting = true;
            }
            other => debug!("ECU ignores mode {:#04X}", other),
        }
    }

    fn encode(&self, pid: Pid) -> (u8, u8) {
        let temp = |celsius: i16| (celsius + TEMP_OFFSET).clamp(0, 255) as u8;
        match pid {
            Pid::Rpm => {
                let raw = self.rpm.saturating_mul(4);
                ((raw >> 8) as u8, (raw & 0xFF) as u8)
            }
            Pid::Speed => (self.speed_kph, 0),
            Pid::FuelLevel | Pid::EngineLoad => {
                ((u16::from(self.fuel_percent) * 255 / 100) as u8, 0)
            }
            Pid::CoolantTemp => (temp(self.coolant_c), 0),
            Pid::IntakeTemp => (temp(self.intake_c), 0),
            Pid::OilTemp => (temp(self.oil_c), 0),
            Pid::AmbientTemp => (temp(self.ambient_c), 0),
        }
    }

    fn queue(&mut self, payload: &[u8]) {
        if let Ok(frame) = CanFrame::new(ECU_RESPONSE_ID, payload) {
            self.outbox.push_back(frame);
        }
    }
}
