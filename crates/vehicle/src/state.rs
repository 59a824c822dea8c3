//! Vehicle state snapshot
//!
//! Written by the active driver and the poll path, read by the report
//! renderer and the command handlers. Every field is a plain scalar.

use bitflags::bitflags;

bitflags! {
    /// Doors, charge port and drive state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Doors1: u8 {
        const LEFT_DOOR = 0x01;
        const RIGHT_DOOR = 0x02;
        const CHARGE_PORT = 0x04;
        const PILOT = 0x08;
        const CHARGING = 0x10;
        const HANDBRAKE = 0x40;
        const CAR_ON = 0x80;
    }
}

bitflags! {
    /// Locks, lights and body openings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Doors2: u8 {
        const LOCKED = 0x08;
        const VALET = 0x10;
        const HEADLIGHTS = 0x20;
        const HOOD = 0x40;
        const TRUNK = 0x80;
    }
}

bitflags! {
    /// Vehicle electronics state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Doors3: u8 {
        const AWAKE = 0x01;
        const COOLING_PUMP = 0x02;
    }
}

bitflags! {
    /// Alarm state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Doors4: u8 {
        const ALARM = 0x02;
    }
}

/// Staleness counter value for data never received
pub const STALE_NEVER: i8 = -1;

/// Staleness counter value for expired data
pub const STALE_EXPIRED: i8 = 0;

/// Distance units preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Miles,
    Kilometers,
}

impl Units {
    /// Parse the persisted preference (`K` selects kilometres)
    pub fn from_param(value: &str) -> Self {
        if value.starts_with('K') {
            Units::Kilometers
        } else {
            Units::Miles
        }
    }

    /// Single character code used in reports
    pub fn code(self) -> char {
        match self {
            Units::Miles => 'M',
            Units::Kilometers => 'K',
        }
    }

    /// Convert a distance in miles to these units
    pub fn from_miles(self, miles: u32) -> u32 {
        match self {
            Units::Miles => miles,
            Units::Kilometers => ((miles << 4) + 5) / 10,
        }
    }
}

/// Live vehicle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleState {
    /// State of charge (%)
    pub soc: u8,
    /// Ideal range (miles)
    pub ideal_range: u16,
    /// Estimated range (miles)
    pub est_range: u16,
    /// Charging line voltage
    pub line_voltage: u16,
    /// Charging current (A)
    pub charge_current: u8,
    /// Charge current limit (A)
    pub charge_limit: u8,
    /// Charge duration (minutes)
    pub charge_duration: u16,
    /// 1 charging, 2 top off, 4 done, 13 preparing, 15 heating, 21..25 stopped
    pub charge_state: u8,
    pub charge_substate: u8,
    /// 0 standard, 1 storage, 3 range, 4 performance
    pub charge_mode: u8,
    pub charge_b4: u8,
    /// Energy charged (kWh)
    pub charge_kwh: u8,
    /// 0 on plug-in, 1 timer
    pub timer_mode: i8,
    pub timer_start: u16,
    pub doors1: Doors1,
    pub doors2: Doors2,
    pub doors3: Doors3,
    pub doors4: Doors4,
    pub lock_state: u8,
    /// Speed in the configured units
    pub speed: u8,
    /// Seconds since start
    pub time: u32,
    /// Time the car was parked, 0 when driving
    pub park_time: u32,
    pub ambient_temp: i8,
    /// Power electronics temperature
    pub tpem: i8,
    pub tmotor: u8,
    pub tbattery: i8,
    /// Tyre pressures (raw, 0.2755 psi)
    pub tpms_pressure: [u8; 4],
    /// Tyre temperatures (raw, +40 °C)
    pub tpms_temp: [u8; 4],
    /// Trip meter (miles / 10)
    pub trip: u16,
    /// Odometer (miles / 10)
    pub odometer: u32,
    /// Latitude in 1/(2048*3600) degrees
    pub latitude: i32,
    /// Longitude in 1/(2048*3600) degrees
    pub longitude: i32,
    pub direction: u16,
    pub altitude: i16,
    pub gps_lock: u8,
    /// 12V line level
    pub line_12v: u16,
    /// Cellular signal quality
    pub signal_quality: u8,
    pub vin: heapless::String<17>,
    pub stale_ambient: i8,
    pub stale_temps: i8,
    pub stale_gps: i8,
    pub stale_tpms: i8,
    pub stale_timer: i8,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            soc: 0,
            ideal_range: 0,
            est_range: 0,
            line_voltage: 0,
            charge_current: 0,
            charge_limit: 0,
            charge_duration: 0,
            charge_state: 0,
            charge_substate: 0,
            charge_mode: 0,
            charge_b4: 0,
            charge_kwh: 0,
            timer_mode: 0,
            timer_start: 0,
            doors1: Doors1::empty(),
            doors2: Doors2::empty(),
            doors3: Doors3::empty(),
            doors4: Doors4::empty(),
            lock_state: 0,
            speed: 0,
            time: 0,
            park_time: 0,
            ambient_temp: 0,
            tpem: 0,
            tmotor: 0,
            tbattery: 0,
            tpms_pressure: [0; 4],
            tpms_temp: [0; 4],
            trip: 0,
            odometer: 0,
            latitude: 0,
            longitude: 0,
            direction: 0,
            altitude: 0,
            gps_lock: 0,
            line_12v: 0,
            signal_quality: 0,
            vin: heapless::String::new(),
            stale_ambient: STALE_NEVER,
            stale_temps: STALE_NEVER,
            stale_gps: STALE_NEVER,
            stale_tpms: STALE_NEVER,
            stale_timer: STALE_NEVER,
        }
    }
}

impl VehicleState {
    /// Count down the per-second staleness counters
    pub fn age(&mut self) {
        for counter in [
            &mut self.stale_ambient,
            &mut self.stale_temps,
            &mut self.stale_gps,
            &mut self.stale_tpms,
        ] {
            if *counter > 0 {
                *counter -= 1;
            }
        }
    }

    /// Human readable charge state
    pub fn charge_state_name(&self) -> &'static str {
        match self.charge_state {
            1 => "charging",
            2 => "topoff",
            4 => "done",
            13 => "prepare",
            15 => "heating",
            _ => "stopped",
        }
    }

    /// Human readable charge mode
    pub fn charge_mode_name(&self) -> &'static str {
        match self.charge_mode {
            0 => "standard",
            1 => "storage",
            3 => "range",
            4 => "performance",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_countdown() {
        let mut state = VehicleState::default();
        state.stale_gps = 2;
        state.stale_tpms = 0;
        state.age();
        assert_eq!(state.stale_gps, 1);
        assert_eq!(state.stale_tpms, STALE_EXPIRED);
        assert_eq!(state.stale_ambient, STALE_NEVER);
        state.age();
        state.age();
        assert_eq!(state.stale_gps, 0);
        // Timer staleness is owned by the driver
        assert_eq!(state.stale_timer, STALE_NEVER);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(Units::Miles.from_miles(120), 120);
        assert_eq!(Units::Kilometers.from_miles(120), 192);
        assert_eq!(Units::Kilometers.from_miles(1), 2);
        assert_eq!(Units::from_param("K"), Units::Kilometers);
        assert_eq!(Units::from_param(""), Units::Miles);
    }

    #[test]
    fn test_charge_names() {
        let mut state = VehicleState::default();
        state.charge_state = 13;
        state.charge_mode = 2;
        assert_eq!(state.charge_state_name(), "prepare");
        assert_eq!(state.charge_mode_name(), "");
        state.charge_state = 21;
        assert_eq!(state.charge_state_name(), "stopped");
    }
}
