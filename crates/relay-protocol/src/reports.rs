//! Report layouts
//!
//! Each renderer writes the body of one report category after the `MP-0 `
//! prefix. Distances go through the unit preference; raw GPS, TPMS and
//! temperature values are scaled here.

use std::fmt::{self, Write};
use storage::{param, ParameterStore};
use vehicle::{Units, VehicleContext, VehicleState, FEATURE_CANWRITE};

/// Raw GPS units per degree
const GPS_UNITS_PER_DEGREE: f64 = 2048.0 * 3600.0;

/// Raw TPMS reading per tenth of a psi
const TPMS_PRESSURE_SCALE: f64 = 0.2755;

/// Offset applied to raw TPMS temperatures
const TPMS_TEMP_OFFSET: i32 = 40;

/// Report categories with their own change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Stat,
    Gps,
    Tpms,
    Firmware,
    Environment,
    Capabilities,
    /// Location group, by index into the group parameters
    Group(usize),
}

impl Report {
    /// The burst sent when client apps connect
    pub const BURST: [Report; 6] = [
        Report::Stat,
        Report::Gps,
        Report::Tpms,
        Report::Firmware,
        Report::Environment,
        Report::Capabilities,
    ];

    /// Number of change detection slots
    pub const SLOTS: usize = 6 + param::GROUPS.len();

    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            Report::Stat => Some(0),
            Report::Gps => Some(1),
            Report::Tpms => Some(2),
            Report::Firmware => Some(3),
            Report::Environment => Some(4),
            Report::Capabilities => Some(5),
            Report::Group(group) if group < param::GROUPS.len() => Some(6 + group),
            Report::Group(_) => None,
        }
    }
}

/// What the renderers read from
pub struct ReportSource<'a> {
    pub ctx: &'a VehicleContext,
    pub store: &'a dyn ParameterStore,
    pub firmware: &'a str,
}

/// Render a report body. Returns `Ok(false)` when the category has nothing
/// to report.
pub fn render<W: Write>(out: &mut W, report: Report, src: &ReportSource<'_>) -> Result<bool, fmt::Error> {
    let state = &src.ctx.state;
    match report {
        Report::Stat => render_stat(out, state, src.ctx.units).map(|_| true),
        Report::Gps => render_gps(out, state).map(|_| true),
        Report::Tpms => render_tpms(out, state),
        Report::Firmware => {
            write!(
                out,
                "F{},{},{},{},{}",
                src.firmware,
                state.vin,
                state.signal_quality,
                src.ctx.features.get(FEATURE_CANWRITE),
                src.ctx.vehicle_type
            )?;
            Ok(true)
        }
        Report::Environment => render_environment(out, state, src.ctx.units).map(|_| true),
        Report::Capabilities => {
            write!(out, "V{}", src.ctx.capabilities)?;
            Ok(true)
        }
        Report::Group(group) => {
            let name = match param::GROUPS.get(group) {
                Some(&index) => src.store.get(index),
                None => "",
            };
            if name.is_empty() {
                return Ok(false);
            }
            write!(
                out,
                "g{},{},{},{},{},{},{},",
                name,
                state.soc,
                state.speed,
                state.direction,
                state.altitude,
                state.gps_lock,
                state.stale_gps
            )?;
            write_latlon(out, state.latitude)?;
            out.write_char(',')?;
            write_latlon(out, state.longitude)?;
            Ok(true)
        }
    }
}

fn render_stat<W: Write>(out: &mut W, state: &VehicleState, units: Units) -> fmt::Result {
    let ideal = units.from_miles(u32::from(state.ideal_range));
    let estimated = units.from_miles(u32::from(state.est_range));
    write!(
        out,
        "S{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        state.soc,
        units.code(),
        state.line_voltage,
        state.charge_current,
        state.charge_state_name(),
        state.charge_mode_name(),
        ideal,
        estimated,
        state.charge_limit,
        state.charge_duration,
        state.charge_b4,
        state.charge_kwh,
        state.charge_substate,
        state.charge_state,
        state.charge_mode,
        state.timer_mode,
        state.timer_start,
        state.stale_timer
    )
}

fn render_gps<W: Write>(out: &mut W, state: &VehicleState) -> fmt::Result {
    out.write_char('L')?;
    write_latlon(out, state.latitude)?;
    out.write_char(',')?;
    write_latlon(out, state.longitude)?;
    write!(
        out,
        ",{},{},{},{}",
        state.direction, state.altitude, state.gps_lock, state.stale_gps
    )
}

fn render_tpms<W: Write>(out: &mut W, state: &VehicleState) -> Result<bool, fmt::Error> {
    if state.tpms_temp.iter().all(|&t| t == 0) {
        return Ok(false);
    }
    out.write_char('W')?;
    for (&pressure, &temp) in state.tpms_pressure.iter().zip(state.tpms_temp.iter()) {
        if temp > 0 {
            let tenths = (f64::from(pressure) / TPMS_PRESSURE_SCALE) as i64;
            write!(
                out,
                "{}.{},{},",
                tenths / 10,
                tenths % 10,
                i32::from(temp) - TPMS_TEMP_OFFSET
            )?;
        } else {
            out.write_str("0,0,")?;
        }
    }
    write!(out, "{}", state.stale_tpms)?;
    Ok(true)
}

fn render_environment<W: Write>(out: &mut W, state: &VehicleState, units: Units) -> fmt::Result {
    let trip = units.from_miles(u32::from(state.trip));
    let odometer = units.from_miles(state.odometer);
    let park_time = if state.park_time != 0 {
        state.time.wrapping_sub(state.park_time)
    } else {
        0
    };
    write!(
        out,
        "D{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        state.doors1.bits(),
        state.doors2.bits(),
        state.lock_state,
        state.tpem,
        state.tmotor,
        state.tbattery,
        trip,
        odometer,
        state.speed,
        park_time,
        state.ambient_temp,
        state.doors3.bits(),
        state.stale_temps,
        state.stale_ambient,
        state.line_12v,
        state.doors4.bits()
    )
}

/// Status alert text: charge mode, charge state, ideal range and SOC
pub fn render_status_alert<W: Write>(out: &mut W, ctx: &VehicleContext) -> fmt::Result {
    let state = &ctx.state;
    let mode = match state.charge_mode {
        0 => "Standard",
        1 => "Storage",
        3 => "Range",
        4 => "Performance",
        _ => "",
    };
    let charge = match state.charge_state {
        1 => "Charging",
        2 => "Charging, Topping off",
        4 => "Charging Done",
        _ => "Charging Stopped",
    };
    let range = ctx.units.from_miles(u32::from(state.ideal_range));
    let unit = match ctx.units {
        Units::Miles => "mi",
        Units::Kilometers => "Km",
    };
    write!(
        out,
        "{} - {}\rIdeal Range: {} {} SOC: {}%",
        mode, charge, range, unit, state.soc
    )
}

fn write_latlon<W: Write>(out: &mut W, raw: i32) -> fmt::Result {
    write!(out, "{:.6}", f64::from(raw) / GPS_UNITS_PER_DEGREE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::SlotStore;
    use vehicle::{Doors1, Doors2};

    fn rendered(report: Report, ctx: &VehicleContext, store: &SlotStore) -> Option<String> {
        let src = ReportSource { ctx, store, firmware: "1.0.0" };
        let mut out = String::new();
        render(&mut out, report, &src).unwrap().then_some(out)
    }

    #[test]
    fn test_stat_layout() {
        let mut ctx = VehicleContext::default();
        ctx.state.soc = 42;
        ctx.state.ideal_range = 120;
        ctx.state.est_range = 100;
        let store = SlotStore::new();

        assert_eq!(
            rendered(Report::Stat, &ctx, &store).unwrap(),
            "S42,M,0,0,stopped,standard,120,100,0,0,0,0,0,0,0,0,0,-1"
        );
    }

    #[test]
    fn test_stat_in_kilometers() {
        let mut ctx = VehicleContext::default();
        ctx.units = Units::Kilometers;
        ctx.state.charge_state = 1;
        ctx.state.ideal_range = 100;
        let store = SlotStore::new();

        let text = rendered(Report::Stat, &ctx, &store).unwrap();
        assert!(text.starts_with("S0,K,0,0,charging,standard,160,0,"));
    }

    #[test]
    fn test_gps_scaling() {
        let mut ctx = VehicleContext::default();
        // 51.5 degrees north, 0.5 degrees west
        ctx.state.latitude = (51.5 * GPS_UNITS_PER_DEGREE) as i32;
        ctx.state.longitude = -(0.5 * GPS_UNITS_PER_DEGREE) as i32;
        ctx.state.direction = 90;
        ctx.state.gps_lock = 1;
        let store = SlotStore::new();

        assert_eq!(
            rendered(Report::Gps, &ctx, &store).unwrap(),
            "L51.500000,-0.500000,90,0,1,-1"
        );
    }

    #[test]
    fn test_tpms_skipped_without_temperatures() {
        let ctx = VehicleContext::default();
        assert_eq!(rendered(Report::Tpms, &ctx, &SlotStore::new()), None);
    }

    #[test]
    fn test_tpms_layout() {
        let mut ctx = VehicleContext::default();
        ctx.state.tpms_pressure = [90, 90, 0, 0];
        ctx.state.tpms_temp = [60, 61, 0, 0];
        ctx.state.stale_tpms = 1;

        assert_eq!(
            rendered(Report::Tpms, &ctx, &SlotStore::new()).unwrap(),
            "W32.6,20,32.6,21,0,0,0,0,1"
        );
    }

    #[test]
    fn test_environment_layout() {
        let mut ctx = VehicleContext::default();
        ctx.state.doors1 = Doors1::CAR_ON | Doors1::HANDBRAKE;
        ctx.state.doors2 = Doors2::LOCKED;
        ctx.state.trip = 10;
        ctx.state.odometer = 1000;
        ctx.state.time = 500;
        ctx.state.park_time = 200;
        ctx.state.ambient_temp = -3;
        ctx.units = Units::Kilometers;

        assert_eq!(
            rendered(Report::Environment, &ctx, &SlotStore::new()).unwrap(),
            "D192,8,0,0,0,0,16,1600,0,300,-3,0,-1,-1,0,0"
        );
    }

    #[test]
    fn test_group_requires_name() {
        let mut ctx = VehicleContext::default();
        ctx.state.soc = 80;
        let mut store = SlotStore::new();
        assert_eq!(rendered(Report::Group(0), &ctx, &store), None);

        store.set(param::S_GROUP1, "fleet").unwrap();
        assert_eq!(
            rendered(Report::Group(0), &ctx, &store).unwrap(),
            "gfleet,80,0,0,0,0,-1,0.000000,0.000000"
        );
        assert_eq!(rendered(Report::Group(5), &ctx, &store), None);
    }

    #[test]
    fn test_firmware_and_capabilities() {
        let mut ctx = VehicleContext::default();
        ctx.state.signal_quality = 17;
        ctx.vehicle_type.push_str("O2").unwrap();
        ctx.capabilities = "C1-6,C40-41";
        let store = SlotStore::new();

        assert_eq!(rendered(Report::Firmware, &ctx, &store).unwrap(), "F1.0.0,,17,0,O2");
        assert_eq!(rendered(Report::Capabilities, &ctx, &store).unwrap(), "VC1-6,C40-41");
    }

    #[test]
    fn test_status_alert_text() {
        let mut ctx = VehicleContext::default();
        ctx.state.charge_state = 2;
        ctx.state.charge_mode = 3;
        ctx.state.ideal_range = 150;
        ctx.state.soc = 95;

        let mut out = String::new();
        render_status_alert(&mut out, &ctx).unwrap();
        assert_eq!(out, "Range - Charging, Topping off\rIdeal Range: 150 mi SOC: 95%");

        ctx.units = Units::Kilometers;
        out.clear();
        render_status_alert(&mut out, &ctx).unwrap();
        assert_eq!(out, "Range - Charging, Topping off\rIdeal Range: 240 Km SOC: 95%");
    }
}
