//! OBD-II Mode 01 PID Definitions and Decoding
//!
//! The standard PIDs the generic OBD-II driver polls, with their decoding
//! formulas reduced to integer arithmetic.

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Intake air temperature (0x0F)
    IntakeTemp = 0x0F,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Ambient air temperature (0x46)
    AmbientTemp = 0x46,
    /// Engine oil temperature (0x5C)
    OilTemp = 0x5C,
}

impl Pid {
    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a PID by its hex value
    pub fn from_hex(pid: u8) -> Option<Self> {
        match pid {
            0x04 => Some(Pid::EngineLoad),
            0x05 => Some(Pid::CoolantTemp),
            0x0C => Some(Pid::Rpm),
            0x0D => Some(Pid::Speed),
            0x0F => Some(Pid::IntakeTemp),
            0x2F => Some(Pid::FuelLevel),
            0x46 => Some(Pid::AmbientTemp),
            0x5C => Some(Pid::OilTemp),
            _ => None,
        }
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm => 2,
            _ => 1,
        }
    }
}

/// Decode a Mode 01 response value.
///
/// Temperatures in °C, speed in km/h, load and fuel level in percent.
pub fn decode_current_data(pid: Pid, bytes: &[u8]) -> Option<i32> {
    if bytes.len() < pid.response_bytes() {
        return None;
    }
    let a = i32::from(bytes[0]);
    let value = match pid {
        // RPM: ((A*256)+B)/4
        Pid::Rpm => (a * 256 + i32::from(bytes[1])) / 4,
        // Speed: A (km/h)
        Pid::Speed => a,
        // Temperatures: A - 40 (°C)
        Pid::CoolantTemp | Pid::IntakeTemp | Pid::AmbientTemp | Pid::OilTemp => a - 40,
        // Load / fuel level: A * 100 / 255 (%)
        Pid::EngineLoad | Pid::FuelLevel => a * 100 / 255,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_decode() {
        // 1A 2B => ((0x1A * 256) + 0x2B) / 4 = 6699 / 4 = 1674
        assert_eq!(decode_current_data(Pid::Rpm, &[0x1A, 0x2B]), Some(1674));
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x73 = 115, so temp = 115 - 40 = 75°C
        assert_eq!(decode_current_data(Pid::CoolantTemp, &[0x73]), Some(75));
    }

    #[test]
    fn test_fuel_level_decode() {
        assert_eq!(decode_current_data(Pid::FuelLevel, &[0xFF]), Some(100));
        assert_eq!(decode_current_data(Pid::FuelLevel, &[0x80]), Some(50));
    }

    #[test]
    fn test_short_response_rejected() {
        assert_eq!(decode_current_data(Pid::Rpm, &[0x1A]), None);
        assert_eq!(decode_current_data(Pid::Speed, &[]), None);
    }

    #[test]
    fn test_hex_lookup() {
        assert_eq!(Pid::from_hex(0x46), Some(Pid::AmbientTemp));
        assert_eq!(Pid::from_hex(0x99), None);
        assert_eq!(Pid::OilTemp.as_hex(), 0x5C);
    }
}
