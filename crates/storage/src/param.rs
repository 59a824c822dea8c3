//! Parameter slot assignments

/// Registered phone number (SMS commands)
pub const REGPHONE: usize = 0x00;
/// Module password (SMS authentication, paranoid digest key)
pub const MODULEPASS: usize = 0x01;
/// Distance units, `M` or `K`
pub const MILESKM: usize = 0x02;
/// Notification channels
pub const NOTIFIES: usize = 0x03;
/// Relay server address
pub const SERVERIP: usize = 0x04;
pub const GPRSAPN: usize = 0x05;
pub const GPRSUSER: usize = 0x06;
pub const GPRSPASS: usize = 0x07;
/// Vehicle id announced at registration
pub const VEHICLEID: usize = 0x08;
/// Shared secret with the relay server
pub const SERVERPASS: usize = 0x09;
/// Paranoid mode, enabled when the value starts with `P`
pub const PARANOID: usize = 0x0A;
/// First location group name
pub const S_GROUP1: usize = 0x0B;
/// Second location group name
pub const S_GROUP2: usize = 0x0C;
pub const GSMLOCK: usize = 0x0D;
/// Vehicle driver selection code
pub const VEHICLETYPE: usize = 0x0E;
pub const COOLDOWN: usize = 0x0F;
/// First of the ACC slots
pub const ACC_S: usize = 0x10;
pub const ACC_COUNT: usize = 4;
pub const GPRSDNS: usize = 0x16;
pub const TIMEZONE: usize = 0x17;
/// Slot of persisted feature 8; features 8..15 follow
pub const FEATURE_S: usize = 0x18;

/// Parameters below this index protect access and may not be blanked
pub const AUTH_PARAMS: usize = 2;

/// Remote parameter writes are limited to indices below this one
pub const WRITABLE_LIMIT: usize = FEATURE_S;

/// Location group name slots
pub const GROUPS: [usize; 2] = [S_GROUP1, S_GROUP2];
