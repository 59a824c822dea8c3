//! Module configuration

use serde::{Deserialize, Serialize};
use storage::{param, SlotStore, StorageError};
use vehicle::{FEATURES_PERSISTED, FEATURE_CANWRITE};

/// Configuration file read when none is named
pub const DEFAULT_CONFIG_FILE: &str = "module.toml";

/// Environment variables `MODULE_<FIELD>` override the file
pub const ENV_PREFIX: &str = "MODULE";

/// Module configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Relay server host name or address
    pub server_host: String,
    pub server_port: u16,

    /// Seeds for empty parameter slots
    pub vehicle_id: String,
    pub server_password: String,
    pub module_password: String,
    /// Vehicle type code (`O2` for generic OBD-II)
    pub vehicle_type: String,
    /// `M` for miles, `K` for kilometers
    pub units: String,
    /// `P` turns on the paranoid layer
    pub paranoid: String,
    /// Allow poll requests on the bus
    pub can_write: bool,

    /// Parameter image to load at start and save on change
    pub eeprom_path: Option<String>,

    /// Seconds between change-gated report rounds
    pub report_interval_secs: u32,
    /// Same, while client apps are connected
    pub apps_report_interval_secs: u32,
    /// Seconds to wait before reconnecting
    pub reconnect_delay_secs: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 6867,
            vehicle_id: "DEMO".to_string(),
            server_password: String::new(),
            module_password: String::new(),
            vehicle_type: "O2".to_string(),
            units: "M".to_string(),
            paranoid: String::new(),
            can_write: false,
            eeprom_path: None,
            report_interval_secs: 60,
            apps_report_interval_secs: 10,
            reconnect_delay_secs: 5,
        }
    }
}

impl ModuleConfig {
    /// Load `path` (or `module.toml`) if present, then apply `MODULE_*`
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_FILE);
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// Relay server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Fill empty parameter slots. Values already in the store win.
    pub fn seed(&self, store: &mut SlotStore) -> Result<(), StorageError> {
        let seeds = [
            (param::VEHICLEID, self.vehicle_id.as_str()),
            (param::SERVERPASS, self.server_password.as_str()),
            (param::MODULEPASS, self.module_password.as_str()),
            (param::VEHICLETYPE, self.vehicle_type.as_str()),
            (param::MILESKM, self.units.as_str()),
            (param::PARANOID, self.paranoid.as_str()),
            (param::SERVERIP, self.server_host.as_str()),
        ];
        for (index, value) in seeds {
            if !value.is_empty() {
                store.seed(index, value)?;
            }
        }
        if self.can_write {
            store.seed(param::FEATURE_S + FEATURE_CANWRITE - FEATURES_PERSISTED, "1")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::ParameterStore;

    #[test]
    fn test_defaults() {
        let config = ModuleConfig::default();
        assert_eq!(config.server_port, 6867);
        assert_eq!(config.report_interval_secs, 60);
        assert_eq!(config.server_addr(), "127.0.0.1:6867");
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("module-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "server_host = \"relay.example.com\"\nvehicle_id = \"CAR1\"\nreport_interval_secs = 30\n",
        )
        .unwrap();

        let config = ModuleConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server_host, "relay.example.com");
        assert_eq!(config.vehicle_id, "CAR1");
        assert_eq!(config.report_interval_secs, 30);
        assert_eq!(config.server_port, 6867);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ModuleConfig::load(Some("/nonexistent/module.toml")).unwrap();
        assert_eq!(config.vehicle_type, "O2");
    }

    #[test]
    fn test_seed_keeps_stored_values() {
        let mut store = SlotStore::new();
        store.set(param::VEHICLEID, "STORED").unwrap();
        let config = ModuleConfig {
            server_password: "s3cret".to_string(),
            can_write: true,
            ..Default::default()
        };
        config.seed(&mut store).unwrap();

        assert_eq!(store.get(param::VEHICLEID), "STORED");
        assert_eq!(store.get(param::SERVERPASS), "s3cret");
        assert_eq!(store.get(param::VEHICLETYPE), "O2");
        assert_eq!(store.get(param::FEATURE_S + 7), "1");
    }
}
