//! Telemetry Module
//!
//! Host build of the module: configuration, the controller that ties the
//! vehicle layer to the relay engine, the relay server link and a simulated
//! ECU for running without a CAN interface.

pub mod config;
pub mod controller;
pub mod host;
pub mod link;
pub mod sim;

pub use config::{ModuleConfig, DEFAULT_CONFIG_FILE};
pub use controller::{Controller, ControllerError, CAPTURE_DEPTH};
pub use host::{LoggingModem, ModuleShell, OutboundBuffer};
pub use link::{serve, TICK};
pub use sim::{EcuSimulator, ECU_RESPONSE_ID};

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already installed");
    }
}
