//! Telemetry Module - Main Entry Point
//!
//! Runs the module against a simulated ECU and keeps a connection to the
//! relay server, reconnecting after the configured delay.

use anyhow::Context;
use obd_protocol::MockCanBus;
use std::path::Path;
use std::time::{Duration, Instant};
use storage::SlotStore;
use telemetry_module::{init_logging, serve, Controller, EcuSimulator, LoggingModem, ModuleConfig};
use tokio::net::TcpStream;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let path = std::env::args().nth(1);
    let config = ModuleConfig::load(path.as_deref()).context("Failed to load configuration")?;
    info!("=== Telemetry Module v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Relay server {}, vehicle {}", config.server_addr(), config.vehicle_id);

    let mut store = match &config.eeprom_path {
        Some(image) if Path::new(image).exists() => {
            SlotStore::load(image).context("Failed to load parameter image")?
        }
        _ => SlotStore::new(),
    };
    let boot = Instant::now();

    loop {
        let mut controller =
            Controller::new(&config, store, MockCanBus::new(), Box::new(LoggingModem))?;
        let mut ecu = EcuSimulator::default();
        run(&config, &mut controller, &mut ecu, boot).await;
        info!("Restarting module");
        store = controller.into_store();
    }
}

/// Keep the server link up until a reboot is requested
async fn run(
    config: &ModuleConfig,
    controller: &mut Controller<MockCanBus>,
    ecu: &mut EcuSimulator,
    boot: Instant,
) {
    let addr = config.server_addr();
    let delay = Duration::from_secs(config.reconnect_delay_secs);

    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!("Connected to {}", addr);
                let (reader, writer) = stream.into_split();
                // Free running timer, truncated like the hardware counter
                let timer = boot.elapsed().as_millis() as u16;
                if let Err(e) = serve(reader, writer, controller, ecu, timer).await {
                    warn!("Server link lost: {:#}", e);
                }
                controller.on_disconnected();
            }
            Err(e) => warn!("Connect to {} failed: {}", addr, e),
        }
        if controller.reboot_requested() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}
