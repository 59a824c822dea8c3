//! Module controller
//!
//! Owns the parameter store, the active vehicle, the CAN capture queue and
//! the relay engine, and drives them from the host's interrupt, idle and
//! ticker events.

use crate::config::ModuleConfig;
use crate::host::ModuleShell;
use obd_protocol::{CanReceive, CanTransmit};
use relay_crypto::TokenGenerator;
use relay_protocol::{CommandEffects, Modem, Relay, RelayEnv, RelayError, Transport};
use std::path::PathBuf;
use storage::{SlotStore, StorageError};
use thiserror::Error;
use tracing::{info, warn};
use vehicle::{FrameCapture, Vehicle};

/// Frames the capture queue holds between idle polls
pub const CAPTURE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ControllerError {
    /// Whether the server link has to be dropped
    pub fn drops_link(&self) -> bool {
        matches!(
            self,
            ControllerError::Relay(RelayError::BadPrefix | RelayError::Transport(_))
        )
    }
}

pub struct Controller<B> {
    store: SlotStore,
    vehicle: Vehicle,
    capture: FrameCapture,
    relay: Relay,
    bus: B,
    modem: Box<dyn Modem>,
    shell: ModuleShell,
    report_interval: u32,
    apps_report_interval: u32,
    report_countdown: u32,
    eeprom_path: Option<PathBuf>,
    reboot: bool,
}

impl<B: CanReceive + CanTransmit> Controller<B> {
    /// Seed empty parameters from `config` and bring up the configured
    /// vehicle driver.
    pub fn new(
        config: &ModuleConfig,
        mut store: SlotStore,
        bus: B,
        modem: Box<dyn Modem>,
    ) -> Result<Self, ControllerError> {
        config.seed(&mut store)?;
        let (capture, frames) = FrameCapture::new(CAPTURE_DEPTH);
        let vehicle = Vehicle::new(&store, frames);
        let report_interval = config.report_interval_secs.max(1);

        Ok(Self {
            store,
            vehicle,
            capture,
            relay: Relay::new(TokenGenerator::from_seed(0)),
            bus,
            modem,
            shell: ModuleShell,
            report_interval,
            apps_report_interval: config.apps_report_interval_secs.max(1),
            report_countdown: report_interval,
            eeprom_path: config.eeprom_path.as_ref().map(PathBuf::from),
            reboot: false,
        })
    }

    fn split<'a>(&'a mut self, transport: &'a mut dyn Transport) -> (&'a mut Relay, RelayEnv<'a>) {
        let env = RelayEnv {
            vehicle: &mut self.vehicle,
            store: &mut self.store,
            transport,
            modem: self.modem.as_mut(),
            text: &mut self.shell,
        };
        (&mut self.relay, env)
    }

    /// Receive interrupt: copy frames out of the controller mailboxes
    pub fn on_can_interrupt(&mut self) -> usize {
        self.capture.service(&mut self.bus)
    }

    /// Main loop idle: hand captured frames to the vehicle
    pub fn idle_poll(&mut self) -> usize {
        self.vehicle.idle_poll(&mut self.bus)
    }

    pub fn ticker_10th(&mut self) {
        self.vehicle.ticker_10th();
    }

    /// Once per second: vehicle housekeeping, pending notifications, the
    /// periodic report round and location streaming.
    pub fn ticker_1s(&mut self, transport: &mut dyn Transport) -> Result<(), ControllerError> {
        self.vehicle.ticker_1s(&mut self.bus);

        let interval = if self.relay.apps_connected() {
            self.apps_report_interval
        } else {
            self.report_interval
        };
        self.report_countdown = self.report_countdown.saturating_sub(1).min(interval);
        let due = self.report_countdown == 0;
        if due {
            self.report_countdown = interval;
        }

        let (relay, mut env) = self.split(transport);
        relay.send_notifications(&mut env)?;
        if due {
            relay.send_reports(&mut env)?;
        }
        relay.stream_location(&mut env)?;
        self.persist()
    }

    /// The server link is up: send the registration line
    pub fn on_connected(&mut self, transport: &mut dyn Transport, timer: u16) -> Result<(), ControllerError> {
        let tokens = TokenGenerator::from_entropy_sources(timer, &self.capture.recent_payload());
        self.relay.register(tokens, &self.store, transport)?;
        Ok(())
    }

    /// One line from the server
    pub fn on_server_line(&mut self, line: &str, transport: &mut dyn Transport) -> Result<(), ControllerError> {
        let was_authenticated = self.relay.is_authenticated();
        let (relay, mut env) = self.split(transport);
        let effects = match relay.on_line(line, &mut env) {
            Ok(effects) => effects,
            Err(RelayError::BadPrefix) => {
                warn!("Undecodable message from server, dropping link");
                self.relay.on_disconnected();
                return Err(RelayError::BadPrefix.into());
            }
            Err(e) => return Err(e.into()),
        };

        if !was_authenticated && self.relay.is_authenticated() {
            info!("Relay session established");
            self.report_countdown = 0;
        }
        if effects.contains(CommandEffects::REBOOT) {
            info!("Reboot requested");
            self.reboot = true;
        }
        self.persist()
    }

    pub fn on_disconnected(&mut self) {
        self.relay.on_disconnected();
    }

    /// An SMS arrived on the modem
    pub fn forward_sms(&mut self, caller: &str, text: &str, transport: &mut dyn Transport) -> Result<(), ControllerError> {
        self.relay.forward_sms(caller, text, transport)?;
        Ok(())
    }

    /// The modem delivered a USSD result
    pub fn ussd_result(&mut self, text: &str, transport: &mut dyn Transport) -> Result<(), ControllerError> {
        self.relay.ussd_result(text, transport)?;
        Ok(())
    }

    pub fn send_alert(&mut self, text: &str, transport: &mut dyn Transport) -> Result<(), ControllerError> {
        self.relay.send_alert(text, transport)?;
        Ok(())
    }

    fn persist(&mut self) -> Result<(), ControllerError> {
        if let Some(path) = &self.eeprom_path {
            if self.store.is_dirty() {
                self.store.save(path)?;
            }
        }
        Ok(())
    }

    pub fn reboot_requested(&self) -> bool {
        self.reboot
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    /// Give up the parameters, for a restart
    pub fn into_store(self) -> SlotStore {
        self.store
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
