//! Active vehicle: driver selection, frame routing and tickers

use crate::capture::FrameReceiver;
use crate::context::{Notify, VehicleContext};
use crate::driver::{ChargeEstimate, ChargeEstimateRequest, CommandReply, VehicleDriver, VehicleType};
use crate::state::Units;
use obd_protocol::{CanTransmit, RxChannel};
use obd_scheduler::PollDisposition;
use storage::{param, ParameterStore};
use tracing::{debug, info, warn};

/// The granular ticker wraps here
const GRANULAR_WRAP: u16 = 600;

/// SOC points above the threshold before the alert re-arms
const MIN_SOC_HYSTERESIS: i32 = 2;

/// The selected driver plus the state it works on
pub struct Vehicle {
    kind: VehicleType,
    driver: Box<dyn VehicleDriver>,
    ctx: VehicleContext,
    frames: FrameReceiver,
    granular_tick: u16,
    min_soc_notified: bool,
    overflows: u32,
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("kind", &self.kind)
            .field("vehicle_type", &self.ctx.vehicle_type)
            .field("granular_tick", &self.granular_tick)
            .finish()
    }
}

impl Vehicle {
    /// Select and initialise the driver named by the vehicle type parameter
    pub fn new<S: ParameterStore + ?Sized>(store: &S, frames: FrameReceiver) -> Self {
        let kind = VehicleType::from_code(store.get(param::VEHICLETYPE));
        Self::build(kind, kind.driver(), store, frames)
    }

    /// Use a specific driver instance instead of the configured one
    pub fn with_driver<S: ParameterStore + ?Sized>(
        driver: Box<dyn VehicleDriver>,
        store: &S,
        frames: FrameReceiver,
    ) -> Self {
        Self::build(VehicleType::None, driver, store, frames)
    }

    fn build<S: ParameterStore + ?Sized>(
        kind: VehicleType,
        driver: Box<dyn VehicleDriver>,
        store: &S,
        frames: FrameReceiver,
    ) -> Self {
        let mut vehicle = Self {
            kind,
            driver,
            ctx: VehicleContext::default(),
            frames,
            granular_tick: 0,
            min_soc_notified: false,
            overflows: 0,
        };
        vehicle.ctx.features.load(store);
        vehicle.install(store);
        vehicle
    }

    /// Re-read the vehicle type and units and restart the driver
    pub fn reinitialise<S: ParameterStore + ?Sized>(&mut self, store: &S) {
        let kind = VehicleType::from_code(store.get(param::VEHICLETYPE));
        if kind != self.kind {
            self.kind = kind;
            self.driver = kind.driver();
        }
        self.install(store);
    }

    fn install<S: ParameterStore + ?Sized>(&mut self, store: &S) {
        self.ctx.units = Units::from_param(store.get(param::MILESKM));
        self.ctx.poller.clear_table();
        self.ctx.vehicle_type.clear();
        let code = self.driver.vehicle_type();
        for c in code.chars() {
            if self.ctx.vehicle_type.push(c).is_err() {
                warn!(
                    "Vehicle type '{}' longer than {} bytes, reporting '{}'",
                    code,
                    self.ctx.vehicle_type.capacity(),
                    self.ctx.vehicle_type
                );
                break;
            }
        }
        self.ctx.capabilities = self.driver.capabilities();
        self.driver.init(&mut self.ctx);
        self.frames.set_secondary(self.driver.wants_secondary());
        info!(
            "Vehicle driver {:?} initialised (type '{}', CAN {})",
            self.kind,
            self.ctx.vehicle_type,
            if self.ctx.features.can_write() { "normal" } else { "listen only" }
        );
    }

    pub fn kind(&self) -> VehicleType {
        self.kind
    }

    pub fn context(&self) -> &VehicleContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut VehicleContext {
        &mut self.ctx
    }

    /// Receive overflows cleared so far
    pub fn overflow_count(&self) -> u32 {
        self.overflows
    }

    /// Route captured frames to the poller and the driver, then give the
    /// driver its idle hook. Returns the number of frames handled.
    pub fn idle_poll<B: CanTransmit + ?Sized>(&mut self, bus: &mut B) -> usize {
        let mut handled = 0;
        while let Some(captured) = self.frames.pop() {
            handled += 1;
            match captured.channel {
                RxChannel::Primary => match self.ctx.poller.on_frame(&captured.frame, bus) {
                    PollDisposition::Ignored => {
                        self.driver.on_primary_frame(&mut self.ctx, &captured.frame)
                    }
                    PollDisposition::Reply(reply) => self.driver.on_poll_reply(&mut self.ctx, &reply),
                    PollDisposition::Dropped => {}
                },
                RxChannel::Secondary => {
                    self.ctx.poller.note_bus_activity();
                    self.driver.on_secondary_frame(&mut self.ctx, &captured.frame);
                }
            }
        }
        self.driver.idle_poll(&mut self.ctx);
        handled
    }

    /// Once per second housekeeping
    pub fn ticker_1s<B: CanTransmit + ?Sized>(&mut self, bus: &mut B) {
        if bus.rx_overflow() {
            bus.clear_rx_overflow();
            self.overflows = self.overflows.wrapping_add(1);
            debug!("CAN receive overflow cleared");
        }

        self.granular_tick += 1;
        self.ctx.state.age();

        let poller = &mut self.ctx.poller;
        if poller.has_table() && self.ctx.features.can_write() && poller.bus_active() {
            if let Err(e) = poller.tick(bus) {
                warn!("Poll request failed: {}", e);
            }
        }

        self.driver.ticker_1s(&mut self.ctx);

        let tick = self.granular_tick;
        if tick % 10 == 0 {
            self.driver.ticker_10s(&mut self.ctx);
        }
        if tick % 60 == 0 {
            self.check_min_soc();
            self.driver.ticker_60s(&mut self.ctx);
        }
        if tick % 300 == 0 {
            self.driver.ticker_300s(&mut self.ctx);
        }
        if tick % GRANULAR_WRAP == 0 {
            self.driver.ticker_600s(&mut self.ctx);
            self.granular_tick = 0;
        }
    }

    pub fn ticker_10th(&mut self) {
        self.driver.ticker_10th(&mut self.ctx);
    }

    fn check_min_soc(&mut self) {
        let min_soc = self.ctx.features.min_soc();
        let soc = i32::from(self.ctx.state.soc);
        if !self.min_soc_notified && soc < min_soc {
            info!("SOC {}% below minimum {}%", soc, min_soc);
            self.ctx.request_notification(Notify::STATUS);
            self.min_soc_notified = true;
        } else if self.min_soc_notified && soc > min_soc + MIN_SOC_HYSTERESIS {
            self.min_soc_notified = false;
        }
    }

    /// Offer a command to the driver first
    pub fn handle_command(&mut self, msg_mode: bool, code: i32, arg: &str) -> Option<CommandReply> {
        self.driver.handle_command(&mut self.ctx, msg_mode, code, arg)
    }

    pub fn handle_sms(&mut self, pre: bool, caller: &str, command: &str, arguments: &str) -> bool {
        self.driver
            .handle_sms(&mut self.ctx, pre, caller, command, arguments)
    }

    pub fn minutes_to_charge(&self, request: &ChargeEstimateRequest) -> Option<ChargeEstimate> {
        self.driver.minutes_to_charge(&self.ctx, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameCapture;
    use crate::driver::CommandStatus;
    use crate::features::{FEATURE_CANWRITE, FEATURE_MINSOC};
    use obd_protocol::{CanFrame, MockCanBus};
    use std::sync::{Arc, Mutex};
    use storage::SlotStore;

    #[derive(Debug, Default)]
    struct Log {
        frames: Vec<u16>,
        secondary: Vec<u16>,
        ticks_600: u32,
        tenths: u32,
    }

    struct RecordingDriver {
        log: Arc<Mutex<Log>>,
    }

    impl VehicleDriver for RecordingDriver {
        fn vehicle_type(&self) -> &'static str {
            "RD"
        }

        fn wants_secondary(&self) -> bool {
            true
        }

        fn on_primary_frame(&mut self, _ctx: &mut VehicleContext, frame: &CanFrame) {
            self.log.lock().unwrap().frames.push(frame.id);
        }

        fn on_secondary_frame(&mut self, _ctx: &mut VehicleContext, frame: &CanFrame) {
            self.log.lock().unwrap().secondary.push(frame.id);
        }

        fn ticker_600s(&mut self, _ctx: &mut VehicleContext) {
            self.log.lock().unwrap().ticks_600 += 1;
        }

        fn ticker_10th(&mut self, _ctx: &mut VehicleContext) {
            self.log.lock().unwrap().tenths += 1;
        }

        fn handle_command(
            &mut self,
            _ctx: &mut VehicleContext,
            _msg_mode: bool,
            code: i32,
            _arg: &str,
        ) -> Option<CommandReply> {
            (code == 200).then(|| CommandReply::with_data(CommandStatus::Ok, "driver"))
        }
    }

    fn recording(store: &SlotStore, capacity: usize) -> (Vehicle, FrameCapture, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let (capture, frames) = FrameCapture::new(capacity);
        let driver = RecordingDriver {
            log: Arc::clone(&log),
        };
        (Vehicle::with_driver(Box::new(driver), store, frames), capture, log)
    }

    #[test]
    fn test_overflow_cleared_without_losing_frames() {
        let store = SlotStore::new();
        let (mut vehicle, mut capture, log) = recording(&store, 4);
        let mut bus = MockCanBus::new();

        let frames: Vec<CanFrame> = (0..12u16)
            .map(|i| CanFrame::new(0x100 + i, &[i as u8]).unwrap())
            .collect();
        let mut next = 0;
        let mut rounds = 0;
        let mut saw_overflow = false;
        while next < frames.len() {
            // Bursts of three overrun the two-deep mailbox; the sender retries
            for _ in 0..3 {
                if next < frames.len() && bus.inject(RxChannel::Primary, frames[next]).is_ok() {
                    next += 1;
                }
            }
            saw_overflow |= bus.rx_overflow();
            capture.service(&mut bus);
            if rounds % 2 == 1 {
                vehicle.idle_poll(&mut bus);
            }
            vehicle.ticker_1s(&mut bus);
            assert!(!bus.rx_overflow());
            rounds += 1;
            assert!(rounds < 100);
        }
        capture.service(&mut bus);
        vehicle.idle_poll(&mut bus);

        assert!(saw_overflow);
        assert!(vehicle.overflow_count() > 0);
        let expected: Vec<u16> = (0x100..0x10C).collect();
        assert_eq!(log.lock().unwrap().frames, expected);
    }

    #[test]
    fn test_secondary_frames_reach_interested_driver() {
        let store = SlotStore::new();
        let (mut vehicle, mut capture, log) = recording(&store, 8);
        let mut bus = MockCanBus::new();
        bus.inject(RxChannel::Secondary, CanFrame::new(0x400, &[1]).unwrap()).unwrap();
        capture.service(&mut bus);
        assert_eq!(vehicle.idle_poll(&mut bus), 1);
        assert_eq!(log.lock().unwrap().secondary, vec![0x400]);
    }

    #[test]
    fn test_granular_tick_wraps() {
        let store = SlotStore::new();
        let (mut vehicle, _capture, log) = recording(&store, 4);
        let mut bus = MockCanBus::new();
        for _ in 0..1200 {
            vehicle.ticker_1s(&mut bus);
        }
        vehicle.ticker_10th();
        let log = log.lock().unwrap();
        assert_eq!(log.ticks_600, 2);
        assert_eq!(log.tenths, 1);
        assert_eq!(vehicle.granular_tick, 0);
    }

    #[test]
    fn test_min_soc_alert_with_hysteresis() {
        let mut store = SlotStore::new();
        let (_capture, frames) = FrameCapture::new(4);
        let mut vehicle = Vehicle::new(&store, frames);
        vehicle
            .context_mut()
            .features
            .set(FEATURE_MINSOC, 20, &mut store)
            .unwrap();
        let mut bus = MockCanBus::new();

        vehicle.context_mut().state.soc = 15;
        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        assert_eq!(vehicle.context_mut().take_notifications(), Notify::STATUS);

        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        assert!(vehicle.context().notifications().is_empty());

        // 22% is not enough to re-arm, 23% is
        vehicle.context_mut().state.soc = 22;
        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        vehicle.context_mut().state.soc = 10;
        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        assert!(vehicle.context().notifications().is_empty());

        vehicle.context_mut().state.soc = 23;
        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        vehicle.context_mut().state.soc = 10;
        for _ in 0..60 {
            vehicle.ticker_1s(&mut bus);
        }
        assert_eq!(vehicle.context_mut().take_notifications(), Notify::STATUS);
    }

    #[test]
    fn test_listen_only_until_can_write() {
        let mut store = SlotStore::new();
        store.set(param::VEHICLETYPE, "O2").unwrap();
        let (_capture, frames) = FrameCapture::new(4);
        let mut vehicle = Vehicle::new(&store, frames);
        assert_eq!(vehicle.kind(), VehicleType::Obdii);
        assert_eq!(vehicle.context().vehicle_type.as_str(), "O2");

        let mut bus = MockCanBus::new();
        vehicle.ticker_1s(&mut bus);
        assert!(bus.sent().is_empty());

        vehicle
            .context_mut()
            .features
            .set(FEATURE_CANWRITE, 1, &mut store)
            .unwrap();
        vehicle.reinitialise(&store);
        vehicle.ticker_1s(&mut bus);
        assert_eq!(bus.sent().len(), 1);
        assert_eq!(bus.sent()[0].data[..3], [0x02, 0x01, 0x46]);
    }

    #[test]
    fn test_units_follow_parameter() {
        let mut store = SlotStore::new();
        let (_capture, frames) = FrameCapture::new(4);
        let mut vehicle = Vehicle::new(&store, frames);
        assert_eq!(vehicle.context().units, Units::Miles);
        store.set(param::MILESKM, "K").unwrap();
        vehicle.reinitialise(&store);
        assert_eq!(vehicle.context().units, Units::Kilometers);
    }

    struct VerboseDriver;

    impl VehicleDriver for VerboseDriver {
        fn vehicle_type(&self) -> &'static str {
            "LONGCODE"
        }
    }

    #[test]
    fn test_long_type_code_keeps_prefix() {
        let store = SlotStore::new();
        let (_capture, frames) = FrameCapture::new(4);
        let vehicle = Vehicle::with_driver(Box::new(VerboseDriver), &store, frames);
        assert_eq!(vehicle.context().vehicle_type.as_str(), "LONG");
    }

    #[test]
    fn test_driver_sees_commands_first() {
        let store = SlotStore::new();
        let (mut vehicle, _capture, _log) = recording(&store, 4);
        let reply = vehicle.handle_command(true, 200, "").unwrap();
        assert_eq!(reply.data.as_str(), "driver");
        assert!(vehicle.handle_command(true, 1, "").is_none());
    }
}
