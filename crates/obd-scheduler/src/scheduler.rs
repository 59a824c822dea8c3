//! Poll Sequencer Implementation

use obd_protocol::{
    flow_control_frame, mode, wait_tx_ready, CanFrame, CanTransmit, IsoTpFrame, ObdError,
    PollDescriptor, PollType,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The poll ticker counts seconds modulo this value
pub const TICKER_WRAP: u16 = 3600;

/// Ticks a request may stay unanswered before the sequencer moves on
pub const IN_FLIGHT_TIMEOUT_TICKS: u8 = 3;

/// Ticks without any received frame before polling pauses
pub const BUS_ACTIVE_TICKS: u8 = 60;

/// Errors raised while issuing poll requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// The controller refused the request frame
    #[error("Poll request transmit failed: {0}")]
    Transmit(#[from] ObdError),
}

/// Timing knobs of the poll sequencer
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Ticks to wait for a response (default: 3)
    pub in_flight_timeout: u8,
    /// Ticks of bus silence tolerated before polling pauses (default: 60)
    pub bus_active_ticks: u8,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            in_flight_timeout: IN_FLIGHT_TIMEOUT_TICKS,
            bus_active_ticks: BUS_ACTIVE_TICKS,
        }
    }
}

/// One chunk of a poll response, handed to the vehicle driver as it arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReply {
    /// Identifier the response came from
    pub module_id: u16,
    /// Request service
    pub poll_type: PollType,
    /// Requested PID
    pub pid: u16,
    /// Chunk number within the response, 0 for the first
    pub frame_no: u8,
    /// Bytes of response data delivered before this chunk
    pub offset: u16,
    /// Bytes of response data still to come after this chunk
    pub remain: u16,
    data: [u8; 7],
    len: u8,
}

impl PollReply {
    fn new(module_id: u16, descriptor: &PollDescriptor, chunk: &[u8]) -> Self {
        let mut data = [0u8; 7];
        let len = chunk.len().min(data.len());
        data[..len].copy_from_slice(&chunk[..len]);
        Self {
            module_id,
            poll_type: descriptor.poll_type,
            pid: descriptor.pid,
            frame_no: 0,
            offset: 0,
            remain: 0,
            data,
            len: len as u8,
        }
    }

    /// Response data carried by this chunk (service and PID stripped)
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// Whether this is the last chunk of the response
    pub fn is_complete(&self) -> bool {
        self.remain == 0
    }
}

/// What the sequencer did with a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDisposition {
    /// Not from the module being polled; pass it on to the driver
    Ignored,
    /// From the polled module range but unusable; discarded
    Dropped,
    /// Response data for the driver
    Reply(PollReply),
}

/// Request awaiting its response
#[derive(Debug, Clone, Copy)]
struct Expectation {
    descriptor: PollDescriptor,
    low: u16,
    high: u16,
    /// Responding module, fixed by the first frame of a multi frame reply
    responder: Option<u16>,
    /// Next consecutive frame sequence number
    seq: u8,
    chunks: u8,
    offset: u16,
    remain: u16,
    timeout: u8,
}

impl Expectation {
    fn new(descriptor: PollDescriptor, timeout: u8) -> Self {
        let (low, high) = descriptor.response_range();
        Self {
            descriptor,
            low,
            high,
            responder: None,
            seq: 0,
            chunks: 0,
            offset: 0,
            remain: 0,
            timeout,
        }
    }

    /// Service and PID bytes preceding the response data
    fn header_len(&self) -> usize {
        if self.descriptor.poll_type.has_wide_pid() {
            3
        } else {
            2
        }
    }

    /// Whether `message` starts with the positive response to our request
    fn matches(&self, message: &[u8]) -> bool {
        let d = &self.descriptor;
        if message.first() != Some(&d.poll_type.response_code()) {
            return false;
        }
        if d.poll_type.has_wide_pid() {
            message.len() >= 3 && u16::from_be_bytes([message[1], message[2]]) == d.pid
        } else {
            message.len() >= 2 && message[1] == d.pid as u8
        }
    }

    /// Flow control destination for a multi frame reply from `responder`
    fn flow_control_target(&self, responder: u16) -> u16 {
        match self.descriptor.response_id {
            Some(_) => self.descriptor.module_id,
            None => responder.wrapping_sub(8),
        }
    }
}

/// Table-driven OBD-II request generator
#[derive(Debug)]
pub struct PollSequencer {
    table: &'static [PollDescriptor],
    config: SequencerConfig,
    state: u8,
    cursor: usize,
    ticker: u16,
    expect: Option<Expectation>,
    bus_active: u8,
}

impl Default for PollSequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

impl PollSequencer {
    /// Create an idle sequencer with no poll table
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            table: &[],
            bus_active: config.bus_active_ticks,
            config,
            state: 0,
            cursor: 0,
            ticker: 0,
            expect: None,
        }
    }

    /// Install a driver's poll table and restart sequencing
    pub fn set_table(&mut self, table: &'static [PollDescriptor]) {
        info!("Poll table installed with {} entries", table.len());
        self.table = table;
        self.reset();
        self.bus_active = self.config.bus_active_ticks;
    }

    /// Remove the poll table
    pub fn clear_table(&mut self) {
        self.table = &[];
        self.reset();
    }

    /// Whether a non-empty table is installed
    pub fn has_table(&self) -> bool {
        !self.table.is_empty()
    }

    /// Select the interval column; a change restarts sequencing
    pub fn set_state(&mut self, state: u8) {
        if state != self.state {
            debug!("Poll state {} -> {}", self.state, state);
            self.state = state;
            self.reset();
        }
    }

    /// Current poll state
    pub fn state(&self) -> u8 {
        self.state
    }

    /// Seconds ticker, 0..3599
    pub fn ticker(&self) -> u16 {
        self.ticker
    }

    /// Index of the next descriptor to examine
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether a request is awaiting its response
    pub fn in_flight(&self) -> bool {
        self.expect.is_some()
    }

    /// Whether frames have been seen recently enough to keep polling
    pub fn bus_active(&self) -> bool {
        self.bus_active > 0
    }

    /// Record traffic on the bus
    pub fn note_bus_activity(&mut self) {
        self.bus_active = self.config.bus_active_ticks;
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.ticker = 0;
        self.expect = None;
    }

    /// One second step: issue at most one request.
    ///
    /// Returns the descriptor a request was sent for.
    pub fn tick<B: CanTransmit + ?Sized>(
        &mut self,
        bus: &mut B,
    ) -> Result<Option<PollDescriptor>, PollError> {
        if self.table.is_empty() || self.bus_active == 0 {
            return Ok(None);
        }
        self.bus_active -= 1;

        if let Some(expect) = self.expect.as_mut() {
            expect.timeout = expect.timeout.saturating_sub(1);
            if expect.timeout > 0 {
                return Ok(None);
            }
            debug!(
                "Poll {:?} {:#06X} to {:03X} timed out",
                expect.descriptor.poll_type, expect.descriptor.pid, expect.descriptor.module_id
            );
            self.expect = None;
        }

        while let Some(descriptor) = self.table.get(self.cursor).copied() {
            self.cursor += 1;
            let interval = descriptor.interval(self.state);
            if interval > 0 && self.ticker % interval == 0 {
                self.send(descriptor, bus)?;
                return Ok(Some(descriptor));
            }
        }

        self.cursor = 0;
        self.ticker = (self.ticker + 1) % TICKER_WRAP;
        Ok(None)
    }

    fn send<B: CanTransmit + ?Sized>(
        &mut self,
        descriptor: PollDescriptor,
        bus: &mut B,
    ) -> Result<(), PollError> {
        wait_tx_ready(bus);
        bus.transmit(&descriptor.request_frame())?;
        debug!(
            "Poll {:?} {:#06X} sent to {:03X}",
            descriptor.poll_type, descriptor.pid, descriptor.module_id
        );
        self.expect = Some(Expectation::new(descriptor, self.config.in_flight_timeout));
        Ok(())
    }

    /// Route a received frame through the response matcher.
    ///
    /// Sends the flow control frame when a multi frame reply starts.
    pub fn on_frame<B: CanTransmit + ?Sized>(
        &mut self,
        frame: &CanFrame,
        bus: &mut B,
    ) -> PollDisposition {
        self.note_bus_activity();
        let Some(mut expect) = self.expect else {
            return PollDisposition::Ignored;
        };
        if frame.id < expect.low || frame.id > expect.high {
            return PollDisposition::Ignored;
        }

        let started = expect.responder.is_some();
        if started && expect.responder != Some(frame.id) {
            return PollDisposition::Dropped;
        }

        let (disposition, keep) = match IsoTpFrame::parse(frame.payload()) {
            Some(IsoTpFrame::Single { len, data }) if !started => {
                Self::single(&expect, frame.id, len, data)
            }
            Some(IsoTpFrame::First { total, data }) if !started => {
                Self::first(&mut expect, frame.id, total, data, bus)
            }
            Some(IsoTpFrame::Consecutive { seq, data }) if started => {
                Self::consecutive(&mut expect, frame.id, seq, data)
            }
            _ => (PollDisposition::Dropped, true),
        };
        self.expect = if keep { Some(expect) } else { None };
        disposition
    }

    fn single(
        expect: &Expectation,
        id: u16,
        len: u8,
        data: &[u8],
    ) -> (PollDisposition, bool) {
        let len = usize::from(len).min(data.len());
        let message = &data[..len];
        if message.first() == Some(&mode::NEGATIVE_RESPONSE) {
            debug!("Negative response from {:03X}: {:02X?}", id, message);
            return (PollDisposition::Dropped, false);
        }
        if !expect.matches(message) {
            return (PollDisposition::Dropped, true);
        }
        let reply = PollReply::new(id, &expect.descriptor, &message[expect.header_len()..]);
        (PollDisposition::Reply(reply), false)
    }

    fn first<B: CanTransmit + ?Sized>(
        expect: &mut Expectation,
        id: u16,
        total: u16,
        data: &[u8],
        bus: &mut B,
    ) -> (PollDisposition, bool) {
        let header = expect.header_len();
        if usize::from(total) <= header || !expect.matches(data) {
            return (PollDisposition::Dropped, true);
        }

        wait_tx_ready(bus);
        if let Err(e) = bus.transmit(&flow_control_frame(expect.flow_control_target(id))) {
            warn!("Flow control to {:03X} failed: {}", id, e);
            return (PollDisposition::Dropped, false);
        }

        let body = total - header as u16;
        let chunk = &data[header..data.len().min(usize::from(total))];
        let mut reply = PollReply::new(id, &expect.descriptor, chunk);
        let taken = u16::from(reply.len);
        reply.remain = body - taken;

        expect.responder = Some(id);
        expect.seq = 1;
        expect.chunks = 1;
        expect.offset = taken;
        expect.remain = reply.remain;
        (PollDisposition::Reply(reply), reply.remain > 0)
    }

    fn consecutive(
        expect: &mut Expectation,
        id: u16,
        seq: u8,
        data: &[u8],
    ) -> (PollDisposition, bool) {
        if seq != expect.seq {
            warn!(
                "Frame sequence {} from {:03X}, expected {}; response discarded",
                seq, id, expect.seq
            );
            return (PollDisposition::Dropped, false);
        }
        let take = data.len().min(usize::from(expect.remain));
        let mut reply = PollReply::new(id, &expect.descriptor, &data[..take]);
        reply.frame_no = expect.chunks;
        reply.offset = expect.offset;
        expect.offset += u16::from(reply.len);
        expect.remain -= u16::from(reply.len);
        reply.remain = expect.remain;

        expect.seq = (expect.seq + 1) & 0x0F;
        expect.chunks = expect.chunks.wrapping_add(1);
        (PollDisposition::Reply(reply), expect.remain > 0)
    }
}
