//! OBD-II Poll Sequencer
//!
//! Walks a vehicle driver's static poll table once per second, issuing at
//! most one request per tick, and reassembles the responses (single or
//! ISO-TP multi frame) into incremental chunks for the driver.

mod scheduler;

pub use scheduler::{
    PollDisposition, PollError, PollReply, PollSequencer, SequencerConfig, BUS_ACTIVE_TICKS,
    IN_FLIGHT_TIMEOUT_TICKS, TICKER_WRAP,
};
