//! CAN frame capture
//!
//! [`FrameCapture`] runs in the receive interrupt context: it copies frames
//! out of the controller mailboxes into a bounded queue and does nothing
//! else. The main loop takes them from the paired [`FrameReceiver`].

use obd_protocol::{CanFrame, CanReceive, RxChannel};
use ring_buffer::{Consumer, Producer};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A frame tagged with the channel it arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedFrame {
    pub channel: RxChannel,
    pub frame: CanFrame,
}

impl Default for CapturedFrame {
    fn default() -> Self {
        Self {
            channel: RxChannel::Primary,
            frame: CanFrame::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    secondary: AtomicBool,
    captured: AtomicUsize,
    discarded: AtomicUsize,
    /// Payload of the last queued frame, little endian
    recent: AtomicU64,
}

/// Producer half, serviced on every receive interrupt
#[derive(Debug)]
pub struct FrameCapture {
    queue: Producer<CapturedFrame>,
    counters: Arc<Counters>,
}

/// Consumer half, drained by the main loop
#[derive(Debug)]
pub struct FrameReceiver {
    queue: Consumer<CapturedFrame>,
    counters: Arc<Counters>,
}

impl FrameCapture {
    /// Create a capture queue holding up to `capacity` frames
    pub fn new(capacity: usize) -> (FrameCapture, FrameReceiver) {
        let (producer, consumer) = ring_buffer::channel(capacity);
        let counters = Arc::new(Counters::default());
        (
            FrameCapture {
                queue: producer,
                counters: Arc::clone(&counters),
            },
            FrameReceiver {
                queue: consumer,
                counters,
            },
        )
    }

    /// Move waiting frames from the mailboxes into the queue.
    ///
    /// Stops taking from a mailbox while the queue is full so the frame
    /// stays in hardware. Secondary frames nobody listens to are read and
    /// discarded. Returns the number of frames queued.
    pub fn service<B: CanReceive + ?Sized>(&mut self, bus: &mut B) -> usize {
        let counters = &*self.counters;
        let mut queued = 0;
        for channel in RxChannel::ALL {
            if channel == RxChannel::Secondary && !counters.secondary.load(Ordering::Acquire) {
                while bus.take_frame(channel).is_some() {
                    counters.discarded.fetch_add(1, Ordering::Relaxed);
                }
                continue;
            }
            while !self.queue.is_full() {
                let Some(frame) = bus.take_frame(channel) else {
                    break;
                };
                match self.queue.push(CapturedFrame { channel, frame }) {
                    Ok(()) => {
                        counters
                            .recent
                            .store(u64::from_le_bytes(frame.data), Ordering::Relaxed);
                        queued += 1;
                    }
                    Err(_) => {
                        counters.discarded.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }
        counters.captured.fetch_add(queued, Ordering::Relaxed);
        queued
    }

    /// Frames queued since creation
    pub fn captured(&self) -> usize {
        self.counters.captured.load(Ordering::Relaxed)
    }

    /// Frames read and thrown away
    pub fn discarded(&self) -> usize {
        self.counters.discarded.load(Ordering::Relaxed)
    }

    /// Payload bytes of the most recently queued frame
    pub fn recent_payload(&self) -> [u8; 8] {
        self.counters.recent.load(Ordering::Relaxed).to_le_bytes()
    }
}

impl FrameReceiver {
    /// Oldest queued frame
    pub fn pop(&mut self) -> Option<CapturedFrame> {
        self.queue.pop()
    }

    /// Frames waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Deliver secondary channel frames (driver interest)
    pub fn set_secondary(&self, enabled: bool) {
        self.counters.secondary.store(enabled, Ordering::Release);
    }
}
