//! CAN controller access
//!
//! The receive and poll paths are written against [`CanReceive`] and
//! [`CanTransmit`]; [`MockCanBus`] simulates a controller with two small
//! hardware mailboxes for tests and host builds.

use crate::error::ObdError;
use crate::frame::{CanFrame, RxChannel};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Hardware mailbox depth per receive channel
pub const DEFAULT_MAILBOX_DEPTH: usize = 2;

/// Receive side of a CAN controller
pub trait CanReceive {
    /// Take the oldest frame waiting in `channel`'s mailbox
    fn take_frame(&mut self, channel: RxChannel) -> Option<CanFrame>;
}

/// Transmit side of a CAN controller plus the receive overflow latch
pub trait CanTransmit {
    /// Whether a previous transmit is still in progress
    fn tx_pending(&mut self) -> bool;

    /// Queue `frame` for transmission
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), ObdError>;

    /// Receive overflow latch; while set the receiver accepts nothing
    fn rx_overflow(&self) -> bool;

    /// Clear the receive overflow latch
    fn clear_rx_overflow(&mut self);
}

/// Busy-wait until the controller can accept another frame.
pub fn wait_tx_ready<B: CanTransmit + ?Sized>(bus: &mut B) {
    while bus.tx_pending() {
        core::hint::spin_loop();
    }
}

/// Simulated CAN controller
#[derive(Debug)]
pub struct MockCanBus {
    mailboxes: [VecDeque<CanFrame>; 2],
    depth: usize,
    overflow: bool,
    sent: Vec<CanFrame>,
    tx_busy_polls: u32,
    busy_remaining: u32,
}

impl Default for MockCanBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCanBus {
    /// Controller with [`DEFAULT_MAILBOX_DEPTH`] mailboxes
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_MAILBOX_DEPTH)
    }

    /// Controller with `depth` frames per mailbox
    pub fn with_depth(depth: usize) -> Self {
        Self {
            mailboxes: [VecDeque::with_capacity(depth), VecDeque::with_capacity(depth)],
            depth: depth.max(1),
            overflow: false,
            sent: Vec::new(),
            tx_busy_polls: 0,
            busy_remaining: 0,
        }
    }

    /// Report the transmitter busy for `polls` checks after every send
    pub fn with_tx_busy(mut self, polls: u32) -> Self {
        self.tx_busy_polls = polls;
        self
    }

    /// Deliver a frame from the bus into `channel`'s mailbox.
    ///
    /// A full mailbox latches the overflow flag; until it is cleared every
    /// further frame is refused. Senders retry, so a refused frame is not
    /// lost to the bus.
    pub fn inject(&mut self, channel: RxChannel, frame: CanFrame) -> Result<(), ObdError> {
        if self.overflow {
            return Err(ObdError::BusLocked);
        }
        let mailbox = &mut self.mailboxes[channel.index()];
        if mailbox.len() >= self.depth {
            warn!("CAN receive overflow on {:?}", channel);
            self.overflow = true;
            return Err(ObdError::ReceiveOverflow(channel));
        }
        mailbox.push_back(frame);
        Ok(())
    }

    /// Frames waiting in `channel`'s mailbox
    pub fn pending(&self, channel: RxChannel) -> usize {
        self.mailboxes[channel.index()].len()
    }

    /// Frames transmitted so far
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    /// Drain the transmitted frames
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl CanReceive for MockCanBus {
    fn take_frame(&mut self, channel: RxChannel) -> Option<CanFrame> {
        self.mailboxes[channel.index()].pop_front()
    }
}

impl CanTransmit for MockCanBus {
    fn tx_pending(&mut self) -> bool {
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            true
        } else {
            false
        }
    }

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), ObdError> {
        if self.busy_remaining > 0 {
            return Err(ObdError::TransmitFailed("transmitter busy".into()));
        }
        debug!("CAN tx {:03X} {:02X?}", frame.id, frame.payload());
        self.sent.push(*frame);
        self.busy_remaining = self.tx_busy_polls;
        Ok(())
    }

    fn rx_overflow(&self) -> bool {
        self.overflow
    }

    fn clear_rx_overflow(&mut self) {
        self.overflow = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u16) -> CanFrame {
        CanFrame::new(id, &[id as u8]).unwrap()
    }

    #[test]
    fn test_mailbox_order() {
        let mut bus = MockCanBus::new();
        bus.inject(RxChannel::Primary, frame(0x100)).unwrap();
        bus.inject(RxChannel::Primary, frame(0x101)).unwrap();
        assert_eq!(bus.take_frame(RxChannel::Primary).map(|f| f.id), Some(0x100));
        assert_eq!(bus.take_frame(RxChannel::Primary).map(|f| f.id), Some(0x101));
        assert_eq!(bus.take_frame(RxChannel::Primary), None);
    }

    #[test]
    fn test_overflow_locks_receiver() {
        let mut bus = MockCanBus::new();
        bus.inject(RxChannel::Secondary, frame(0x200)).unwrap();
        bus.inject(RxChannel::Secondary, frame(0x201)).unwrap();
        assert_eq!(
            bus.inject(RxChannel::Secondary, frame(0x202)),
            Err(ObdError::ReceiveOverflow(RxChannel::Secondary))
        );
        assert!(bus.rx_overflow());
        // Other channel is locked too
        assert_eq!(bus.inject(RxChannel::Primary, frame(0x300)), Err(ObdError::BusLocked));

        bus.take_frame(RxChannel::Secondary);
        bus.clear_rx_overflow();
        assert!(bus.inject(RxChannel::Primary, frame(0x300)).is_ok());
    }

    #[test]
    fn test_wait_tx_ready_spins_until_idle() {
        let mut bus = MockCanBus::new().with_tx_busy(3);
        bus.transmit(&frame(0x7DF)).unwrap();
        assert!(bus.transmit(&frame(0x7DF)).is_err());
        wait_tx_ready(&mut bus);
        assert!(bus.transmit(&frame(0x7E0)).is_ok());
        assert_eq!(bus.sent().len(), 2);
    }
}
