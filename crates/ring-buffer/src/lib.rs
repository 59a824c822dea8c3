//! Lock-Free Ring Buffer
//!
//! Bounded SPSC queue used to hand received CAN frames from the capture
//! context to the cooperative main loop. Pushing into a full queue fails
//! instead of overwriting, so the producer can leave the frame in its
//! hardware mailbox.
//!
//! The queue is only reachable through one [`Producer`] and one
//! [`Consumer`]. Both are `Send` but not `Sync`, and `push`/`pop` take
//! `&mut self`, so each end has exactly one user at a time.

mod buffer;

pub use buffer::{channel, Consumer, Producer};

use thiserror::Error;

/// Ring buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// No free slot; the item was not stored
    #[error("Ring buffer full")]
    Full,
}
