//! Storage Layer
//!
//! The module's persistent configuration: a fixed number of indexed slots
//! holding short strings, mirrored to an EEPROM image. Larger structures
//! are serialised and spread over consecutive slots.

mod blob;
mod store;

pub mod param;

pub use blob::{get_blob, set_blob};
pub use store::{ParameterStore, SlotStore, SlotValue};

use thiserror::Error;

/// Number of parameter slots
pub const PARAM_MAX: usize = 32;

/// Bytes per slot in the EEPROM image, including the terminator
pub const PARAM_MAX_LENGTH: usize = 32;

/// Characters a slot can hold
pub const PARAM_VALUE_CAPACITY: usize = PARAM_MAX_LENGTH - 1;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Parameter index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("Value of {len} bytes does not fit parameter {index}")]
    ValueTooLong { index: usize, len: usize },
    #[error("Blob needs {needed} slots from {start}, {available} available")]
    BlobOverflow {
        start: usize,
        needed: usize,
        available: usize,
    },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invalid EEPROM image: {0}")]
    InvalidImage(String),
    #[error("I/O error: {0}")]
    Io(String),
}
