//! Parameter Store Implementation

use crate::{StorageError, PARAM_MAX, PARAM_MAX_LENGTH, PARAM_VALUE_CAPACITY};
use std::path::Path;
use tracing::{debug, info};

/// Bounded value of a single slot
pub type SlotValue = heapless::String<PARAM_VALUE_CAPACITY>;

/// Indexed get/set of bounded strings
pub trait ParameterStore {
    /// Value at `index`; empty for unset or out of range slots
    fn get(&self, index: usize) -> &str;

    /// Replace the value at `index`
    fn set(&mut self, index: usize, value: &str) -> Result<(), StorageError>;

    /// Number of slots
    fn len(&self) -> usize {
        PARAM_MAX
    }

    /// Whether the store has no slots
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory slot table mirroring the EEPROM layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotStore {
    slots: [SlotValue; PARAM_MAX],
    dirty: bool,
}

impl SlotStore {
    /// Create a store with every slot empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a raw EEPROM image (NUL padded slots)
    pub fn from_image(image: &[u8]) -> Result<Self, StorageError> {
        if image.len() != PARAM_MAX * PARAM_MAX_LENGTH {
            return Err(StorageError::InvalidImage(format!(
                "expected {} bytes, got {}",
                PARAM_MAX * PARAM_MAX_LENGTH,
                image.len()
            )));
        }
        let mut store = Self::new();
        for (index, raw) in image.chunks(PARAM_MAX_LENGTH).enumerate() {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(PARAM_VALUE_CAPACITY);
            let value = std::str::from_utf8(&raw[..end.min(PARAM_VALUE_CAPACITY)])
                .map_err(|e| StorageError::InvalidImage(format!("slot {}: {}", index, e)))?;
            store.set(index, value)?;
        }
        store.dirty = false;
        Ok(store)
    }

    /// Raw EEPROM image of the current slots
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = vec![0u8; PARAM_MAX * PARAM_MAX_LENGTH];
        for (slot, raw) in self.slots.iter().zip(image.chunks_mut(PARAM_MAX_LENGTH)) {
            raw[..slot.len()].copy_from_slice(slot.as_bytes());
        }
        image
    }

    /// Load an EEPROM image file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        let store = Self::from_image(&image)?;
        info!("Loaded parameters from {}", path.display());
        Ok(store)
    }

    /// Write the EEPROM image file
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_image()).map_err(|e| StorageError::Io(e.to_string()))?;
        self.dirty = false;
        debug!("Saved parameters to {}", path.display());
        Ok(())
    }

    /// Set `index` only if it is still empty. Returns whether it was written.
    pub fn seed(&mut self, index: usize, value: &str) -> Result<bool, StorageError> {
        if !self.get(index).is_empty() || value.is_empty() {
            return Ok(false);
        }
        self.set(index, value)?;
        Ok(true)
    }

    /// Whether slots changed since the last load or save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl ParameterStore for SlotStore {
    fn get(&self, index: usize) -> &str {
        self.slots.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    fn set(&mut self, index: usize, value: &str) -> Result<(), StorageError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(StorageError::IndexOutOfRange(index))?;
        if value.len() > PARAM_VALUE_CAPACITY || value.contains('\0') {
            return Err(StorageError::ValueTooLong {
                index,
                len: value.len(),
            });
        }
        slot.clear();
        // Length checked above
        let _ = slot.push_str(value);
        self.dirty = true;
        Ok(())
    }
}
