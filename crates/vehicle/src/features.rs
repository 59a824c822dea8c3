//! Module feature table

use crate::VehicleError;
use storage::{param, ParameterStore};
use tracing::debug;

/// Number of feature slots
pub const FEATURES_MAX: usize = 16;

/// First feature mirrored to the parameter store
pub const FEATURES_PERSISTED: usize = 8;

/// Speedometer
pub const FEATURE_SPEEDO: usize = 0x00;
/// Location streaming
pub const FEATURE_STREAM: usize = 0x08;
/// Minimum SOC alert threshold
pub const FEATURE_MINSOC: usize = 0x09;
/// Car specific on/off bits
pub const FEATURE_CARBITS: usize = 0x0E;
/// CAN bus may be written to
pub const FEATURE_CANWRITE: usize = 0x0F;

/// Integer feature slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    values: [i32; FEATURES_MAX],
}

impl Features {
    /// Load the persisted features (8..15) from their parameter slots
    pub fn load<S: ParameterStore + ?Sized>(&mut self, store: &S) {
        for index in FEATURES_PERSISTED..FEATURES_MAX {
            let raw = store.get(param::FEATURE_S + index - FEATURES_PERSISTED);
            self.values[index] = raw.trim().parse().unwrap_or(0);
        }
    }

    /// Value of feature `index`, 0 when out of range
    pub fn get(&self, index: usize) -> i32 {
        self.values.get(index).copied().unwrap_or(0)
    }

    /// Set a feature, writing persisted ones through to `store`
    pub fn set<S: ParameterStore + ?Sized>(
        &mut self,
        index: usize,
        value: i32,
        store: &mut S,
    ) -> Result<(), VehicleError> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(VehicleError::FeatureOutOfRange(index))?;
        *slot = value;
        if index >= FEATURES_PERSISTED {
            store.set(
                param::FEATURE_S + index - FEATURES_PERSISTED,
                &value.to_string(),
            )?;
        }
        debug!("Feature {} = {}", index, value);
        Ok(())
    }

    /// All values in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, i32)> + '_ {
        self.values.iter().copied().enumerate()
    }

    pub fn stream(&self) -> bool {
        self.get(FEATURE_STREAM) != 0
    }

    pub fn min_soc(&self) -> i32 {
        self.get(FEATURE_MINSOC)
    }

    pub fn can_write(&self) -> bool {
        self.get(FEATURE_CANWRITE) != 0
    }
}
