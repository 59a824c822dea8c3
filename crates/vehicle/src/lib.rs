//! Vehicle Layer
//!
//! The live vehicle-state snapshot, the feature table, the pluggable
//! vehicle driver and the path CAN frames take from the receive interrupt
//! to the driver.

mod capture;
mod context;
mod driver;
mod features;
mod obdii;
mod state;
mod vehicle;

pub use capture::{CapturedFrame, FrameCapture, FrameReceiver};
pub use context::{Notify, VehicleContext};
pub use driver::{
    ChargeEstimate, ChargeEstimateRequest, CommandReply, CommandStatus, NoneDriver, VehicleDriver,
    VehicleType,
};
pub use features::{
    Features, FEATURES_MAX, FEATURES_PERSISTED, FEATURE_CANWRITE, FEATURE_CARBITS, FEATURE_MINSOC,
    FEATURE_SPEEDO, FEATURE_STREAM,
};
pub use obdii::ObdiiDriver;
pub use state::{Doors1, Doors2, Doors3, Doors4, Units, VehicleState, STALE_EXPIRED, STALE_NEVER};
pub use vehicle::Vehicle;

use storage::StorageError;
use thiserror::Error;

/// Vehicle layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VehicleError {
    #[error("Feature index {0} out of range")]
    FeatureOutOfRange(usize),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
