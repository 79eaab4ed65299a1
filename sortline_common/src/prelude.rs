//! Common re-exports for sortline crates.

pub use crate::config::{
    ActuatorKind, BackendMode, ConfigError, ConfigLoader, SequenceTimings, StationConfig,
};
pub use crate::consts::*;
pub use crate::events::{EventSink, StationEvent, event_channel};
pub use crate::hal::driver::{HalError, SensingBackend, ServoBus};
pub use crate::hal::types::{ConveyorDirection, Frame};
pub use crate::inspect::{
    Classification, ClassificationProvider, ClassifyError, DefectKind, Verdict,
};
pub use crate::motion::{JointConfig, MotionError, Position, WaypointTable, default_joints};
pub use crate::state::{SharedSystemState, SystemState};
