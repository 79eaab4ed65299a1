//! # Sortline Control
//!
//! The inspection-and-sorting control core: the loops and the
//! sequencer that turn sensor edges into classified, sorted parts.
//!
//! # Module Structure
//!
//! - [`acquisition`] - Display frame streaming loop
//! - [`classify`] - Threshold-based simulated classifier
//! - [`inspection`] - Edge-triggered detection loop
//! - [`sequencer`] - Pick-and-place / gate sorting sequencer
//! - [`station`] - Wiring, control surface and shutdown
//!
//! # Data Flow
//!
//! ```text
//!  control surface ──► SharedSystemState
//!                            │ (read each poll)
//!  SensingBackend ──► InspectionLoop ──► ClassificationProvider
//!        │                   │                  │ Verdict
//!        │                   └──► SortingSequencer ──► Actuator
//!        └──► AcquisitionLoop ──► FrameReady events
//! ```

pub mod acquisition;
pub mod classify;
pub mod inspection;
pub mod sequencer;
pub mod station;

pub use crate::acquisition::AcquisitionLoop;
pub use crate::classify::SimulatedClassifier;
pub use crate::inspection::InspectionLoop;
pub use crate::sequencer::{SequenceRun, SortingSequencer};
pub use crate::station::{LoopHandle, Station, StationError};
