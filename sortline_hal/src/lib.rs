//! # Sortline HAL
//!
//! Sensing backends and actuator drivers for the inspection station.
//!
//! Backends implement the `SensingBackend` trait defined in
//! `sortline_common::hal::driver`; the hardware and simulation
//! implementations are behaviorally indistinguishable to callers.
//!
//! # Module Structure
//!
//! - [`backends`] - Backend selection, simulation and hardware backends
//! - [`actuator`] - Servo gate and six-axis arm drivers
//!
//! # Architecture
//!
//! ```text
//!  StationConfig ──► backends::create_backend ──► dyn SensingBackend
//!                └─► backends::create_servo_bus ─► dyn ServoBus
//!                                                      │
//!                          actuator::Actuator ◄────────┘
//!                          (Servo gate | six-axis Arm)
//! ```

pub mod actuator;
pub mod backends;

pub use crate::actuator::{Actuator, ActuatorStatus, ArmActuator, JointInfo, ServoActuator};
pub use crate::backends::{create_actuator, create_backend, create_servo_bus};
pub use crate::backends::simulation::{SimulatedBus, SimulationBackend};
