//! Hardware abstraction contracts.
//!
//! - [`driver`] - `SensingBackend` and `ServoBus` traits, `HalError`
//! - [`types`] - `Frame`, `ConveyorDirection`

pub mod driver;
pub mod types;
