//! Backend selection.
//!
//! The execution mode is resolved exactly once, from configuration, at
//! startup. Nothing downstream ever probes for hardware capabilities
//! per call; it only sees the trait objects built here.

pub mod hardware;
pub mod simulation;

use crate::actuator::{Actuator, ArmActuator, ServoActuator};
use sortline_common::config::{ActuatorKind, BackendMode, StationConfig};
use sortline_common::hal::driver::{HalError, SensingBackend, ServoBus};
use sortline_common::motion::MotionError;
use std::sync::Arc;
use tracing::info;

/// Build the sensing backend selected by the configuration.
pub fn create_backend(config: &StationConfig) -> Result<Arc<dyn SensingBackend>, HalError> {
    match config.station.mode {
        BackendMode::Simulation => {
            info!("sensing backend: simulation");
            Ok(Arc::new(simulation::SimulationBackend::new(&config.camera)))
        }
        BackendMode::Hardware => {
            info!("sensing backend: hardware (gpio + v4l)");
            let backend = hardware::HardwareBackend::open(&config.pins, &config.camera)?;
            Ok(Arc::new(backend))
        }
    }
}

/// Build the servo bus selected by the configuration.
pub fn create_servo_bus(config: &StationConfig) -> Result<Arc<dyn ServoBus>, HalError> {
    match config.station.mode {
        BackendMode::Simulation => Ok(Arc::new(simulation::SimulatedBus::new())),
        BackendMode::Hardware => {
            let bus = hardware::Pca9685Bus::open(&config.servo_bus)?;
            Ok(Arc::new(bus))
        }
    }
}

/// Build the actuator variant selected by the configuration.
///
/// The variant is fixed at construction; the sequencer only ever sees
/// the [`Actuator`] wrapper.
pub fn create_actuator(
    config: &StationConfig,
    bus: Arc<dyn ServoBus>,
) -> Result<Actuator, MotionError> {
    match config.station.actuator {
        ActuatorKind::Arm => {
            info!("actuator: six-axis arm ({} joints)", config.joints.len());
            let arm = ArmActuator::new(bus, config.joints.clone())?;
            Ok(Actuator::Arm(arm))
        }
        ActuatorKind::Servo => {
            info!(
                "actuator: single-servo gate on channel {}",
                config.servo_bus.gate_channel
            );
            Ok(Actuator::Servo(ServoActuator::new(
                bus,
                config.servo_bus.gate_channel,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortline_common::config::StationConfig;

    #[test]
    fn simulation_backend_from_default_config() {
        let config = StationConfig::default();
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "simulation");
    }

    #[test]
    fn arm_actuator_from_default_config() {
        let config = StationConfig::default();
        let bus = create_servo_bus(&config).unwrap();
        let actuator = create_actuator(&config, bus).unwrap();
        assert!(matches!(actuator, Actuator::Arm(_)));
    }

    #[test]
    fn servo_actuator_when_configured() {
        let mut config = StationConfig::default();
        config.station.actuator = ActuatorKind::Servo;
        let bus = create_servo_bus(&config).unwrap();
        let actuator = create_actuator(&config, bus).unwrap();
        assert!(matches!(actuator, Actuator::Servo(_)));
    }
}
