//! Single-servo gate driver.
//!
//! The fallback actuator: one positional servo steering parts into the
//! pass or fail chute. Pass swings to 45°, fail to 135°, idle recentres
//! at 90°.

use parking_lot::Mutex;
use sortline_common::consts::{SERVO_FAIL_ANGLE, SERVO_IDLE_ANGLE, SERVO_PASS_ANGLE};
use sortline_common::hal::driver::ServoBus;
use sortline_common::inspect::Classification;
use sortline_common::motion::MotionError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Driver for the positional gate servo.
pub struct ServoActuator {
    bus: Arc<dyn ServoBus>,
    channel: u8,
    current_angle: Mutex<f64>,
}

impl ServoActuator {
    /// Create the driver on the given bus channel, assumed idle.
    pub fn new(bus: Arc<dyn ServoBus>, channel: u8) -> Self {
        Self {
            bus,
            channel,
            current_angle: Mutex::new(SERVO_IDLE_ANGLE),
        }
    }

    /// Last commanded gate angle.
    pub fn current_angle(&self) -> f64 {
        *self.current_angle.lock()
    }

    /// Command the gate to `angle`, clamped to 0..=180 degrees.
    /// Returns the applied angle.
    pub fn set_angle(&self, angle: f64) -> Result<f64, MotionError> {
        let clamped = angle.clamp(0.0, 180.0);
        self.bus.set_angle(self.channel, clamped)?;
        *self.current_angle.lock() = clamped;
        debug!("gate at {clamped:.0}°");
        Ok(clamped)
    }

    /// Gate angle routing the given classification.
    pub const fn angle_for(classification: Classification) -> f64 {
        match classification {
            Classification::Pass => SERVO_PASS_ANGLE,
            Classification::Defect => SERVO_FAIL_ANGLE,
        }
    }

    /// Recentre the gate to idle.
    pub fn recenter(&self) -> Result<f64, MotionError> {
        self.set_angle(SERVO_IDLE_ANGLE)
    }

    /// Best-effort return to idle. A positional servo holds its last
    /// pulse, so "stop" means recentring; a bus failure is logged and
    /// swallowed — this path must never raise.
    pub fn emergency_stop(&self) {
        if let Err(e) = self.recenter() {
            warn!("gate recentre during emergency stop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::{BusCommand, SimulatedBus};

    #[test]
    fn routing_angles() {
        assert_eq!(ServoActuator::angle_for(Classification::Pass), 45.0);
        assert_eq!(ServoActuator::angle_for(Classification::Defect), 135.0);
    }

    #[test]
    fn set_angle_clamps_and_records() {
        let bus = Arc::new(SimulatedBus::new());
        let gate = ServoActuator::new(bus.clone(), 0);

        assert_eq!(gate.set_angle(200.0).unwrap(), 180.0);
        assert_eq!(gate.current_angle(), 180.0);
        assert_eq!(
            bus.history().last().copied(),
            Some(BusCommand::Angle {
                channel: 0,
                value: 180.0
            })
        );
    }

    #[test]
    fn recenter_returns_to_idle() {
        let bus = Arc::new(SimulatedBus::new());
        let gate = ServoActuator::new(bus, 0);
        gate.set_angle(45.0).unwrap();
        gate.recenter().unwrap();
        assert_eq!(gate.current_angle(), SERVO_IDLE_ANGLE);
    }

    #[test]
    fn emergency_stop_never_panics() {
        let bus = Arc::new(SimulatedBus::new());
        let gate = ServoActuator::new(bus.clone(), 0);
        gate.emergency_stop();
        assert_eq!(gate.current_angle(), SERVO_IDLE_ANGLE);

        // Even after the bus is gone.
        bus.release().unwrap();
        gate.emergency_stop();
    }
}
