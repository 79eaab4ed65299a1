//! Sorting sequencer.
//!
//! Owns the waypoint table and drives the actuator through the fixed
//! pick-and-place order:
//!
//! ```text
//! pickup_ready → pickup_down → pickup_grab → transfer_up
//!     → {target}_drop → {target}_release → standby
//! ```
//!
//! At most one sequence is in flight at any instant. A request that
//! arrives while a run exists is rejected, not queued; the run lock is
//! released on every exit path. For the single-servo gate the
//! "sequence" degenerates to one gate move under the same locking
//! contract, so callers never care which actuator is installed.

use parking_lot::Mutex;
use sortline_common::config::SequenceTimings;
use sortline_common::inspect::Classification;
use sortline_common::motion::{MotionError, Position, WaypointTable};
use sortline_hal::{Actuator, ActuatorStatus, JointInfo, ServoActuator};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Ephemeral record of an in-flight sorting sequence.
#[derive(Debug, Clone, Copy)]
pub struct SequenceRun {
    /// Which chute this run routes toward.
    pub target: Classification,
    /// Zero-based index of the step currently executing.
    pub current_step_index: usize,
    /// When the run was admitted.
    pub started_at: Instant,
}

/// Drives one actuator through sorting and calibration motions.
pub struct SortingSequencer {
    actuator: Actuator,
    waypoints: Mutex<WaypointTable>,
    timings: SequenceTimings,
    active: Mutex<Option<SequenceRun>>,
}

/// Clears the active run on every exit path, panic included.
struct RunGuard<'a> {
    sequencer: &'a SortingSequencer,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.sequencer.active.lock() = None;
    }
}

impl SortingSequencer {
    /// Create a sequencer over the installed actuator.
    pub fn new(actuator: Actuator, waypoints: WaypointTable, timings: SequenceTimings) -> Self {
        Self {
            actuator,
            waypoints: Mutex::new(waypoints),
            timings,
            active: Mutex::new(None),
        }
    }

    /// Snapshot of the in-flight run, if any.
    pub fn current_run(&self) -> Option<SequenceRun> {
        *self.active.lock()
    }

    /// Actuator status for the control surface.
    pub fn actuator_status(&self) -> ActuatorStatus {
        self.actuator.status()
    }

    /// Per-joint listing; empty for the single-servo gate.
    pub fn joint_info(&self) -> Vec<JointInfo> {
        match &self.actuator {
            Actuator::Arm(arm) => arm.joint_info(),
            Actuator::Servo(_) => Vec::new(),
        }
    }

    /// Admit a new run, or reject if one exists.
    fn begin_run(&self, target: Classification) -> Result<RunGuard<'_>, MotionError> {
        let mut active = self.active.lock();
        if let Some(run) = *active {
            warn!(
                "sequence request for {target:?} rejected: run toward {:?} at step {} still active",
                run.target, run.current_step_index
            );
            return Err(MotionError::Busy);
        }
        *active = Some(SequenceRun {
            target,
            current_step_index: 0,
            started_at: Instant::now(),
        });
        Ok(RunGuard { sequencer: self })
    }

    fn advance_step(&self, index: usize) {
        if let Some(run) = self.active.lock().as_mut() {
            run.current_step_index = index;
        }
    }

    /// The seven-step waypoint order for a target, with durations.
    fn steps_for(&self, target: Classification) -> [(String, Duration); 7] {
        let prefix = target.waypoint_prefix();
        let t = &self.timings;
        let step = |name: String, secs: f64| (name, Duration::from_secs_f64(secs));
        [
            step("pickup_ready".to_string(), t.approach_s),
            step("pickup_down".to_string(), t.descend_s),
            step("pickup_grab".to_string(), t.grab_s),
            step("transfer_up".to_string(), t.lift_s),
            step(format!("{prefix}_drop"), t.transfer_s),
            step(format!("{prefix}_release"), t.release_s),
            step("standby".to_string(), t.park_s),
        ]
    }

    /// Route one part toward the pass or fail chute.
    ///
    /// Rejects with [`MotionError::Busy`] while another run exists,
    /// leaving actuator state untouched. A step failure aborts the
    /// remainder immediately and forces an emergency stop — the arm
    /// pose is unknown after a failed move, so later steps must not
    /// run.
    pub fn execute_sequence(&self, target: Classification) -> Result<(), MotionError> {
        let guard = self.begin_run(target)?;
        let result = match &self.actuator {
            Actuator::Arm(arm) => self.run_arm_sequence(arm, target),
            Actuator::Servo(gate) => self.run_gate_sequence(gate, target),
        };
        drop(guard);

        match &result {
            Ok(()) => info!("sorting sequence toward {target:?} complete"),
            Err(e) => error!("sorting sequence toward {target:?} aborted: {e}"),
        }
        result
    }

    fn run_arm_sequence(
        &self,
        arm: &sortline_hal::ArmActuator,
        target: Classification,
    ) -> Result<(), MotionError> {
        for (index, (name, duration)) in self.steps_for(target).into_iter().enumerate() {
            self.advance_step(index);
            let position = self.lookup(&name)?;
            if let Err(e) = arm.move_to(position, duration) {
                self.actuator.emergency_stop();
                return Err(e);
            }
        }
        Ok(())
    }

    fn run_gate_sequence(
        &self,
        gate: &ServoActuator,
        target: Classification,
    ) -> Result<(), MotionError> {
        if let Err(e) = gate.set_angle(ServoActuator::angle_for(target)) {
            self.actuator.emergency_stop();
            return Err(e);
        }
        std::thread::sleep(Duration::from_secs_f64(self.timings.gate_settle_s));
        self.advance_step(1);
        if let Err(e) = gate.recenter() {
            self.actuator.emergency_stop();
            return Err(e);
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Position, MotionError> {
        self.waypoints
            .lock()
            .get(name)
            .ok_or_else(|| {
                self.actuator.emergency_stop();
                MotionError::UnknownWaypoint(name.to_string())
            })
    }

    /// Drive one joint through min → max → home with settle delays.
    ///
    /// Commissioning aid; runs under the same run lock as sorting, so
    /// a calibration cannot overlap a sequence (or another
    /// calibration).
    pub fn calibrate_joint(&self, joint: usize) -> Result<(), MotionError> {
        let Actuator::Arm(arm) = &self.actuator else {
            return Err(MotionError::UnknownJoint(joint));
        };
        let config = arm
            .joints()
            .get(joint)
            .ok_or(MotionError::UnknownJoint(joint))?
            .clone();

        let guard = self.begin_run(Classification::Pass)?;
        info!("calibrating joint '{}'", config.name);

        let settle = Duration::from_secs_f64(self.timings.calibration_settle_s);
        let result = (|| {
            arm.move_joint(joint, config.min_angle, settle)?;
            std::thread::sleep(settle);
            arm.move_joint(joint, config.max_angle, 2 * settle)?;
            std::thread::sleep(settle);
            arm.move_joint(joint, config.home_angle, settle)?;
            Ok(())
        })();
        drop(guard);

        if result.is_err() {
            self.actuator.emergency_stop();
        }
        result
    }

    /// Cancel any in-flight motion and zero every drive signal.
    ///
    /// The executing thread observes the interrupt, aborts its run and
    /// releases the run lock; afterwards no [`SequenceRun`] remains.
    pub fn emergency_stop(&self) {
        warn!("emergency stop");
        self.actuator.emergency_stop();
    }

    /// Save (or overwrite) the arm's current pose as a named waypoint.
    pub fn save_waypoint(&self, name: &str) -> Result<Position, MotionError> {
        let Actuator::Arm(arm) = &self.actuator else {
            return Err(MotionError::UnknownWaypoint(name.to_string()));
        };
        let position = arm.current_position();
        self.waypoints.lock().set(name, position);
        info!("waypoint '{name}' saved: {:?}", position.angles());
        Ok(position)
    }

    /// Look up a waypoint by name.
    pub fn waypoint(&self, name: &str) -> Option<Position> {
        self.waypoints.lock().get(name)
    }

    /// Names of all known waypoints.
    pub fn waypoint_names(&self) -> Vec<String> {
        self.waypoints
            .lock()
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Merge waypoints from a JSON file over the current table.
    pub fn load_waypoints(&self, path: &Path) -> Result<(), MotionError> {
        self.waypoints.lock().load_file(path)
    }

    /// Persist the whole waypoint table to a JSON file.
    pub fn save_waypoints(&self, path: &Path) -> Result<(), MotionError> {
        self.waypoints.lock().save_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortline_common::motion::default_joints;
    use sortline_hal::{ArmActuator, SimulatedBus};
    use std::sync::Arc;

    /// Timings short enough for tests, preserving the long/short step
    /// distinction.
    fn fast_timings() -> SequenceTimings {
        SequenceTimings {
            approach_s: 0.003,
            descend_s: 0.002,
            grab_s: 0.001,
            lift_s: 0.002,
            transfer_s: 0.003,
            release_s: 0.001,
            park_s: 0.003,
            gate_settle_s: 0.001,
            calibration_settle_s: 0.001,
        }
    }

    fn arm_sequencer() -> (Arc<SortingSequencer>, Arc<SimulatedBus>) {
        let bus = Arc::new(SimulatedBus::new());
        let arm = ArmActuator::new(bus.clone(), default_joints()).unwrap();
        let sequencer = SortingSequencer::new(
            Actuator::Arm(arm),
            WaypointTable::with_defaults(),
            fast_timings(),
        );
        (Arc::new(sequencer), bus)
    }

    #[test]
    fn pass_sequence_ends_at_standby() {
        let (sequencer, _) = arm_sequencer();
        sequencer.execute_sequence(Classification::Pass).unwrap();

        let standby = WaypointTable::with_defaults().get("standby").unwrap();
        let ActuatorStatus { position, .. } = sequencer.actuator_status();
        assert_eq!(position, Some(standby));
        assert!(sequencer.current_run().is_none());
    }

    #[test]
    fn defect_sequence_ends_at_standby() {
        let (sequencer, bus) = arm_sequencer();
        sequencer.execute_sequence(Classification::Defect).unwrap();
        assert!(sequencer.current_run().is_none());
        assert_eq!(bus.throttles(), [0.0; 16]);
    }

    #[test]
    fn concurrent_request_is_rejected_without_motion() {
        let (sequencer, bus) = arm_sequencer();

        // Hold the run lock as an admitted run would.
        let guard = sequencer.begin_run(Classification::Pass).unwrap();
        let before = bus.history().len();

        let result = sequencer.execute_sequence(Classification::Defect);
        assert!(matches!(result, Err(MotionError::Busy)));
        assert_eq!(bus.history().len(), before, "no actuator commands issued");
        drop(guard);

        // Lock released → next request is admitted.
        sequencer.execute_sequence(Classification::Defect).unwrap();
    }

    #[test]
    fn missing_waypoint_aborts_and_stops() {
        let bus = Arc::new(SimulatedBus::new());
        let arm = ArmActuator::new(bus.clone(), default_joints()).unwrap();
        let mut table = WaypointTable::with_defaults();
        // Sabotage the fifth step of the pass route.
        let mut incomplete = WaypointTable::new();
        for name in ["pickup_ready", "pickup_down", "pickup_grab", "transfer_up"] {
            incomplete.set(name, table.get(name).unwrap());
        }
        table = incomplete;

        let sequencer =
            SortingSequencer::new(Actuator::Arm(arm), table, fast_timings());
        let result = sequencer.execute_sequence(Classification::Pass);
        assert!(matches!(result, Err(MotionError::UnknownWaypoint(_))));
        assert!(sequencer.current_run().is_none());
        assert_eq!(bus.throttles(), [0.0; 16]);
    }

    #[test]
    fn emergency_stop_mid_sequence_clears_run_and_drives() {
        let bus = Arc::new(SimulatedBus::new());
        let arm = ArmActuator::new(bus.clone(), default_joints()).unwrap();
        let mut timings = fast_timings();
        timings.approach_s = 30.0; // first step would block for a long time
        let sequencer = Arc::new(SortingSequencer::new(
            Actuator::Arm(arm),
            WaypointTable::with_defaults(),
            timings,
        ));

        let runner = Arc::clone(&sequencer);
        let handle =
            std::thread::spawn(move || runner.execute_sequence(Classification::Pass));

        while sequencer.current_run().is_none() {
            std::thread::sleep(Duration::from_millis(1));
        }
        sequencer.emergency_stop();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(MotionError::Interrupted)));
        assert!(sequencer.current_run().is_none());
        assert_eq!(bus.throttles(), [0.0; 16]);
    }

    #[test]
    fn gate_sequence_swings_and_recentres() {
        use sortline_hal::backends::simulation::BusCommand;

        let bus = Arc::new(SimulatedBus::new());
        let gate = ServoActuator::new(bus.clone(), 0);
        let sequencer = SortingSequencer::new(
            Actuator::Servo(gate),
            WaypointTable::new(),
            fast_timings(),
        );

        sequencer.execute_sequence(Classification::Pass).unwrap();
        let angles: Vec<f64> = bus
            .history()
            .iter()
            .filter_map(|cmd| match cmd {
                BusCommand::Angle { channel: 0, value } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(angles, vec![45.0, 90.0]);
        assert!(sequencer.current_run().is_none());
    }

    #[test]
    fn calibration_visits_min_max_home() {
        let (sequencer, bus) = arm_sequencer();
        sequencer.calibrate_joint(2).unwrap();

        // elbow_bend: channel 2, home -90 → final confirmed angle -90.
        let status = sequencer.actuator_status();
        assert_eq!(status.position.unwrap().angle(2), Some(-90.0));
        assert_eq!(bus.throttle(2), 0.0);
        assert!(sequencer.current_run().is_none());
    }

    #[test]
    fn calibration_respects_run_lock() {
        let (sequencer, _) = arm_sequencer();
        let guard = sequencer.begin_run(Classification::Pass).unwrap();
        assert!(matches!(
            sequencer.calibrate_joint(0),
            Err(MotionError::Busy)
        ));
        drop(guard);
        sequencer.calibrate_joint(0).unwrap();
    }

    #[test]
    fn calibrate_rejects_gate_actuator() {
        let bus = Arc::new(SimulatedBus::new());
        let gate = ServoActuator::new(bus, 0);
        let sequencer = SortingSequencer::new(
            Actuator::Servo(gate),
            WaypointTable::new(),
            fast_timings(),
        );
        assert!(sequencer.calibrate_joint(0).is_err());
    }

    #[test]
    fn save_waypoint_captures_current_pose() {
        let (sequencer, _) = arm_sequencer();
        sequencer.execute_sequence(Classification::Pass).unwrap();
        let saved = sequencer.save_waypoint("operator_1").unwrap();
        assert_eq!(sequencer.waypoint("operator_1"), Some(saved));
    }

    #[test]
    fn waypoints_persist_through_file() {
        let (sequencer, _) = arm_sequencer();
        let file = tempfile::NamedTempFile::new().unwrap();
        sequencer.save_waypoint("station_two").unwrap();
        sequencer.save_waypoints(file.path()).unwrap();

        let (other, _) = arm_sequencer();
        assert!(other.waypoint("station_two").is_none());
        other.load_waypoints(file.path()).unwrap();
        assert!(other.waypoint("station_two").is_some());
    }
}
