//! Station wiring, control surface and shutdown.
//!
//! [`Station`] owns the whole control core: it builds the configured
//! backend and actuator, wires the loops, and exposes the operator
//! surface (arm/disarm, conveyor, relay, threshold, manual sort,
//! calibration, waypoints). Shutdown is idempotent and bounded: loop
//! threads get a stop deadline, then outputs are driven to their safe
//! state regardless.

use crate::acquisition::AcquisitionLoop;
use crate::classify::SimulatedClassifier;
use crate::inspection::InspectionLoop;
use crate::sequencer::SortingSequencer;
use parking_lot::Mutex;
use sortline_common::config::{ConfigError, StationConfig};
use sortline_common::events::{EventSink, StationEvent, event_channel};
use sortline_common::hal::driver::{HalError, SensingBackend, ServoBus};
use sortline_common::hal::types::ConveyorDirection;
use sortline_common::inspect::{Classification, ClassificationProvider};
use sortline_common::motion::{MotionError, Position, WaypointTable};
use sortline_common::state::SharedSystemState;
use sortline_hal::{ActuatorStatus, JointInfo, create_actuator, create_backend, create_servo_bus};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Error type for station construction and operation.
#[derive(Debug, Error)]
pub enum StationError {
    /// Configuration failed to load or validate
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A device failed to open or respond
    #[error("hardware error: {0}")]
    Hal(#[from] HalError),

    /// A motion command failed
    #[error("motion error: {0}")]
    Motion(#[from] MotionError),
}

/// Handle to a spawned loop thread with bounded stop.
pub struct LoopHandle {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LoopHandle {
    /// Spawn `body` on a named thread, handing it the stop flag.
    pub fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to spawn {name} thread: {e}");
                None
            }
        };
        Self {
            name,
            stop,
            handle: Mutex::new(handle),
        }
    }

    /// Raise the stop flag and wait up to `timeout` for the thread to
    /// exit. Returns `false` if the thread outlived the deadline, in
    /// which case it is left detached rather than blocked on.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.lock().take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("{} thread did not stop within {timeout:?}", self.name);
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            warn!("{} thread panicked", self.name);
        }
        true
    }
}

/// The assembled control core.
pub struct Station {
    config: StationConfig,
    backend: Arc<dyn SensingBackend>,
    bus: Arc<dyn ServoBus>,
    sequencer: Arc<SortingSequencer>,
    classifier: Arc<dyn ClassificationProvider>,
    state: SharedSystemState,
    events: EventSink,
    loops: Vec<LoopHandle>,
    shut_down: AtomicBool,
}

impl Station {
    /// Build the station from a validated configuration, using the
    /// built-in simulated classifier.
    ///
    /// Returns the station plus the receiving end of its event stream.
    pub fn new(config: StationConfig) -> Result<(Self, Receiver<StationEvent>), StationError> {
        let state = SharedSystemState::new();
        let classifier = Arc::new(SimulatedClassifier::new(state.clone()));
        Self::with_classifier(config, classifier, state)
    }

    /// Build the station around an externally supplied classifier.
    pub fn with_classifier(
        config: StationConfig,
        classifier: Arc<dyn ClassificationProvider>,
        state: SharedSystemState,
    ) -> Result<(Self, Receiver<StationEvent>), StationError> {
        config.validate()?;
        state.set_threshold(config.detection.threshold);

        let backend = create_backend(&config)?;
        let bus = create_servo_bus(&config)?;
        let actuator = create_actuator(&config, bus.clone())?;

        let mut waypoints = WaypointTable::with_defaults();
        if let Some(path) = &config.station.waypoint_file {
            waypoints.load_file(path)?;
            info!("waypoints merged from {}", path.display());
        }
        let sequencer = Arc::new(SortingSequencer::new(actuator, waypoints, config.sequence));

        let (events, rx) = event_channel();
        Ok((
            Self {
                config,
                backend,
                bus,
                sequencer,
                classifier,
                state,
                events,
                loops: Vec::new(),
                shut_down: AtomicBool::new(false),
            },
            rx,
        ))
    }

    /// Spawn the inspection and acquisition loops.
    pub fn start(&mut self) {
        if !self.loops.is_empty() {
            warn!("station already started");
            return;
        }
        let timing = &self.config.timing;

        let inspection = InspectionLoop::new(
            self.backend.clone(),
            self.classifier.clone(),
            self.sequencer.clone(),
            self.state.clone(),
            self.events.clone(),
            Duration::from_millis(timing.poll_period_ms),
            Duration::from_millis(timing.settle_ms),
        );
        self.loops
            .push(LoopHandle::spawn("inspection", |stop| inspection.run(stop)));

        let acquisition = AcquisitionLoop::new(
            self.backend.clone(),
            self.events.clone(),
            Duration::from_millis(timing.frame_period_ms),
            Duration::from_millis(timing.frame_retry_ms),
        );
        self.loops
            .push(LoopHandle::spawn("acquisition", |stop| acquisition.run(stop)));

        info!("station started in {:?} mode", self.config.station.mode);
    }

    /// Shared state handle for external observers.
    pub fn state(&self) -> SharedSystemState {
        self.state.clone()
    }

    /// Arm or disarm detection.
    pub fn arm(&self, armed: bool) {
        info!("detection {}", if armed { "armed" } else { "disarmed" });
        self.state.set_armed(armed);
    }

    /// Run the conveyor at `speed_pct` in the given direction.
    pub fn set_conveyor(
        &self,
        speed_pct: u8,
        direction: ConveyorDirection,
    ) -> Result<(), StationError> {
        self.backend.set_conveyor(speed_pct, direction)?;
        let running = direction != ConveyorDirection::Stop && speed_pct > 0;
        self.state.set_conveyor_running(running);
        Ok(())
    }

    /// Stop the conveyor.
    pub fn stop_conveyor(&self) -> Result<(), StationError> {
        self.set_conveyor(0, ConveyorDirection::Stop)
    }

    /// Switch the auxiliary relay (lighting).
    pub fn set_relay(&self, on: bool) -> Result<(), StationError> {
        Ok(self.backend.set_relay(on)?)
    }

    /// Last commanded relay state.
    pub fn relay_state(&self) -> bool {
        self.backend.relay_state()
    }

    /// Set the detection threshold, effective from the next part.
    pub fn set_threshold(&self, threshold: f64) {
        self.state.set_threshold(threshold);
    }

    /// Current detection threshold.
    pub fn threshold(&self) -> f64 {
        self.state.threshold()
    }

    /// Actuator snapshot for the operator console.
    pub fn actuator_status(&self) -> ActuatorStatus {
        self.sequencer.actuator_status()
    }

    /// Per-joint listing; empty for the single-servo gate.
    pub fn joint_info(&self) -> Vec<JointInfo> {
        self.sequencer.joint_info()
    }

    /// Manually route a part, as if it had just been classified.
    pub fn sort(&self, target: Classification) -> Result<(), StationError> {
        Ok(self.sequencer.execute_sequence(target)?)
    }

    /// Run the commissioning sweep for one joint.
    pub fn calibrate_joint(&self, joint: usize) -> Result<(), StationError> {
        Ok(self.sequencer.calibrate_joint(joint)?)
    }

    /// Names of all known waypoints.
    pub fn waypoint_names(&self) -> Vec<String> {
        self.sequencer.waypoint_names()
    }

    /// Save the arm's current pose under a waypoint name.
    pub fn save_waypoint(&self, name: &str) -> Result<Position, StationError> {
        Ok(self.sequencer.save_waypoint(name)?)
    }

    /// Merge waypoints from a JSON file over the live table.
    pub fn load_waypoints(&self, path: &Path) -> Result<(), StationError> {
        Ok(self.sequencer.load_waypoints(path)?)
    }

    /// Persist the live waypoint table to a JSON file.
    pub fn save_waypoints(&self, path: &Path) -> Result<(), StationError> {
        Ok(self.sequencer.save_waypoints(path)?)
    }

    /// Immediately cancel motion, disarm and stop the conveyor.
    ///
    /// Preempts an in-flight sorting sequence rather than waiting it
    /// out. Never fails: a conveyor that will not stop is logged, the
    /// actuator is stopped regardless.
    pub fn emergency_stop(&self) {
        self.state.set_armed(false);
        self.sequencer.emergency_stop();
        if let Err(e) = self.backend.set_conveyor(0, ConveyorDirection::Stop) {
            error!("conveyor stop during emergency stop failed: {e}");
        }
        self.state.set_conveyor_running(false);
    }

    /// Orderly shutdown: stop the loops, halt motion, release devices.
    ///
    /// Idempotent; the second and later calls return immediately.
    pub fn shutdown(&mut self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("station shutting down");
        self.state.set_armed(false);

        let timeout = Duration::from_millis(self.config.timing.stop_timeout_ms);
        for handle in self.loops.drain(..) {
            handle.stop(timeout);
        }

        self.sequencer.emergency_stop();
        if let Err(e) = self.bus.release() {
            warn!("servo bus release failed: {e}");
        }
        if let Err(e) = self.backend.shutdown() {
            warn!("backend shutdown failed: {e}");
        }
        info!("station shutdown complete");
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulation_config() -> StationConfig {
        let mut config = StationConfig::default();
        config.timing.poll_period_ms = 1;
        config.timing.settle_ms = 2;
        config.timing.stop_timeout_ms = 500;
        config
    }

    #[test]
    fn builds_in_simulation_mode() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        assert_eq!(station.backend.name(), "simulation");
        assert_eq!(station.threshold(), 0.8);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = simulation_config();
        config.detection.threshold = 3.0;
        assert!(matches!(
            Station::new(config),
            Err(StationError::Config(_))
        ));
    }

    #[test]
    fn conveyor_updates_shared_state() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        station.set_conveyor(60, ConveyorDirection::Forward).unwrap();
        assert!(station.state().snapshot().conveyor_running);

        station.stop_conveyor().unwrap();
        assert!(!station.state().snapshot().conveyor_running);
    }

    #[test]
    fn zero_speed_counts_as_stopped() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        station.set_conveyor(0, ConveyorDirection::Forward).unwrap();
        assert!(!station.state().snapshot().conveyor_running);
    }

    #[test]
    fn manual_sort_moves_the_arm() {
        let mut config = simulation_config();
        config.sequence = sortline_common::config::SequenceTimings {
            approach_s: 0.001,
            descend_s: 0.001,
            grab_s: 0.001,
            lift_s: 0.001,
            transfer_s: 0.001,
            release_s: 0.001,
            park_s: 0.001,
            gate_settle_s: 0.001,
            calibration_settle_s: 0.001,
        };
        let (station, _rx) = Station::new(config).unwrap();
        station.sort(Classification::Pass).unwrap();
        let standby = WaypointTable::with_defaults().get("standby").unwrap();
        assert_eq!(station.actuator_status().position, Some(standby));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut station, _rx) = Station::new(simulation_config()).unwrap();
        station.start();
        station.shutdown();
        station.shutdown();
        station.shutdown();
    }

    #[test]
    fn stopped_loops_join_within_deadline() {
        let (mut station, rx) = Station::new(simulation_config()).unwrap();
        station.start();
        std::thread::sleep(Duration::from_millis(20));
        station.shutdown();
        // Acquisition ran: at least one frame event was published.
        let saw_frame = std::iter::from_fn(|| rx.try_recv().ok())
            .any(|e| matches!(e, StationEvent::FrameReady(_)));
        assert!(saw_frame);
    }

    #[test]
    fn emergency_stop_disarms_and_halts_conveyor() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        station.arm(true);
        station.set_conveyor(60, ConveyorDirection::Forward).unwrap();

        station.emergency_stop();
        let snap = station.state().snapshot();
        assert!(!snap.armed);
        assert!(!snap.conveyor_running);
    }

    #[test]
    fn threshold_passthrough_clamps() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        station.set_threshold(1.4);
        assert_eq!(station.threshold(), 1.0);
    }

    #[test]
    fn joint_info_lists_six_joints() {
        let (station, _rx) = Station::new(simulation_config()).unwrap();
        assert_eq!(station.joint_info().len(), 6);
    }

    #[test]
    fn loop_handle_stop_is_bounded() {
        let handle = LoopHandle::spawn("stubborn", |_stop| {
            std::thread::sleep(Duration::from_secs(5));
        });
        let started = Instant::now();
        assert!(!handle.stop(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
