//! Edge-triggered inspection loop.
//!
//! Polls the break-beam sensor and, on each rising edge while the
//! station is armed and the conveyor runs, drives one part through
//! capture, classification and sorting. The frame is grabbed right at
//! the edge, while the part is still under the camera. The whole
//! handling path runs on the loop thread, so at most one part is ever
//! in flight here; a settle cooldown after the action debounces the
//! trailing edge of the same part.

use crate::sequencer::SortingSequencer;
use sortline_common::events::{EventSink, StationEvent};
use sortline_common::hal::driver::SensingBackend;
use sortline_common::inspect::ClassificationProvider;
use sortline_common::motion::MotionError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The detection worker. Built once at startup, consumed by
/// [`InspectionLoop::run`] on its own thread.
pub struct InspectionLoop {
    backend: Arc<dyn SensingBackend>,
    classifier: Arc<dyn ClassificationProvider>,
    sequencer: Arc<SortingSequencer>,
    state: sortline_common::state::SharedSystemState,
    events: EventSink,
    poll_period: Duration,
    settle: Duration,
}

impl InspectionLoop {
    /// Wire up the loop. Periods come from `[timing]`.
    pub fn new(
        backend: Arc<dyn SensingBackend>,
        classifier: Arc<dyn ClassificationProvider>,
        sequencer: Arc<SortingSequencer>,
        state: sortline_common::state::SharedSystemState,
        events: EventSink,
        poll_period: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            backend,
            classifier,
            sequencer,
            state,
            events,
            poll_period,
            settle,
        }
    }

    /// Poll until `stop` is raised.
    ///
    /// The sensor is only read while the station is armed and the
    /// conveyor runs; a disarmed station sleeps through the cycle
    /// without touching the beam. While armed, the level is compared
    /// with the previous sample and only a low-to-high transition
    /// counts as a part; the previous level updates every armed cycle
    /// whether or not it triggered.
    pub fn run(self, stop: Arc<AtomicBool>) {
        info!(
            "inspection loop started (poll {:?}, settle {:?})",
            self.poll_period, self.settle
        );
        let mut previous = false;
        let mut cooldown_until: Option<Instant> = None;

        while !stop.load(Ordering::SeqCst) {
            let snapshot = self.state.snapshot();
            if snapshot.armed && snapshot.conveyor_running {
                let current = self.backend.read_sensor();
                let in_cooldown = cooldown_until.is_some_and(|until| Instant::now() < until);

                if current && !previous && !in_cooldown {
                    self.handle_part();
                    cooldown_until = Some(Instant::now() + self.settle);
                }
                previous = current;
            }
            std::thread::sleep(self.poll_period);
        }
        info!("inspection loop stopped");
    }

    /// Capture, classify and sort one detected part.
    ///
    /// The frame must be grabbed immediately, before the conveyor
    /// carries the part out of view. Every failure along the way lets
    /// the part run through unsorted; the core never guesses a verdict
    /// and never retries a part.
    fn handle_part(&self) {
        debug!("sensor edge: part detected");
        self.events.emit(StationEvent::SensorTriggered);

        let Some(frame) = self.backend.grab_frame() else {
            warn!("no frame available, part passes unsorted");
            return;
        };

        let verdict = match self.classifier.classify(&frame) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("classification failed, part passes unsorted: {e}");
                return;
            }
        };
        info!(
            "verdict: {:?} (confidence {:.2})",
            verdict.classification, verdict.confidence
        );
        self.events.emit(StationEvent::DetectionResult {
            classification: verdict.classification,
            defect_kind: verdict.defect_kind,
            confidence: verdict.confidence,
        });

        let success = match self.sequencer.execute_sequence(verdict.classification) {
            Ok(()) => true,
            Err(MotionError::Busy) => {
                warn!("actuator busy, part passes unsorted");
                false
            }
            Err(e) => {
                error!("sorting failed: {e}");
                false
            }
        };
        self.events.emit(StationEvent::ActionCompleted {
            target: verdict.classification,
            success,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::LoopHandle;
    use parking_lot::Mutex;
    use sortline_common::config::SequenceTimings;
    use sortline_common::events::event_channel;
    use sortline_common::hal::driver::HalError;
    use sortline_common::hal::types::{ConveyorDirection, Frame};
    use sortline_common::inspect::{ClassifyError, DefectKind, Verdict};
    use sortline_common::motion::{WaypointTable, default_joints};
    use sortline_common::state::SharedSystemState;
    use sortline_hal::{Actuator, ArmActuator};
    use sortline_hal::backends::simulation::SimulatedBus;
    use std::collections::VecDeque;
    use std::sync::mpsc::Receiver;

    /// Backend replaying a scripted sensor trace; holds the last level
    /// once the script runs out. Timestamps the first high read and
    /// the first grab so tests can measure edge-to-capture latency.
    struct ScriptedBackend {
        script: Mutex<VecDeque<bool>>,
        last: Mutex<bool>,
        first_high_at: Mutex<Option<Instant>>,
        first_grab_at: Mutex<Option<Instant>>,
    }

    impl ScriptedBackend {
        fn new(levels: &[bool]) -> Self {
            Self {
                script: Mutex::new(levels.iter().copied().collect()),
                last: Mutex::new(false),
                first_high_at: Mutex::new(None),
                first_grab_at: Mutex::new(None),
            }
        }

        fn edge_to_grab(&self) -> Option<Duration> {
            let high = (*self.first_high_at.lock())?;
            let grab = (*self.first_grab_at.lock())?;
            Some(grab.duration_since(high))
        }
    }

    impl SensingBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn read_sensor(&self) -> bool {
            let mut last = self.last.lock();
            if let Some(level) = self.script.lock().pop_front() {
                *last = level;
            }
            if *last {
                self.first_high_at.lock().get_or_insert_with(Instant::now);
            }
            *last
        }

        fn grab_frame(&self) -> Option<Frame> {
            self.first_grab_at.lock().get_or_insert_with(Instant::now);
            Some(Frame {
                width: 2,
                height: 2,
                channels: 1,
                data: vec![0; 4],
            })
        }

        fn is_camera_available(&self) -> bool {
            true
        }

        fn set_conveyor(&self, _: u8, _: ConveyorDirection) -> Result<(), HalError> {
            Ok(())
        }

        fn set_relay(&self, _: bool) -> Result<(), HalError> {
            Ok(())
        }

        fn relay_state(&self) -> bool {
            false
        }

        fn shutdown(&self) -> Result<(), HalError> {
            Ok(())
        }
    }

    /// Classifier replying with a fixed result.
    struct FixedClassifier(Result<Verdict, ClassifyError>);

    impl ClassificationProvider for FixedClassifier {
        fn classify(&self, _: &Frame) -> Result<Verdict, ClassifyError> {
            self.0.clone()
        }
    }

    fn fast_timings() -> SequenceTimings {
        SequenceTimings {
            approach_s: 0.001,
            descend_s: 0.001,
            grab_s: 0.001,
            lift_s: 0.001,
            transfer_s: 0.001,
            release_s: 0.001,
            park_s: 0.001,
            gate_settle_s: 0.001,
            calibration_settle_s: 0.001,
        }
    }

    fn armed_state() -> SharedSystemState {
        let state = SharedSystemState::new();
        state.set_armed(true);
        state.set_conveyor_running(true);
        state
    }

    /// Run the loop over a sensor trace and collect everything it
    /// emits before the script (and a grace period) is exhausted.
    fn run_trace(
        levels: &[bool],
        classifier: FixedClassifier,
        state: SharedSystemState,
    ) -> Vec<StationEvent> {
        let backend = Arc::new(ScriptedBackend::new(levels));
        let bus = Arc::new(SimulatedBus::new());
        let arm = ArmActuator::new(bus, default_joints()).unwrap();
        let sequencer = Arc::new(SortingSequencer::new(
            Actuator::Arm(arm),
            WaypointTable::with_defaults(),
            fast_timings(),
        ));
        let (sink, rx) = event_channel();

        let worker = InspectionLoop::new(
            backend,
            Arc::new(classifier),
            sequencer,
            state,
            sink,
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        let handle = LoopHandle::spawn("inspection", |stop| worker.run(stop));

        // Enough cycles for the whole script plus the settle holds.
        std::thread::sleep(Duration::from_millis(150));
        assert!(handle.stop(Duration::from_secs(1)));
        drain(rx)
    }

    fn drain(rx: Receiver<StationEvent>) -> Vec<StationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn triggers(events: &[StationEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StationEvent::SensorTriggered))
            .count()
    }

    #[test]
    fn rising_edge_fires_once_across_sustained_high() {
        let events = run_trace(
            &[false, true, true, true, true, true],
            FixedClassifier(Ok(Verdict::pass(0.95))),
            armed_state(),
        );
        assert_eq!(triggers(&events), 1);
    }

    #[test]
    fn pass_verdict_runs_full_event_sequence() {
        let events = run_trace(
            &[false, true],
            FixedClassifier(Ok(Verdict::pass(0.95))),
            armed_state(),
        );

        assert!(matches!(events[0], StationEvent::SensorTriggered));
        assert!(matches!(
            events[1],
            StationEvent::DetectionResult {
                classification: sortline_common::inspect::Classification::Pass,
                defect_kind: None,
                ..
            }
        ));
        assert!(matches!(
            events[2],
            StationEvent::ActionCompleted { success: true, .. }
        ));
    }

    #[test]
    fn defect_verdict_reports_kind() {
        let events = run_trace(
            &[false, true],
            FixedClassifier(Ok(Verdict::defect(DefectKind::Bridge, 0.4))),
            armed_state(),
        );
        assert!(events.iter().any(|e| matches!(
            e,
            StationEvent::DetectionResult {
                defect_kind: Some(DefectKind::Bridge),
                ..
            }
        )));
    }

    #[test]
    fn disarmed_station_ignores_edges() {
        let state = SharedSystemState::new();
        state.set_conveyor_running(true);
        let events = run_trace(
            &[false, true, false, true],
            FixedClassifier(Ok(Verdict::pass(0.95))),
            state,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn stopped_conveyor_ignores_edges() {
        let state = SharedSystemState::new();
        state.set_armed(true);
        let events = run_trace(
            &[false, true, false, true],
            FixedClassifier(Ok(Verdict::pass(0.95))),
            state,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn classifier_failure_lets_part_pass_unsorted() {
        let events = run_trace(
            &[false, true],
            FixedClassifier(Err(ClassifyError::Provider("model offline".to_string()))),
            armed_state(),
        );
        assert_eq!(triggers(&events), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, StationEvent::DetectionResult { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StationEvent::ActionCompleted { .. })));
    }

    #[test]
    fn frame_is_grabbed_at_the_edge_not_after_settle() {
        // A generous settle must delay only the next trigger, never
        // the capture of the current part.
        let settle = Duration::from_millis(150);
        let backend = Arc::new(ScriptedBackend::new(&[false, true, true]));
        let bus = Arc::new(SimulatedBus::new());
        let arm = ArmActuator::new(bus, default_joints()).unwrap();
        let sequencer = Arc::new(SortingSequencer::new(
            Actuator::Arm(arm),
            WaypointTable::with_defaults(),
            fast_timings(),
        ));
        let (sink, _rx) = event_channel();

        let worker = InspectionLoop::new(
            backend.clone(),
            Arc::new(FixedClassifier(Ok(Verdict::pass(0.95)))),
            sequencer,
            armed_state(),
            sink,
            Duration::from_millis(1),
            settle,
        );
        let handle = LoopHandle::spawn("inspection", |stop| worker.run(stop));

        let deadline = Instant::now() + Duration::from_secs(2);
        while backend.edge_to_grab().is_none() {
            assert!(Instant::now() < deadline, "part was never captured");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.stop(Duration::from_secs(1)));

        let delay = backend.edge_to_grab().unwrap();
        assert!(
            delay < settle / 2,
            "edge-to-grab delay {delay:?} should be a poll period, not the settle"
        );
    }

    #[test]
    fn separate_parts_trigger_separately() {
        // Two clean pulses, spaced past the settle cooldown.
        let mut levels = vec![false, true, true, false];
        levels.extend(std::iter::repeat(false).take(20));
        levels.extend([true, true, false]);
        let events = run_trace(
            &levels,
            FixedClassifier(Ok(Verdict::pass(0.95))),
            armed_state(),
        );
        assert_eq!(triggers(&events), 2);
    }
}
