//! Fire-and-forget station events.
//!
//! The loops notify the outside world (display, operator console)
//! through an mpsc channel. Emission never blocks and never fails the
//! emitting loop: a gone or saturated consumer only drops events.

use crate::hal::types::Frame;
use crate::inspect::{Classification, DefectKind};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::trace;

/// Notifications emitted by the control core.
#[derive(Debug, Clone)]
pub enum StationEvent {
    /// A part interrupted the break beam.
    SensorTriggered,
    /// Classification finished for the detected part.
    DetectionResult {
        /// Pass/defect judgement.
        classification: Classification,
        /// Defect category, if any.
        defect_kind: Option<DefectKind>,
        /// Classifier confidence.
        confidence: f64,
    },
    /// The sorting action for a part finished.
    ActionCompleted {
        /// Which chute the part was routed toward.
        target: Classification,
        /// Whether the motion sequence completed.
        success: bool,
    },
    /// A fresh display frame is available.
    FrameReady(Frame),
}

/// Sending half of the event stream held by the loops.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<StationEvent>,
}

impl EventSink {
    /// Emit an event. Dropped silently if no receiver remains.
    pub fn emit(&self, event: StationEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver gone, dropping event");
        }
    }
}

/// Create an event stream: a sink for the loops and a receiver for the
/// consumer (UI layer, test harness).
pub fn event_channel() -> (EventSink, Receiver<StationEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSink { tx }, rx)
}
