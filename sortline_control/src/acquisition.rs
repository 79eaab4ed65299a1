//! Display frame streaming loop.
//!
//! Pulls frames from the sensing backend at the display rate and
//! publishes them as [`StationEvent::FrameReady`]. Strictly a viewing
//! aid: the inspection loop grabs its own frame at classification
//! time, so a stall here never affects sorting.

use sortline_common::events::{EventSink, StationEvent};
use sortline_common::hal::driver::SensingBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// The frame streaming worker.
pub struct AcquisitionLoop {
    backend: Arc<dyn SensingBackend>,
    events: EventSink,
    frame_period: Duration,
    retry_backoff: Duration,
}

impl AcquisitionLoop {
    /// Wire up the loop. Periods come from `[timing]`.
    pub fn new(
        backend: Arc<dyn SensingBackend>,
        events: EventSink,
        frame_period: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            backend,
            events,
            frame_period,
            retry_backoff,
        }
    }

    /// Stream frames until `stop` is raised.
    ///
    /// A missed frame backs off for the retry period instead of
    /// spinning, and a run of misses is logged once rather than per
    /// frame — a headless station runs without a camera permanently.
    pub fn run(self, stop: Arc<AtomicBool>) {
        info!("acquisition loop started ({:?}/frame)", self.frame_period);
        let mut warned = false;

        while !stop.load(Ordering::SeqCst) {
            match self.backend.grab_frame() {
                Some(frame) => {
                    warned = false;
                    self.events.emit(StationEvent::FrameReady(frame));
                    std::thread::sleep(self.frame_period);
                }
                None => {
                    if !warned {
                        warn!("frame grab failed, backing off");
                        warned = true;
                    }
                    std::thread::sleep(self.retry_backoff);
                }
            }
        }
        info!("acquisition loop stopped");
    }
}
