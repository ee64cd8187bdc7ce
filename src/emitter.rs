//! Real-time playback of a finished timeline: each envelope is handed to the
//! sink when the wall clock reaches its timestamp relative to a baseline
//! taken at playback start. Cancellation is polled while waiting so an
//! interrupt never blocks longer than the poll interval.

use crate::config::Config;
use crate::wire::{Envelope, EventPayload, Timeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Longest uninterrupted sleep while waiting for the next event.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared cancellation flag, set from the signal handler and observed by the
/// playback loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where emitted envelopes go. The network transport is the production
/// implementation; tests collect into memory.
pub trait EventSink {
    fn send(&mut self, envelope: &Envelope);
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Play the timeline against the wall clock.
///
/// With a pre-roll configured, a track.prepare envelope goes out first at a
/// negative timestamp and the baseline moves forward by the countdown, so
/// event zero still fires exactly at its target. An abort emits track.abort
/// at the current playback position before returning.
pub fn run(
    cfg: &Config,
    timeline: &Timeline,
    sink: &mut dyn EventSink,
    cancel: &CancelToken,
) -> Outcome {
    let mut baseline = Instant::now();

    if let Some(countdown) = cfg.preroll {
        // receivers resolve this path on their side, so it must be absolute
        let path = std::fs::canonicalize(&cfg.input_file)
            .unwrap_or_else(|_| cfg.input_file.clone());
        sink.send(&Envelope::new(
            -countdown,
            EventPayload::TrackPrepare {
                countdown,
                path: path.display().to_string(),
            },
        ));
        baseline += Duration::from_secs_f64(countdown);
        info!("pre-roll: {countdown:.1}s");
    }

    info!("emitting {} events", timeline.len());
    for envelope in timeline {
        if !wait_until(baseline, envelope.timestamp, cancel) {
            let position = baseline.elapsed().as_secs_f64();
            sink.send(&Envelope::new(
                position,
                EventPayload::TrackAbort {
                    reason: "user_interrupt".into(),
                },
            ));
            info!("aborted at {position:.2}s");
            return Outcome::Aborted;
        }
        sink.send(envelope);
    }

    info!("done");
    Outcome::Completed
}

/// Sleep in poll-sized slices until `baseline + timestamp`. Returns false as
/// soon as cancellation is observed.
fn wait_until(baseline: Instant, timestamp: f64, cancel: &CancelToken) -> bool {
    // negative timestamps (pre-roll) are already due
    let target = if timestamp > 0.0 {
        baseline + Duration::from_secs_f64(timestamp)
    } else {
        baseline
    };
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= target {
            return true;
        }
        std::thread::sleep((target - now).min(POLL_INTERVAL));
    }
}
