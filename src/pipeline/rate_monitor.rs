//! Diagnostic sample-rate monitor.
//!
//! Reads the session's sample count at a fixed interval and reports the
//! instantaneous and moving-average rate. It never touches recorded data.

use crate::clock::Clock;
use crate::pipeline::session::SessionState;
use crate::pipeline::types::{RateReport, SessionEvent, publish};
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep, so a stop request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Bounded window of instantaneous rate readings.
#[derive(Debug, Clone)]
pub struct RateWindow {
    capacity: usize,
    readings: VecDeque<f64>,
    last: Option<(u64, Instant)>,
}

impl RateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
            last: None,
        }
    }

    /// Records the sample count observed at `at`.
    ///
    /// The first call only sets the baseline. Returns `(instantaneous, average)`
    /// in Hz once a time delta is available.
    pub fn record(&mut self, count: u64, at: Instant) -> Option<(f64, f64)> {
        let Some((last_count, last_at)) = self.last else {
            self.last = Some((count, at));
            return None;
        };

        let dt = at.saturating_duration_since(last_at).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        self.last = Some((count, at));

        let instantaneous = count.saturating_sub(last_count) as f64 / dt;
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(instantaneous);

        self.average().map(|average| (instantaneous, average))
    }

    /// Mean of the readings currently in the window.
    pub fn average(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        Some(self.readings.iter().sum::<f64>() / self.readings.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

pub struct RateMonitor {
    interval: Duration,
    window: usize,
    event_tx: Option<Sender<SessionEvent>>,
}

impl RateMonitor {
    pub fn new(interval: Duration, window: usize) -> Self {
        Self {
            interval,
            window,
            event_tx: None,
        }
    }

    pub fn with_event_sender(mut self, tx: Sender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Runs on its own thread until the session leaves the streaming phase.
    pub fn spawn(self, state: Arc<SessionState>, clock: Arc<dyn Clock>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut window = RateWindow::new(self.window);
            window.record(state.sample_count(), clock.now());

            while state.is_streaming() {
                if !sleep_while_streaming(&state, self.interval) {
                    break;
                }

                let now = clock.now();
                let samples = state.sample_count();
                let Some((instantaneous_hz, average_hz)) = window.record(samples, now) else {
                    continue;
                };
                state.set_average_rate(average_hz);

                let recording_secs = state
                    .start_reference()
                    .map(|start| now.saturating_duration_since(start).as_secs_f64())
                    .unwrap_or(0.0);
                publish(
                    self.event_tx.as_ref(),
                    SessionEvent::Rate(RateReport {
                        samples,
                        instantaneous_hz,
                        average_hz,
                        recording_secs,
                    }),
                );
            }
        })
    }
}

/// Sleeps for `total` in short slices. Returns false if streaming stopped first.
fn sleep_while_streaming(state: &SessionState, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !state.is_streaming() {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
    state.is_streaming()
}
