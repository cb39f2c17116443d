//! Shared state of one recording session.
//!
//! Every field has exactly one writer:
//! - `phase`: the lifecycle (Idle → Streaming on start, → Stopped on shutdown)
//! - `start_reference`: the lifecycle, once
//! - `sample_count`: the streaming loop
//! - `label`: the marker scheduler
//! - `average_rate`: the rate monitor
//!
//! Readers tolerate a few milliseconds of staleness.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;

const IDLE: u8 = 0;
const STREAMING: u8 = 1;
const STOPPED: u8 = 2;

/// Where the session is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Not streaming yet (device prep, countdown).
    Idle,
    /// Samples are flowing.
    Streaming,
    /// Shutdown has begun; streaming can never start again.
    Stopped,
}

#[derive(Debug)]
pub struct SessionState {
    phase: AtomicU8,
    start_reference: OnceLock<Instant>,
    sample_count: AtomicU64,
    label: RwLock<Arc<str>>,
    average_rate_bits: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(IDLE),
            start_reference: OnceLock::new(),
            sample_count: AtomicU64::new(0),
            label: RwLock::new(Arc::from("")),
            average_rate_bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        match self.phase.load(Ordering::SeqCst) {
            IDLE => StreamPhase::Idle,
            STREAMING => StreamPhase::Streaming,
            _ => StreamPhase::Stopped,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.phase() == StreamPhase::Streaming
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == StreamPhase::Stopped
    }

    /// Idle → Streaming. Returns false if streaming already began or shutdown
    /// already happened.
    pub(crate) fn begin_streaming(&self) -> bool {
        self.phase
            .compare_exchange(IDLE, STREAMING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Any phase → Stopped. Returns true only for the call that made the transition.
    pub(crate) fn stop_streaming(&self) -> bool {
        self.phase.swap(STOPPED, Ordering::SeqCst) != STOPPED
    }

    /// Sets the recording start reference. Only the first call has an effect.
    pub(crate) fn mark_start_reference(&self, at: Instant) -> bool {
        self.start_reference.set(at).is_ok()
    }

    pub fn start_reference(&self) -> Option<Instant> {
        self.start_reference.get().copied()
    }

    /// Claims the next 1-based sample index. Streaming loop only.
    pub(crate) fn next_sample_index(&self) -> u64 {
        self.sample_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count.load(Ordering::SeqCst)
    }

    /// Label active right now; empty when no marker is active.
    pub fn current_label(&self) -> Arc<str> {
        match self.label.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Marker scheduler only.
    pub(crate) fn set_label(&self, label: &str) {
        let mut guard = self.label.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::from(label);
    }

    /// Rate monitor only.
    pub(crate) fn set_average_rate(&self, hz: f64) {
        self.average_rate_bits.store(hz.to_bits(), Ordering::SeqCst);
    }

    /// Latest moving-average sample rate, if the monitor has reported one.
    pub fn average_rate(&self) -> Option<f64> {
        let value = f64::from_bits(self.average_rate_bits.load(Ordering::SeqCst));
        (!value.is_nan()).then_some(value)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_phase_transitions_once_each_way() {
        let state = SessionState::new();
        assert_eq!(state.phase(), StreamPhase::Idle);

        assert!(state.begin_streaming());
        assert!(state.is_streaming());
        assert!(!state.begin_streaming());

        assert!(state.stop_streaming());
        assert!(state.is_stopped());
        assert!(!state.stop_streaming());
        assert!(!state.begin_streaming());
    }

    #[test]
    fn test_stop_before_start_prevents_streaming() {
        let state = SessionState::new();
        assert!(state.stop_streaming());
        assert!(!state.begin_streaming());
        assert_eq!(state.phase(), StreamPhase::Stopped);
    }

    #[test]
    fn test_start_reference_set_once() {
        let state = SessionState::new();
        let first = Instant::now();
        assert!(state.mark_start_reference(first));
        assert!(!state.mark_start_reference(Instant::now()));
        assert_eq!(state.start_reference(), Some(first));
    }

    #[test]
    fn test_sample_indices_are_gapless() {
        let state = SessionState::new();
        let indices: Vec<u64> = (0..5).map(|_| state.next_sample_index()).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.sample_count(), 5);
    }

    #[test]
    fn test_label_defaults_to_empty() {
        let state = SessionState::new();
        assert_eq!(&*state.current_label(), "");
        state.set_label("rest");
        assert_eq!(&*state.current_label(), "rest");
        state.set_label("");
        assert_eq!(&*state.current_label(), "");
    }

    #[test]
    fn test_average_rate_absent_until_reported() {
        let state = SessionState::new();
        assert_eq!(state.average_rate(), None);
        state.set_average_rate(124.5);
        assert_eq!(state.average_rate(), Some(124.5));
    }

    #[test]
    fn test_label_readable_while_written_from_another_thread() {
        let state = Arc::new(SessionState::new());
        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    state.set_label(if i % 2 == 0 { "A" } else { "B" });
                }
            })
        };
        for _ in 0..1000 {
            let label = state.current_label();
            assert!(matches!(&*label, "" | "A" | "B"));
        }
        writer.join().unwrap();
    }
}
