//! Marker scheduler: turns a schedule of offsets into the session's active label.
//!
//! The scheduler is the only writer of the label. A clear is a deadline owned
//! by the scheduler itself, so a newer label always replaces a pending clear.

use crate::clock::Clock;
use crate::markers::schedule::MarkerSchedule;
use crate::pipeline::session::SessionState;
use crate::pipeline::types::{SessionEvent, publish};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What one scheduler step did to the label.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerAction {
    /// A label became active. `skipped` counts overdue events it superseded.
    Set {
        elapsed_secs: f64,
        label: String,
        skipped: usize,
    },
    /// The active label was cleared.
    Cleared { elapsed_secs: f64 },
}

pub struct MarkerScheduler {
    schedule: MarkerSchedule,
    next: usize,
    clear_after: Duration,
    clear_deadline: Option<f64>,
    event_tx: Option<Sender<SessionEvent>>,
}

impl MarkerScheduler {
    pub fn new(schedule: MarkerSchedule, clear_after: Duration) -> Self {
        Self {
            schedule,
            next: 0,
            clear_after,
            clear_deadline: None,
            event_tx: None,
        }
    }

    pub fn with_event_sender(mut self, tx: Sender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Events not yet consumed.
    pub fn remaining(&self) -> usize {
        self.schedule.len() - self.next
    }

    /// True once every event has fired and no clear is pending.
    pub fn is_finished(&self) -> bool {
        self.remaining() == 0 && self.clear_deadline.is_none()
    }

    /// Advances the schedule to `elapsed_secs` after the start reference.
    ///
    /// Every event with an offset at or before `elapsed_secs` is consumed; only
    /// the last of them becomes the label. A due clear only happens when no new
    /// label fired in the same step.
    pub fn step(&mut self, elapsed_secs: f64, state: &SessionState) -> Option<MarkerAction> {
        let first = self.next;
        let mut due = None;
        while let Some(event) = self.schedule.get(self.next) {
            if event.offset_seconds > elapsed_secs {
                break;
            }
            due = Some(self.next);
            self.next += 1;
        }

        if let Some(index) = due {
            let label = self
                .schedule
                .get(index)
                .map(|event| event.label.clone())
                .unwrap_or_default();
            let skipped = index - first;
            state.set_label(&label);
            self.clear_deadline = Some(elapsed_secs + self.clear_after.as_secs_f64());
            self.publish(SessionEvent::Marker {
                elapsed_secs,
                label: label.clone(),
            });
            return Some(MarkerAction::Set {
                elapsed_secs,
                label,
                skipped,
            });
        }

        match self.clear_deadline {
            Some(deadline) if elapsed_secs >= deadline => {
                self.clear_deadline = None;
                state.set_label("");
                self.publish(SessionEvent::MarkerCleared { elapsed_secs });
                Some(MarkerAction::Cleared { elapsed_secs })
            }
            _ => None,
        }
    }

    /// Runs the scheduler on its own thread until it finishes or the session stops.
    ///
    /// Elapsed time is measured from the session's start reference; until one is
    /// set nothing fires.
    pub fn spawn(
        mut self,
        state: Arc<SessionState>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            while !state.is_stopped() && !self.is_finished() {
                if let Some(start) = state.start_reference() {
                    let elapsed = clock.now().saturating_duration_since(start).as_secs_f64();
                    self.step(elapsed, &state);
                }
                thread::sleep(poll_interval);
            }
        })
    }

    fn publish(&self, event: SessionEvent) {
        publish(self.event_tx.as_ref(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::markers::schedule::MarkerEvent;
    use std::time::Instant;

    fn event(offset: f64, label: &str) -> MarkerEvent {
        MarkerEvent {
            offset_seconds: offset,
            label: label.to_string(),
        }
    }

    fn ab_schedule() -> MarkerSchedule {
        MarkerSchedule::from_events(vec![event(0.5, "A"), event(1.0, "B")])
    }

    fn scheduler(schedule: MarkerSchedule) -> MarkerScheduler {
        MarkerScheduler::new(schedule, Duration::from_millis(100))
    }

    #[test]
    fn test_two_marker_scenario() {
        let state = SessionState::new();
        let mut sched = scheduler(ab_schedule());

        assert_eq!(sched.step(0.2, &state), None);
        assert_eq!(&*state.current_label(), "");

        sched.step(0.6, &state);
        assert_eq!(&*state.current_label(), "A");

        sched.step(0.8, &state);
        assert_eq!(&*state.current_label(), "");

        sched.step(1.1, &state);
        assert_eq!(&*state.current_label(), "B");

        sched.step(1.25, &state);
        assert_eq!(&*state.current_label(), "");
        assert!(sched.is_finished());
    }

    #[test]
    fn test_catch_up_keeps_only_last_overdue_label() {
        let state = SessionState::new();
        let mut sched = scheduler(MarkerSchedule::from_events(vec![
            event(0.1, "A"),
            event(0.2, "B"),
            event(0.3, "C"),
            event(5.0, "D"),
        ]));

        let action = sched.step(0.35, &state);
        assert_eq!(
            action,
            Some(MarkerAction::Set {
                elapsed_secs: 0.35,
                label: "C".to_string(),
                skipped: 2,
            })
        );
        assert_eq!(&*state.current_label(), "C");
        assert_eq!(sched.remaining(), 1);
    }

    #[test]
    fn test_newer_label_replaces_pending_clear() {
        let state = SessionState::new();
        let mut sched = scheduler(MarkerSchedule::from_events(vec![
            event(0.0, "A"),
            event(0.05, "B"),
        ]));

        sched.step(0.0, &state);
        assert_eq!(&*state.current_label(), "A");
        sched.step(0.06, &state);
        assert_eq!(&*state.current_label(), "B");

        // A's clear deadline (0.1) has passed, B's (0.16) has not.
        assert_eq!(sched.step(0.12, &state), None);
        assert_eq!(&*state.current_label(), "B");

        assert_eq!(
            sched.step(0.17, &state),
            Some(MarkerAction::Cleared { elapsed_secs: 0.17 })
        );
        assert_eq!(&*state.current_label(), "");
    }

    #[test]
    fn test_label_due_at_clear_deadline_wins() {
        let state = SessionState::new();
        let mut sched = scheduler(MarkerSchedule::from_events(vec![
            event(0.0, "A"),
            event(0.1, "B"),
        ]));

        sched.step(0.0, &state);
        sched.step(0.1, &state);
        assert_eq!(&*state.current_label(), "B");
    }

    #[test]
    fn test_empty_schedule_never_sets_label() {
        let state = SessionState::new();
        let mut sched = scheduler(MarkerSchedule::empty());
        assert!(sched.is_finished());
        for step in 0..100 {
            assert_eq!(sched.step(step as f64 * 0.1, &state), None);
        }
        assert_eq!(&*state.current_label(), "");
    }

    #[test]
    fn test_labels_fire_in_offset_order_under_jitter() {
        let state = SessionState::new();
        let events: Vec<MarkerEvent> = (0..20)
            .map(|i| event(i as f64 * 0.25, &format!("m{}", i)))
            .collect();
        let mut sched = scheduler(MarkerSchedule::from_events(events));

        let mut fired = Vec::new();
        let mut elapsed = 0.0;
        for jitter in [0.07, 0.31, 0.02, 0.55, 0.13].iter().cycle().take(60) {
            elapsed += jitter;
            if let Some(MarkerAction::Set { label, .. }) = sched.step(elapsed, &state) {
                fired.push(label[1..].parse::<u32>().unwrap());
            }
        }

        assert!(!fired.is_empty());
        assert!(fired.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(fired.last(), Some(&19));
    }

    #[test]
    fn test_events_published() {
        let state = SessionState::new();
        let (tx, rx) = crossbeam_channel::bounded(8);
        let mut sched = scheduler(ab_schedule()).with_event_sender(tx);

        sched.step(0.6, &state);
        sched.step(0.75, &state);

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Marker {
                elapsed_secs: 0.6,
                label: "A".to_string()
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::MarkerCleared { .. }
        ));
    }

    #[test]
    fn test_full_event_channel_does_not_block() {
        let state = SessionState::new();
        let (tx, _rx) = crossbeam_channel::bounded(0);
        let mut sched = scheduler(ab_schedule()).with_event_sender(tx);
        sched.step(2.0, &state);
        assert_eq!(&*state.current_label(), "B");
    }

    #[test]
    fn test_spawned_scheduler_follows_clock() {
        let state = Arc::new(SessionState::new());
        let clock = MockClock::new();
        assert!(state.begin_streaming());
        assert!(state.mark_start_reference(clock.now()));

        let handle = scheduler(ab_schedule()).spawn(
            state.clone(),
            Arc::new(clock.clone()),
            Duration::from_millis(1),
        );

        clock.advance(Duration::from_millis(600));
        let deadline = Instant::now() + Duration::from_secs(2);
        while &*state.current_label() != "A" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(&*state.current_label(), "A");

        clock.advance(Duration::from_millis(500));
        while &*state.current_label() != "B" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(&*state.current_label(), "B");

        clock.advance(Duration::from_millis(200));
        handle.join().unwrap();
        assert_eq!(&*state.current_label(), "");
    }

    #[test]
    fn test_spawned_scheduler_exits_on_stop() {
        let state = Arc::new(SessionState::new());
        let clock = MockClock::new();
        let handle = scheduler(ab_schedule()).spawn(
            state.clone(),
            Arc::new(clock),
            Duration::from_millis(1),
        );

        state.stop_streaming();
        handle.join().unwrap();
        assert_eq!(&*state.current_label(), "");
    }
}
