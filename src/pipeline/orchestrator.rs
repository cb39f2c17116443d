//! Recording lifecycle: ordered startup, the streaming run, and shutdown.
//!
//! Startup order is fixed: prepare device → open sink → countdown → launch
//! video → start device stream → set the start reference → start the marker
//! scheduler and rate monitor → stream on the caller's thread.
//!
//! Shutdown may be requested at any point from any thread through a
//! [`RecordingControl`]. It runs once; later calls get the same summary.

use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::device::AcquisitionDevice;
use crate::error::{EegSyncError, Result};
use crate::markers::{MarkerSchedule, MarkerScheduler};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::rate_monitor::RateMonitor;
use crate::pipeline::session::SessionState;
use crate::pipeline::sink::RecordSink;
use crate::pipeline::streaming::StreamingLoop;
use crate::pipeline::types::{SessionEvent, SessionSummary, publish};
use crate::playback::{PlaybackProcess, PlayerCandidate, launch_first};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep during the countdown, so shutdown is noticed promptly.
const COUNTDOWN_SLICE: Duration = Duration::from_millis(50);

/// Configuration for one recording.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Wait before playback and streaming start.
    pub countdown: Duration,
    /// Idle wait between streaming loop iterations.
    pub stream_poll_interval: Duration,
    /// Marker scheduler polling interval.
    pub marker_poll_interval: Duration,
    /// How long a marker label stays active.
    pub marker_clear_after: Duration,
    /// Rate monitor reporting interval.
    pub monitor_interval: Duration,
    /// Rate monitor moving-average window.
    pub monitor_window: usize,
    /// Stimulus video; `None` records EEG only.
    pub video: Option<PathBuf>,
    /// Players tried in order for the video.
    pub players: Vec<PlayerCandidate>,
    /// Grace period between SIGTERM and SIGKILL for the player.
    pub player_terminate_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(defaults::COUNTDOWN_SECS),
            stream_poll_interval: Duration::from_micros(defaults::STREAM_POLL_INTERVAL_US),
            marker_poll_interval: Duration::from_millis(defaults::MARKER_POLL_INTERVAL_MS),
            marker_clear_after: Duration::from_millis(defaults::MARKER_CLEAR_AFTER_MS),
            monitor_interval: Duration::from_millis(defaults::MONITOR_INTERVAL_MS),
            monitor_window: defaults::MONITOR_WINDOW,
            video: None,
            players: PlayerCandidate::defaults(),
            player_terminate_timeout: Duration::from_secs(defaults::PLAYER_TERMINATE_TIMEOUT_SECS),
        }
    }
}

/// Resources released by shutdown. Each is taken out exactly once.
#[derive(Default)]
pub(crate) struct SessionResources {
    pub(crate) device: Option<Box<dyn AcquisitionDevice>>,
    /// Whether `device.start()` succeeded, so shutdown knows to stop it.
    pub(crate) device_started: bool,
    pub(crate) sink: Option<Box<dyn RecordSink>>,
    pub(crate) playback: Option<PlaybackProcess>,
}

struct SessionShared {
    state: Arc<SessionState>,
    resources: Mutex<SessionResources>,
    summary: OnceLock<SessionSummary>,
    output: OnceLock<String>,
    device_name: OnceLock<String>,
    clock: Arc<dyn Clock>,
    error_reporter: Arc<dyn ErrorReporter>,
    event_tx: Option<Sender<SessionEvent>>,
}

impl SessionShared {
    fn resources(&self) -> MutexGuard<'_, SessionResources> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: SessionEvent) {
        publish(self.event_tx.as_ref(), event);
    }

    fn shutdown(&self) -> SessionSummary {
        self.summary.get_or_init(|| self.release_all()).clone()
    }

    /// Stops streaming and releases every resource still held.
    ///
    /// Failures are reported and swallowed so every later step still runs.
    fn release_all(&self) -> SessionSummary {
        self.state.stop_streaming();
        let stopped_at = self.clock.now();

        let (playback, device, device_started, sink) = {
            let mut resources = self.resources();
            (
                resources.playback.take(),
                resources.device.take(),
                std::mem::take(&mut resources.device_started),
                resources.sink.take(),
            )
        };

        let player = playback.as_ref().map(|p| p.player().to_string());
        if let Some(mut playback) = playback
            && let Err(e) = playback.terminate()
        {
            self.error_reporter.report("playback", &e);
        }

        if let Some(mut device) = device {
            if device_started && let Err(e) = device.stop() {
                self.error_reporter.report(device.name(), &e);
            }
            if let Err(e) = device.release() {
                self.error_reporter.report(device.name(), &e);
            }
        }

        if let Some(mut sink) = sink
            && let Err(e) = sink.close()
        {
            self.error_reporter.report(sink.name(), &e);
        }

        let duration_secs = self
            .state
            .start_reference()
            .map(|start| stopped_at.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0);

        let summary = SessionSummary {
            total_samples: self.state.sample_count(),
            average_rate_hz: self.state.average_rate(),
            output: self.output.get().cloned().unwrap_or_default(),
            device: self.device_name.get().cloned().unwrap_or_default(),
            duration_secs,
            player,
        };
        self.publish(SessionEvent::Finished(summary.clone()));
        summary
    }
}

/// Cloneable handle to a session; usable from signal handlers and other threads.
#[derive(Clone)]
pub struct RecordingControl {
    shared: Arc<SessionShared>,
}

impl RecordingControl {
    /// Ends the session: stops streaming, terminates playback, releases the
    /// device, closes the sink.
    ///
    /// Safe to call any number of times from any thread. Concurrent callers
    /// wait for the first one and all get the same summary.
    pub fn shutdown(&self) -> SessionSummary {
        self.shared.shutdown()
    }

    /// Summary of a finished session, `None` while it is still running.
    pub fn summary(&self) -> Option<SessionSummary> {
        self.shared.summary.get().cloned()
    }

    pub fn state(&self) -> &SessionState {
        &self.shared.state
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state.is_streaming()
    }
}

/// Runs one recording session.
pub struct Recorder {
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    error_reporter: Arc<dyn ErrorReporter>,
    event_tx: Option<Sender<SessionEvent>>,
    shared: OnceLock<Arc<SessionShared>>,
}

impl Recorder {
    /// Creates a recorder with the system clock and stderr error reporting.
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            error_reporter: Arc::new(LogReporter),
            event_tx: None,
            shared: OnceLock::new(),
        }
    }

    /// Sets a custom clock (for deterministic testing).
    ///
    /// Builder methods must be called before [`Recorder::control`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Publishes [`SessionEvent`]s to `tx` without ever blocking.
    pub fn with_event_sender(mut self, tx: Sender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Handle that can end the session from another thread.
    pub fn control(&self) -> RecordingControl {
        RecordingControl {
            shared: self.shared().clone(),
        }
    }

    fn shared(&self) -> &Arc<SessionShared> {
        self.shared.get_or_init(|| {
            Arc::new(SessionShared {
                state: Arc::new(SessionState::new()),
                resources: Mutex::new(SessionResources::default()),
                summary: OnceLock::new(),
                output: OnceLock::new(),
                device_name: OnceLock::new(),
                clock: self.clock.clone(),
                error_reporter: self.error_reporter.clone(),
                event_tx: self.event_tx.clone(),
            })
        })
    }

    /// Runs the session to completion on the calling thread.
    ///
    /// Returns when shutdown is requested through a [`RecordingControl`] or
    /// when the device or sink fails. In the failure case shutdown has
    /// already run and the summary is available from the control.
    pub fn run<F>(
        self,
        device: Box<dyn AcquisitionDevice>,
        open_sink: F,
        schedule: MarkerSchedule,
    ) -> Result<SessionSummary>
    where
        F: FnOnce() -> Result<Box<dyn RecordSink>>,
    {
        let shared = self.shared().clone();

        if let Some(ref video) = self.config.video
            && !video.is_file()
        {
            let error = EegSyncError::VideoNotFound {
                path: video.display().to_string(),
            };
            shared.shutdown();
            return Err(error);
        }

        // Only ever set here, before the device is visible to shutdown.
        shared.device_name.set(device.name().to_string()).ok();
        if self
            .adopt(&shared, device, |r, d| r.device = Some(d))
            .is_some()
        {
            return Ok(shared.shutdown());
        }
        let prepared = self.with_device(&shared, |device| {
            device.prepare()?;
            device.layout().validate()
        });
        if let Err(e) = prepared {
            return Err(self.fail(&shared, "device", e));
        }
        if shared.state.is_stopped() {
            return Ok(shared.shutdown());
        }

        let sink = match open_sink() {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail(&shared, "sink", e)),
        };
        // Only ever set here, before the sink is visible to shutdown.
        shared.output.set(sink.location()).ok();
        if let Some(mut sink) = self.adopt(&shared, sink, |r, s| r.sink = Some(s)) {
            if let Err(e) = sink.close() {
                self.error_reporter.report("sink", &e);
            }
            return Ok(shared.shutdown());
        }

        if !self.countdown(&shared) {
            return Ok(shared.shutdown());
        }

        self.launch_playback(&shared);

        let started = {
            let mut resources = shared.resources();
            match resources.device.as_deref_mut().map(|device| device.start()) {
                Some(Ok(())) => {
                    resources.device_started = true;
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Ok(()),
            }
        };
        if let Err(e) = started {
            return Err(self.fail(&shared, "device", e));
        }

        if !shared.state.begin_streaming() {
            return Ok(shared.shutdown());
        }
        shared.state.mark_start_reference(self.clock.now());
        shared.publish(SessionEvent::StreamingStarted {
            output: shared.output.get().cloned().unwrap_or_default(),
        });

        let mut scheduler =
            MarkerScheduler::new(schedule, self.config.marker_clear_after);
        let mut monitor = RateMonitor::new(self.config.monitor_interval, self.config.monitor_window);
        if let Some(ref tx) = self.event_tx {
            scheduler = scheduler.with_event_sender(tx.clone());
            monitor = monitor.with_event_sender(tx.clone());
        }
        let threads = vec![
            scheduler.spawn(
                shared.state.clone(),
                self.clock.clone(),
                self.config.marker_poll_interval,
            ),
            monitor.spawn(shared.state.clone(), self.clock.clone()),
        ];

        let streamed =
            StreamingLoop::new(self.config.stream_poll_interval).run(&shared.state, &shared.resources);
        let result = match streamed {
            Ok(_) => Ok(shared.shutdown()),
            Err(e) => Err(self.fail(&shared, "stream", e)),
        };

        join_all(threads);
        result
    }

    /// Runs `f` on the device while holding the resource lock.
    ///
    /// Succeeds without calling `f` if shutdown already took the device.
    fn with_device(
        &self,
        shared: &SessionShared,
        f: impl FnOnce(&mut dyn AcquisitionDevice) -> Result<()>,
    ) -> Result<()> {
        let mut resources = shared.resources();
        match resources.device.as_deref_mut() {
            Some(device) => f(device),
            None => Ok(()),
        }
    }

    /// Hands `resource` to the session unless shutdown already ran, in which
    /// case it is given back for the caller to dispose of.
    fn adopt<T>(
        &self,
        shared: &SessionShared,
        resource: T,
        place: impl FnOnce(&mut SessionResources, T),
    ) -> Option<T> {
        let mut resources = shared.resources();
        if shared.state.is_stopped() {
            return Some(resource);
        }
        place(&mut resources, resource);
        None
    }

    /// Reports a fatal error, shuts down, and hands the error back.
    fn fail(&self, shared: &SessionShared, component: &str, error: EegSyncError) -> EegSyncError {
        self.error_reporter.report(component, &error);
        shared.shutdown();
        error
    }

    /// Counts down in whole seconds. Returns false if shutdown interrupted it.
    fn countdown(&self, shared: &SessionShared) -> bool {
        let total = self.config.countdown;
        if total.is_zero() {
            return !shared.state.is_stopped();
        }

        let started = Instant::now();
        let mut announced = None;
        loop {
            if shared.state.is_stopped() {
                return false;
            }
            let elapsed = started.elapsed();
            if elapsed >= total {
                return true;
            }
            let remaining_secs = (total - elapsed).as_secs_f64().ceil() as u64;
            if announced != Some(remaining_secs) {
                announced = Some(remaining_secs);
                shared.publish(SessionEvent::Countdown { remaining_secs });
            }
            thread::sleep(COUNTDOWN_SLICE.min(total - elapsed));
        }
    }

    /// Starts the first available player. Failure only degrades the session.
    fn launch_playback(&self, shared: &SessionShared) {
        let Some(ref video) = self.config.video else {
            return;
        };

        let process = launch_first(
            &self.config.players,
            video,
            self.config.player_terminate_timeout,
            |candidate, error| {
                shared.publish(SessionEvent::PlayerFailed {
                    player: candidate.name.clone(),
                    error: error.to_string(),
                });
            },
        );

        match process {
            Some(process) => {
                let player = process.player().to_string();
                if let Some(mut late) = self.adopt(shared, process, |r, p| r.playback = Some(p)) {
                    if let Err(e) = late.terminate() {
                        self.error_reporter.report("playback", &e);
                    }
                    return;
                }
                shared.publish(SessionEvent::PlaybackStarted { player });
            }
            None => {
                self.error_reporter.report(
                    "playback",
                    &EegSyncError::PlaybackLaunch {
                        message: "no video player could be started, recording EEG only"
                            .to_string(),
                    },
                );
                shared.publish(SessionEvent::PlaybackUnavailable);
            }
        }
    }
}

fn join_all(threads: Vec<JoinHandle<()>>) {
    for handle in threads {
        if let Err(panic_info) = handle.join() {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            eprintln!("eegsync: session thread panicked: {msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelLayout, MockDevice};
    use crate::markers::MarkerEvent;
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::sink::CollectorSink;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fast_config() -> RecorderConfig {
        RecorderConfig {
            countdown: Duration::ZERO,
            stream_poll_interval: Duration::from_micros(200),
            marker_poll_interval: Duration::from_millis(1),
            monitor_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn quiet_recorder(config: RecorderConfig) -> (Recorder, CollectingReporter) {
        let reporter = CollectingReporter::new();
        let recorder = Recorder::new(config).with_error_reporter(Arc::new(reporter.clone()));
        (recorder, reporter)
    }

    fn sink_factory(sink: CollectorSink) -> impl FnOnce() -> Result<Box<dyn RecordSink>> {
        move || Ok(Box::new(sink) as Box<dyn RecordSink>)
    }

    /// Calls shutdown once `done` holds, or after a safety timeout.
    fn stop_when(
        control: RecordingControl,
        done: impl Fn(&RecordingControl) -> bool + Send + 'static,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !done(&control) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(2));
            }
            control.shutdown();
        })
    }

    #[test]
    fn test_config_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.countdown, Duration::from_secs(15));
        assert_eq!(config.marker_clear_after, Duration::from_millis(100));
        assert_eq!(config.monitor_window, 10);
        assert_eq!(config.players.len(), 4);
        assert!(config.video.is_none());
    }

    #[test]
    fn test_full_session_records_every_sample() {
        let device = MockDevice::new().with_generated_batches(4, 25);
        let tracker = device.tracker();
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (recorder, reporter) = quiet_recorder(fast_config());

        let watcher = {
            let collected = collected.clone();
            stop_when(recorder.control(), move |_| collected.len() >= 100)
        };
        let summary = recorder
            .run(Box::new(device), sink_factory(sink), MarkerSchedule::empty())
            .unwrap();
        watcher.join().unwrap();

        assert_eq!(summary.total_samples, 100);
        assert_eq!(summary.output, "memory");
        assert_eq!(summary.device, "mock");
        assert_eq!(summary.player, None);
        let indices: Vec<u64> = collected.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, (1..=100).collect::<Vec<u64>>());
        assert!(collected.records().iter().all(|r| r.label.is_empty()));

        let calls = tracker.calls();
        assert_eq!((calls.prepare, calls.start, calls.stop, calls.release), (1, 1, 1, 1));
        assert_eq!(collected.close_calls(), 1);
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn test_shutdown_twice_is_shutdown_once() {
        let device = MockDevice::new().with_generated_batches(1, 10);
        let tracker = device.tracker();
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (recorder, _) = quiet_recorder(fast_config());
        let control = recorder.control();

        let watcher = {
            let collected = collected.clone();
            stop_when(recorder.control(), move |_| collected.len() >= 10)
        };
        let summary = recorder
            .run(Box::new(device), sink_factory(sink), MarkerSchedule::empty())
            .unwrap();
        watcher.join().unwrap();

        assert_eq!(control.shutdown(), summary);
        assert_eq!(control.shutdown(), summary);
        assert_eq!(control.summary(), Some(summary));
        assert_eq!(tracker.calls().release, 1);
        assert_eq!(tracker.calls().stop, 1);
        assert_eq!(collected.close_calls(), 1);
    }

    #[test]
    fn test_concurrent_shutdowns_agree() {
        let device = MockDevice::new().with_generated_batches(1, 5);
        let tracker = device.tracker();
        let (recorder, _) = quiet_recorder(fast_config());
        let control = recorder.control();

        let runner = thread::spawn(move || {
            recorder.run(
                Box::new(device),
                sink_factory(CollectorSink::new()),
                MarkerSchedule::empty(),
            )
        });
        while !control.is_streaming() && control.summary().is_none() {
            thread::sleep(Duration::from_millis(1));
        }

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let control = control.clone();
                thread::spawn(move || control.shutdown())
            })
            .collect();
        let summaries: Vec<SessionSummary> =
            callers.into_iter().map(|h| h.join().unwrap()).collect();
        let returned = runner.join().unwrap().unwrap();

        assert!(summaries.iter().all(|s| *s == returned));
        assert_eq!(tracker.calls().release, 1);
    }

    #[test]
    fn test_shutdown_during_countdown_never_streams() {
        let device = MockDevice::new().with_generated_batches(1, 10);
        let tracker = device.tracker();
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let config = RecorderConfig {
            countdown: Duration::from_secs(60),
            ..fast_config()
        };
        let (tx, rx) = crossbeam_channel::bounded(64);
        let (recorder, _) = quiet_recorder(config);
        let recorder = recorder.with_event_sender(tx);

        let started = Instant::now();
        let watcher = stop_when(recorder.control(), move |_| {
            started.elapsed() > Duration::from_millis(200)
        });
        let summary = recorder
            .run(Box::new(device), sink_factory(sink), MarkerSchedule::empty())
            .unwrap();
        watcher.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(summary.total_samples, 0);
        assert_eq!(summary.duration_secs, 0.0);
        assert_eq!(tracker.calls().start, 0);
        assert_eq!(tracker.calls().release, 1);
        assert!(collected.is_empty());
        assert_eq!(collected.close_calls(), 1);

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::StreamingStarted { .. })));
        assert!(matches!(events.last(), Some(SessionEvent::Finished(_))));
    }

    #[test]
    fn test_countdown_announces_seconds() {
        let config = RecorderConfig {
            countdown: Duration::from_millis(1500),
            ..fast_config()
        };
        let (tx, rx) = crossbeam_channel::bounded(64);
        let (recorder, _) = quiet_recorder(config);
        let recorder = recorder.with_event_sender(tx);

        let watcher = stop_when(recorder.control(), |c| c.is_streaming());
        recorder
            .run(
                Box::new(MockDevice::new()),
                sink_factory(CollectorSink::new()),
                MarkerSchedule::empty(),
            )
            .unwrap();
        watcher.join().unwrap();

        let ticks: Vec<u64> = rx
            .try_iter()
            .filter_map(|e| match e {
                SessionEvent::Countdown { remaining_secs } => Some(remaining_secs),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![2, 1]);
    }

    #[test]
    fn test_invalid_layout_aborts_before_sink() {
        let layout = ChannelLayout {
            primary: vec![1],
            auxiliary: vec![],
            timestamp: 7,
            rows: 2,
        };
        let device = MockDevice::new().with_layout(layout);
        let tracker = device.tracker();
        let opened = Arc::new(AtomicBool::new(false));
        let (recorder, reporter) = quiet_recorder(fast_config());

        let flag = opened.clone();
        let result = recorder.run(
            Box::new(device),
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(Box::new(CollectorSink::new()) as Box<dyn RecordSink>)
            },
            MarkerSchedule::empty(),
        );

        match result {
            Err(EegSyncError::Device { message }) => assert!(message.contains("row 7"), "{}", message),
            other => panic!("expected device error, got {:?}", other.map(|_| ())),
        }
        assert!(!opened.load(Ordering::SeqCst));
        let calls = tracker.calls();
        assert_eq!((calls.prepare, calls.start, calls.release), (1, 0, 1));
        assert_eq!(reporter.reports()[0].0, "device");
    }

    #[test]
    fn test_prepare_failure_never_opens_sink() {
        let device = MockDevice::new()
            .with_prepare_failure()
            .with_error_message("no dongle");
        let tracker = device.tracker();
        let opened = Arc::new(AtomicBool::new(false));
        let (recorder, reporter) = quiet_recorder(fast_config());
        let control = recorder.control();

        let flag = opened.clone();
        let result = recorder.run(
            Box::new(device),
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(Box::new(CollectorSink::new()) as Box<dyn RecordSink>)
            },
            MarkerSchedule::empty(),
        );

        match result {
            Err(EegSyncError::Device { message }) => assert_eq!(message, "no dongle"),
            other => panic!("expected device error, got {:?}", other.map(|_| ())),
        }
        assert!(!opened.load(Ordering::SeqCst));
        assert_eq!(tracker.calls().release, 1);
        assert_eq!(tracker.calls().stop, 0);
        assert!(control.summary().is_some());
        assert_eq!(reporter.reports()[0].0, "device");
    }

    #[test]
    fn test_start_failure_closes_sink() {
        let device = MockDevice::new().with_start_failure();
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (recorder, _) = quiet_recorder(fast_config());

        let result = recorder.run(Box::new(device), sink_factory(sink), MarkerSchedule::empty());

        assert!(matches!(result, Err(EegSyncError::Device { .. })));
        assert_eq!(collected.close_calls(), 1);
    }

    #[test]
    fn test_poll_failure_ends_session_with_summary() {
        let device = MockDevice::new()
            .with_generated_batches(3, 10)
            .with_poll_failure_after(2);
        let tracker = device.tracker();
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (recorder, reporter) = quiet_recorder(fast_config());
        let control = recorder.control();

        let result = recorder.run(Box::new(device), sink_factory(sink), MarkerSchedule::empty());

        assert!(matches!(result, Err(EegSyncError::Device { .. })));
        assert_eq!(collected.len(), 20);
        assert_eq!(control.summary().map(|s| s.total_samples), Some(20));
        assert_eq!(tracker.calls().stop, 1);
        assert_eq!(tracker.calls().release, 1);
        assert!(!control.is_streaming());
        assert_eq!(reporter.reports()[0].0, "stream");
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let device = MockDevice::new().with_generated_batches(2, 10);
        let tracker = device.tracker();
        let (recorder, _) = quiet_recorder(fast_config());

        let result = recorder.run(
            Box::new(device),
            sink_factory(CollectorSink::new().with_failure_after(5)),
            MarkerSchedule::empty(),
        );

        assert!(matches!(result, Err(EegSyncError::Persistence { .. })));
        assert_eq!(tracker.calls().release, 1);
    }

    #[test]
    fn test_sink_open_failure_releases_device() {
        let device = MockDevice::new();
        let tracker = device.tracker();
        let (recorder, _) = quiet_recorder(fast_config());

        let result = recorder.run(
            Box::new(device),
            || Err(EegSyncError::persistence("read-only filesystem")),
            MarkerSchedule::empty(),
        );

        assert!(matches!(result, Err(EegSyncError::Persistence { .. })));
        assert_eq!(tracker.calls().release, 1);
    }

    #[test]
    fn test_missing_video_refused_before_device() {
        let device = MockDevice::new();
        let tracker = device.tracker();
        let config = RecorderConfig {
            video: Some(PathBuf::from("/nonexistent/cue-video.mp4")),
            ..fast_config()
        };
        let (recorder, _) = quiet_recorder(config);

        let result = recorder.run(
            Box::new(device),
            sink_factory(CollectorSink::new()),
            MarkerSchedule::empty(),
        );

        assert!(matches!(result, Err(EegSyncError::VideoNotFound { .. })));
        assert_eq!(tracker.calls(), Default::default());
    }

    #[test]
    fn test_all_players_failing_still_records() {
        let video = tempfile::NamedTempFile::new().unwrap();
        let config = RecorderConfig {
            video: Some(video.path().to_path_buf()),
            players: vec![
                PlayerCandidate::new("Ghost", "eegsync-no-such-player", &["{video}"]),
                PlayerCandidate::new("Phantom", "eegsync-no-such-player-either", &[]),
            ],
            ..fast_config()
        };
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (tx, rx) = crossbeam_channel::bounded(64);
        let (recorder, reporter) = quiet_recorder(config);
        let recorder = recorder.with_event_sender(tx);

        let watcher = {
            let collected = collected.clone();
            stop_when(recorder.control(), move |_| collected.len() >= 10)
        };
        let summary = recorder
            .run(
                Box::new(MockDevice::new().with_generated_batches(1, 10)),
                sink_factory(sink),
                MarkerSchedule::empty(),
            )
            .unwrap();
        watcher.join().unwrap();

        assert_eq!(summary.total_samples, 10);
        assert_eq!(summary.player, None);
        let events: Vec<SessionEvent> = rx.try_iter().collect();
        let failed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PlayerFailed { .. }))
            .count();
        assert_eq!(failed, 2);
        assert!(events.contains(&SessionEvent::PlaybackUnavailable));
        assert!(reporter.reports().iter().any(|(c, _)| c == "playback"));
    }

    #[test]
    fn test_playback_terminated_on_shutdown() {
        let video = tempfile::NamedTempFile::new().unwrap();
        let config = RecorderConfig {
            video: Some(video.path().to_path_buf()),
            players: vec![PlayerCandidate::new(
                "Sleeper",
                "sh",
                &["-c", "sleep 30", "{video}"],
            )],
            player_terminate_timeout: Duration::from_secs(2),
            ..fast_config()
        };
        let (recorder, _) = quiet_recorder(config);

        let watcher = stop_when(recorder.control(), |c| c.is_streaming());
        let summary = recorder
            .run(
                Box::new(MockDevice::new()),
                sink_factory(CollectorSink::new()),
                MarkerSchedule::empty(),
            )
            .unwrap();
        watcher.join().unwrap();

        assert_eq!(summary.player.as_deref(), Some("Sleeper"));
    }

    #[test]
    fn test_markers_reach_records() {
        let schedule = MarkerSchedule::from_events(vec![MarkerEvent {
            offset_seconds: 0.0,
            label: "go".to_string(),
        }]);
        let config = RecorderConfig {
            marker_clear_after: Duration::from_secs(60),
            ..fast_config()
        };
        let sink = CollectorSink::new();
        let collected = sink.collected();
        let (recorder, _) = quiet_recorder(config);
        let control = recorder.control();

        let device = crate::device::SyntheticDevice::new(500).unwrap();
        let watcher = {
            let collected = collected.clone();
            stop_when(recorder.control(), move |_| {
                collected.records().iter().any(|r| &*r.label == "go")
            })
        };
        recorder
            .run(Box::new(device), sink_factory(sink), schedule)
            .unwrap();
        watcher.join().unwrap();

        assert!(!control.is_streaming());
        let records = collected.records();
        assert!(records.iter().any(|r| &*r.label == "go"));
        // Once set, the label stays for the rest of this short session.
        let first_go = records.iter().position(|r| &*r.label == "go").unwrap();
        assert!(records[first_go..].iter().all(|r| &*r.label == "go"));
    }
}
