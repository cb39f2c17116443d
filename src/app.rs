//! Application composition root.
//!
//! Wires config, the acquisition device, the CSV sink, and console rendering
//! into one recording session, and connects process signals to shutdown.

use crate::config::{Config, DeviceKind};
use crate::defaults;
use crate::device::open_device;
use crate::error::{EegSyncError, Result};
use crate::markers::MarkerSchedule;
use crate::output::render_event;
use crate::pipeline::sink::{CsvSink, RecordSink, default_output_path};
use crate::pipeline::types::{SessionEvent, SessionSummary};
use crate::pipeline::{Recorder, RecordingControl};
use crate::sys;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Command-line overrides for a recording. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub video: Option<PathBuf>,
    /// Record EEG only; never prompt for a video.
    pub no_video: bool,
    pub markers: Option<PathBuf>,
    /// Exact output file, bypassing the generated name.
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub subject: Option<String>,
    pub countdown: Option<Duration>,
    pub device: Option<DeviceKind>,
    pub serial_port: Option<String>,
    pub sample_rate: Option<u32>,
    pub summary_json: bool,
    pub quiet: bool,
    pub verbosity: u8,
}

impl RecordOptions {
    /// Layers the command-line values over `config`.
    pub fn apply(&self, config: &mut Config) {
        if self.no_video {
            config.playback.video = None;
        } else if let Some(ref video) = self.video {
            config.playback.video = Some(video.clone());
        }
        if let Some(ref markers) = self.markers {
            config.markers.path = markers.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.recording.output_dir = dir.clone();
        }
        if let Some(ref subject) = self.subject {
            config.recording.subject = Some(subject.clone());
        }
        if let Some(countdown) = self.countdown {
            // Countdown is announced in whole seconds.
            config.recording.countdown_secs = countdown.as_secs_f64().ceil() as u64;
        }
        if let Some(kind) = self.device {
            config.device.kind = kind;
        }
        if let Some(ref port) = self.serial_port {
            config.device.serial_port = port.clone();
        }
        if let Some(rate) = self.sample_rate {
            config.device.sample_rate = rate;
        }
    }

    /// Where the CSV for this recording goes.
    pub fn output_path(&self, config: &Config) -> PathBuf {
        match self.output {
            Some(ref path) => path.clone(),
            None => default_output_path(
                &config.recording.output_dir,
                config.recording.subject.as_deref(),
            ),
        }
    }
}

/// Path of the JSON summary written next to `output`.
pub fn summary_path(output: &Path) -> PathBuf {
    output.with_extension("summary.json")
}

/// Writes `summary` as pretty JSON.
pub fn write_summary(path: &Path, summary: &SessionSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| EegSyncError::persistence(format!("cannot encode summary: {}", e)))?;
    std::fs::write(path, json + "\n").map_err(|e| {
        EegSyncError::persistence(format!("cannot write {}: {}", path.display(), e))
    })
}

/// Reads a video path from `input`. Empty input means "record without video".
///
/// Surrounding quotes (as left by drag-and-drop into a terminal) are removed.
pub fn read_video_path(input: &mut impl BufRead) -> Result<Option<PathBuf>> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(trimmed)))
}

/// Asks for the video on the terminal.
fn prompt_video_path() -> Result<Option<PathBuf>> {
    eprintln!("Please enter the path to your cue video file (empty for EEG only):");
    eprint!("Video path: ");
    io::stderr().flush().ok();
    read_video_path(&mut io::stdin().lock())
}

/// Loads the marker schedule, continuing without markers if it is unusable.
fn load_schedule(path: &Path, quiet: bool) -> MarkerSchedule {
    let (schedule, warning) = MarkerSchedule::load_or_empty(path);
    if let Some(e) = warning {
        eprintln!("eegsync: warning: {}. Continuing without markers.", e);
        return schedule;
    }
    if !quiet {
        eprintln!(
            "Loaded {} markers from {}",
            schedule.len(),
            path.display()
        );
        eprint!("{}", schedule.preview(5));
    }
    schedule
}

/// Tells the operator which data source feeds the recording.
pub fn device_banner(config: &Config) -> String {
    match config.device.kind {
        DeviceKind::CytonDaisy => format!(
            "Connecting to OpenBCI Cyton + Daisy on {}...",
            config.device.serial_port
        ),
        DeviceKind::Synthetic => format!(
            "Using synthetic data source at {} Hz (no EEG hardware)",
            config.device.sample_rate
        ),
    }
}

/// Renders session events until the session finishes or every sender is gone.
fn spawn_renderer(
    rx: crossbeam_channel::Receiver<SessionEvent>,
    quiet: bool,
    verbosity: u8,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in rx.iter() {
            let finished = matches!(event, SessionEvent::Finished(_));
            if !quiet {
                render_event(&event, verbosity);
            }
            if finished {
                break;
            }
        }
    })
}

/// Calls shutdown on the first SIGINT or SIGTERM.
async fn shutdown_on_signal(control: RecordingControl, quiet: bool) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("eegsync: {}", e);
                return;
            }
        }
    }
    if !quiet {
        crate::output::clear_line();
        eprintln!("\nStopping recording...");
    }
    // Shutdown joins a player and may wait on the device; keep it off the runtime.
    if let Err(e) = tokio::task::spawn_blocking(move || control.shutdown()).await {
        eprintln!("eegsync: shutdown task failed: {}", e);
    }
}

/// Wait for SIGTERM signal.
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| EegSyncError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}

/// Run a recording session until Ctrl+C, SIGTERM, or a fatal error.
pub async fn run_record_command(mut config: Config, options: RecordOptions) -> anyhow::Result<()> {
    options.apply(&mut config);
    config.validate()?;

    if config.playback.video.is_none() && !options.no_video && sys::stdin_is_terminal() {
        config.playback.video = tokio::task::spawn_blocking(prompt_video_path).await??;
    }
    if config.playback.video.is_none() && !options.quiet {
        eprintln!("No video selected. Recording EEG only.");
    }

    let schedule = load_schedule(&config.markers.path, options.quiet);
    let device = open_device(&config.device)?;
    if !options.quiet || config.device.kind == DeviceKind::Synthetic {
        // Shown even in quiet mode when the data is synthetic.
        eprintln!("{}", device_banner(&config));
    }
    let output_path = options.output_path(&config);

    let (tx, rx) = crossbeam_channel::bounded(defaults::EVENT_BUFFER);
    let renderer = spawn_renderer(rx, options.quiet, options.verbosity);

    let recorder = Recorder::new(config.recorder_config()).with_event_sender(tx);
    let control = recorder.control();
    let signals = tokio::spawn(shutdown_on_signal(control.clone(), options.quiet));

    let sink_path = output_path.clone();
    let open_sink = move || -> Result<Box<dyn RecordSink>> {
        Ok(Box::new(CsvSink::create(&sink_path)?))
    };
    let result = tokio::task::spawn_blocking(move || {
        recorder.run(device, open_sink, schedule)
    })
    .await;

    signals.abort();
    signals.await.ok();
    drop(control);
    if renderer.join().is_err() {
        eprintln!("eegsync: event renderer panicked");
    }

    let summary = result??;
    if options.summary_json && summary.total_samples > 0 {
        let path = summary_path(&output_path);
        write_summary(&path, &summary)?;
        if !options.quiet {
            eprintln!("Summary saved to: {}", path.display());
        }
    }
    Ok(())
}
