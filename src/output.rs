//! Event rendering for terminal output.
//! Used by `eegsync record` to show session progress on stderr.

use crate::pipeline::{RateReport, SessionEvent, SessionSummary};
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line (replaces the status line).
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// How a rendered event occupies the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Overwrites the current line in place (countdown, rate).
    Status(String),
    /// A line of its own.
    Line(String),
    /// Several lines, e.g. the session summary.
    Block(Vec<String>),
}

/// Status line for a rate report.
pub fn format_rate(report: &RateReport) -> String {
    format!(
        "Samples: {:6} | Rate: {:6.1} Hz | Avg Rate: {:6.1} Hz | Recording: {:6.1}s",
        report.samples, report.instantaneous_hz, report.average_hz, report.recording_secs
    )
}

/// Closing lines for a finished session.
pub fn format_summary(summary: &SessionSummary) -> Vec<String> {
    let mut lines = vec![
        "Streaming stopped.".to_string(),
        format!("Total samples collected: {}", summary.total_samples),
    ];
    if !summary.output.is_empty() {
        lines.push(format!("Data saved to: {}", summary.output));
    }
    if !summary.device.is_empty() {
        lines.push(format!("Data source: {}", summary.device));
    }
    if let Some(rate) = summary.average_rate_hz {
        lines.push(format!("Average sampling rate: {:.1} Hz", rate));
    }
    if summary.duration_secs > 0.0 {
        lines.push(format!("Recording time: {:.1}s", summary.duration_secs));
    }
    lines
}

/// Renders an event without color, or `None` if it has nothing to show.
///
/// `verbosity` 0 hides marker clears; they only add noise at the default level.
pub fn format_event(event: &SessionEvent, verbosity: u8) -> Option<Rendered> {
    let rendered = match event {
        SessionEvent::Countdown { remaining_secs } => {
            Rendered::Status(format!("Starting in: {} seconds", remaining_secs))
        }
        SessionEvent::PlayerFailed { player, error } => {
            Rendered::Line(format!("{} unavailable, trying next player ({})", player, error))
        }
        SessionEvent::PlaybackStarted { player } => {
            Rendered::Line(format!("Successfully started {}", player))
        }
        SessionEvent::PlaybackUnavailable => Rendered::Line(
            "No video player could be started. Continuing with EEG only (install mpv)".to_string(),
        ),
        SessionEvent::StreamingStarted { output } => Rendered::Block(vec![
            format!("Recording EEG data to: {}", output),
            "Press Ctrl+C to stop recording".to_string(),
        ]),
        SessionEvent::Marker { elapsed_secs, label } => {
            Rendered::Line(format!("[MARKER] Time: {:.2}s - {}", elapsed_secs, label))
        }
        SessionEvent::MarkerCleared { elapsed_secs } => {
            if verbosity == 0 {
                return None;
            }
            Rendered::Line(format!("[MARKER] Time: {:.2}s - cleared", elapsed_secs))
        }
        SessionEvent::Rate(report) => Rendered::Status(format_rate(report)),
        SessionEvent::Finished(summary) => Rendered::Block(format_summary(summary)),
    };
    Some(rendered)
}

/// Render a session event to stderr.
pub fn render_event(event: &SessionEvent, verbosity: u8) {
    let Some(rendered) = format_event(event, verbosity) else {
        return;
    };

    let color = match event {
        SessionEvent::Marker { .. } => CYAN,
        SessionEvent::PlaybackStarted { .. } => GREEN,
        SessionEvent::PlayerFailed { .. } | SessionEvent::PlaybackUnavailable => YELLOW,
        SessionEvent::MarkerCleared { .. } => DIM,
        SessionEvent::StreamingStarted { .. } | SessionEvent::Finished(_) => BOLD,
        _ => "",
    };

    match rendered {
        Rendered::Status(text) => {
            eprint!("\r\x1b[2K{DIM}{text}{RESET}");
            io::stderr().flush().ok();
        }
        Rendered::Line(text) => {
            clear_line();
            eprintln!("{color}{text}{RESET}");
        }
        Rendered::Block(lines) => {
            clear_line();
            for line in lines {
                eprintln!("{color}{line}{RESET}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SessionSummary {
        SessionSummary {
            total_samples: 1250,
            average_rate_hz: Some(124.96),
            output: "eeg_data_20240101_120000.csv".to_string(),
            device: "synthetic".to_string(),
            duration_secs: 10.04,
            player: Some("MPV".to_string()),
        }
    }

    #[test]
    fn test_rate_status_line() {
        let line = format_rate(&RateReport {
            samples: 250,
            instantaneous_hz: 125.0,
            average_hz: 124.5,
            recording_secs: 2.0,
        });
        assert_eq!(
            line,
            "Samples:    250 | Rate:  125.0 Hz | Avg Rate:  124.5 Hz | Recording:    2.0s"
        );
    }

    #[test]
    fn test_marker_line() {
        let rendered = format_event(
            &SessionEvent::Marker {
                elapsed_secs: 12.346,
                label: "left_hand".to_string(),
            },
            0,
        );
        assert_eq!(
            rendered,
            Some(Rendered::Line("[MARKER] Time: 12.35s - left_hand".to_string()))
        );
    }

    #[test]
    fn test_marker_cleared_hidden_by_default() {
        let event = SessionEvent::MarkerCleared { elapsed_secs: 1.0 };
        assert_eq!(format_event(&event, 0), None);
        assert!(format_event(&event, 1).is_some());
    }

    #[test]
    fn test_countdown_is_status() {
        let rendered = format_event(&SessionEvent::Countdown { remaining_secs: 3 }, 0);
        assert_eq!(
            rendered,
            Some(Rendered::Status("Starting in: 3 seconds".to_string()))
        );
    }

    #[test]
    fn test_summary_lines() {
        let lines = format_summary(&summary());
        assert_eq!(lines[0], "Streaming stopped.");
        assert_eq!(lines[1], "Total samples collected: 1250");
        assert_eq!(lines[2], "Data saved to: eeg_data_20240101_120000.csv");
        assert_eq!(lines[3], "Data source: synthetic");
        assert_eq!(lines[4], "Average sampling rate: 125.0 Hz");
        assert_eq!(lines[5], "Recording time: 10.0s");
    }

    #[test]
    fn test_summary_without_rate_or_output() {
        let lines = format_summary(&SessionSummary {
            total_samples: 0,
            average_rate_hz: None,
            output: String::new(),
            device: String::new(),
            duration_secs: 0.0,
            player: None,
        });
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_render_event_does_not_panic() {
        render_event(&SessionEvent::PlaybackUnavailable, 0);
        render_event(&SessionEvent::Finished(summary()), 2);
    }
}
