//! System diagnostics for a recording setup.
//!
//! Verifies the data source, installed video players, the marker schedule
//! and the output directory.

use crate::config::{Config, DeviceConfig, DeviceKind};
use crate::markers::MarkerSchedule;
use crate::playback::PlayerCandidate;
use crate::sys;
use owo_colors::OwoColorize;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Free space below which a long recording may not fit.
const LOW_DISK_MB: u64 = 500;

/// Result of a single check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Check passed; the string is a short detail for the report
    Ok(String),
    /// The thing being checked is missing
    NotFound,
    /// Present but with issues (e.g., unparseable marker file)
    Warning(String),
}

/// Whether the configured data source is reachable.
pub fn check_device(device: &DeviceConfig) -> CheckResult {
    match device.kind {
        DeviceKind::Synthetic => CheckResult::Warning(format!(
            "synthetic data at {} Hz, no EEG hardware",
            device.sample_rate
        )),
        DeviceKind::CytonDaisy if Path::new(&device.serial_port).exists() => {
            CheckResult::Ok(format!("cyton-daisy on {}", device.serial_port))
        }
        DeviceKind::CytonDaisy => CheckResult::NotFound,
    }
}

/// Whether a player's executable can be found.
pub fn check_player(candidate: &PlayerCandidate) -> CheckResult {
    match candidate.resolve() {
        Some(path) => CheckResult::Ok(path.display().to_string()),
        None => CheckResult::NotFound,
    }
}

/// Whether the marker schedule loads, and how many markers it holds.
pub fn check_markers(path: &Path) -> CheckResult {
    if !path.exists() {
        return CheckResult::NotFound;
    }
    match MarkerSchedule::load(path) {
        Ok(schedule) if schedule.is_empty() => {
            CheckResult::Warning("file has no markers".to_string())
        }
        Ok(schedule) => CheckResult::Ok(format!(
            "{} markers over {:.1}s",
            schedule.len(),
            schedule.span_seconds()
        )),
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

/// Whether the configured video file exists.
pub fn check_video(video: Option<&Path>) -> CheckResult {
    match video {
        None => CheckResult::Warning("not configured (will prompt at start)".to_string()),
        Some(path) if path.is_file() => CheckResult::Ok(path.display().to_string()),
        Some(_) => CheckResult::NotFound,
    }
}

/// Whether the output directory exists and has room for a recording.
pub fn check_output_dir(dir: &Path) -> CheckResult {
    if !dir.is_dir() {
        return CheckResult::NotFound;
    }
    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return CheckResult::Warning("path contains a NUL byte".to_string());
    };
    match sys::available_disk_mb(&c_path) {
        Some(mb) if mb < LOW_DISK_MB => {
            CheckResult::Warning(format!("only {} MB free", mb))
        }
        Some(mb) => CheckResult::Ok(format!("{} MB free", mb)),
        None => CheckResult::Warning("could not query free space".to_string()),
    }
}

fn print_result(label: &str, result: &CheckResult) {
    print!("{:<22}", format!("{}:", label));
    match result {
        CheckResult::Ok(detail) => println!("{} {}", "✓ OK".green(), detail.dimmed()),
        CheckResult::NotFound => println!("{}", "✗ NOT FOUND".red()),
        CheckResult::Warning(msg) => println!("{} {}", "⚠ WARNING:".yellow(), msg),
    }
}

/// Run all checks for `config` and print results.
///
/// Returns true when a recording can start with video playback.
pub fn check_setup(config: &Config) -> bool {
    println!("Checking recording setup...\n");

    let device = check_device(&config.device);
    print_result("EEG device", &device);
    if device == CheckResult::NotFound {
        println!(
            "  No serial port at {}. Plug in the dongle or pass --serial-port.",
            config.device.serial_port
        );
    }
    println!();

    println!("Video players:");
    let mut any_player = false;
    for candidate in &config.playback.players {
        let result = check_player(candidate);
        any_player |= matches!(result, CheckResult::Ok(_));
        print_result(&format!("  {}", candidate.name), &result);
    }
    if !any_player {
        println!("  Install one: sudo apt install mpv  (Debian/Ubuntu)");
        println!("               sudo pacman -S mpv    (Arch)");
    }

    println!();
    let video = check_video(config.playback.video.as_deref());
    print_result("Video", &video);

    let markers = check_markers(&config.markers.path);
    print_result("Marker file", &markers);
    if markers == CheckResult::NotFound {
        println!(
            "  Expected {} with rows of time_seconds,label",
            config.markers.path.display()
        );
    }

    let output = check_output_dir(&config.recording.output_dir);
    print_result("Output directory", &output);

    println!();
    let ready = any_player
        && !matches!(output, CheckResult::NotFound)
        && !matches!(device, CheckResult::NotFound);
    if ready {
        println!("{}", "✓ Ready to record.".green());
    } else if matches!(device, CheckResult::NotFound) {
        println!("{}", "✗ EEG board not connected.".red());
    } else if !any_player {
        println!(
            "{}",
            "⚠ No video player found. Recording will continue with EEG only.".yellow()
        );
    } else {
        println!("{}", "✗ Output directory does not exist.".red());
    }
    ready
}
