//! External video player processes.

use crate::defaults::VIDEO_PLACEHOLDER;
use crate::error::{EegSyncError, Result};
use crate::sys;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between exit checks while waiting for a player to terminate.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A video player that may be installed on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCandidate {
    /// Display name, e.g. "MPV".
    pub name: String,
    /// Executable, looked up in `PATH` unless it contains a slash.
    pub program: String,
    /// Arguments; `{video}` is replaced with the video path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl PlayerCandidate {
    pub fn new(name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Players tried in order when none are configured.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("MPV", "mpv", &["{video}", "--fullscreen", "--no-terminal"]),
            Self::new(
                "VLC",
                "vlc",
                &["{video}", "--fullscreen", "--no-video-title-show", "--quiet"],
            ),
            Self::new("GNOME Videos", "totem", &["{video}", "--fullscreen"]),
            Self::new(
                "FFplay",
                "ffplay",
                &["{video}", "-fs", "-autoexit", "-loglevel", "quiet"],
            ),
        ]
    }

    /// Arguments with the video path substituted.
    ///
    /// If no argument mentions the placeholder, the path is appended.
    pub fn command_args(&self, video: &Path) -> Vec<String> {
        let video = video.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(VIDEO_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(VIDEO_PLACEHOLDER, &video)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(video.into_owned());
        }
        args
    }

    /// Resolves the executable the way the shell would.
    pub fn resolve(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if self.program.contains('/') {
            return is_executable(program).then(|| program.to_path_buf());
        }
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| is_executable(candidate))
    }

    pub fn is_installed(&self) -> bool {
        self.resolve().is_some()
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// A running video player. Dropping the handle kills the process.
#[derive(Debug)]
pub struct PlaybackProcess {
    player: String,
    child: Option<Child>,
    terminate_timeout: Duration,
}

impl PlaybackProcess {
    /// Starts `candidate` playing `video`.
    ///
    /// Success means the process was spawned; the player itself may still fail
    /// to open the file.
    pub fn spawn(candidate: &PlayerCandidate, video: &Path, terminate_timeout: Duration) -> Result<Self> {
        let child = Command::new(&candidate.program)
            .args(candidate.command_args(video))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| EegSyncError::PlaybackLaunch {
                message: format!("{} ({}): {}", candidate.name, candidate.program, e),
            })?;

        Ok(Self {
            player: candidate.name.clone(),
            child: Some(child),
            terminate_timeout,
        })
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// True while the player has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Sends SIGTERM, waits up to the grace period, then kills.
    ///
    /// Calling it again after the process is gone does nothing. The handle
    /// keeps the child until it has been reaped, so a failed attempt leaves
    /// it to `Drop`.
    pub fn terminate(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        stop_child(child, &self.player, self.terminate_timeout)?;
        self.child = None;
        Ok(())
    }
}

fn stop_child(child: &mut Child, player: &str, grace: Duration) -> Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    if sys::terminate_process(child.id()) {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        eprintln!(
            "eegsync: {} did not exit within {:?}, killing it",
            player, grace
        );
    }

    child.kill()?;
    child.wait()?;
    Ok(())
}

impl Drop for PlaybackProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && matches!(child.try_wait(), Ok(None))
        {
            if let Err(e) = child.kill() {
                eprintln!("eegsync: failed to kill {}: {}", self.player, e);
            }
            if let Err(e) = child.wait() {
                eprintln!("eegsync: failed to reap {}: {}", self.player, e);
            }
        }
    }
}

/// Tries each candidate in order; the first one that starts wins.
///
/// `on_failure` sees every candidate that could not be started. Returns
/// `None` when all of them failed.
pub fn launch_first(
    candidates: &[PlayerCandidate],
    video: &Path,
    terminate_timeout: Duration,
    mut on_failure: impl FnMut(&PlayerCandidate, &EegSyncError),
) -> Option<PlaybackProcess> {
    for candidate in candidates {
        match PlaybackProcess::spawn(candidate, video, terminate_timeout) {
            Ok(process) => return Some(process),
            Err(e) => on_failure(candidate, &e),
        }
    }
    None
}
