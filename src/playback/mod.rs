//! Stimulus video playback through an external player.

pub mod player;

pub use player::{PlaybackProcess, PlayerCandidate, launch_first};
