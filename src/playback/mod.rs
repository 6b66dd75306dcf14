//! Playback and mix synchronization
//!
//! The waveform/audio engine itself lives outside this crate; `WaveformEngine`
//! is the boundary it has to implement.

pub mod sync;

pub use sync::{EngineEvent, MixSynchronizer, UpdateOrigin, SEEK_EPSILON};

use crate::store::AudioTrack;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to load tracks: {0}")]
    LoadFailed(String),
    #[error("Engine command failed: {0}")]
    Command(String),
}

/// What the engine needs to load one track.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTrack {
    pub track_id: String,
    pub url: String,
    pub duration: f64,
}

impl From<&AudioTrack> for EngineTrack {
    fn from(track: &AudioTrack) -> Self {
        Self {
            track_id: track.id.clone(),
            url: track.url.clone(),
            duration: track.duration,
        }
    }
}

/// Commands the synchronizer sends to the rendering/audio engine.
pub trait WaveformEngine {
    fn load(&mut self, tracks: &[EngineTrack]) -> Result<(), EngineError>;
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn seek(&mut self, position: f64) -> Result<(), EngineError>;
    fn set_speed(&mut self, rate: f64) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError>;
    fn set_loop(&mut self, enabled: bool) -> Result<(), EngineError>;
    /// Pixels per second
    fn set_zoom(&mut self, px_per_sec: f64) -> Result<(), EngineError>;
    fn set_track_volume(&mut self, track_id: &str, volume: f32) -> Result<(), EngineError>;
    fn set_track_pan(&mut self, track_id: &str, pan: f32) -> Result<(), EngineError>;
    fn set_track_muted(&mut self, track_id: &str, muted: bool) -> Result<(), EngineError>;
}
