//! Two-way binding between the store and the waveform engine.
//!
//! Outbound, `flush` diffs the store against what the engine was last told
//! and sends only the changes. Inbound, `handle_engine_event` mirrors
//! engine events into the store and records them as the engine's own state,
//! so they never bounce back as commands.

use std::collections::HashMap;

use super::{EngineError, EngineTrack, WaveformEngine};
use crate::store::{self, AppStore, AudioTrack, PIXELS_PER_SECOND};

/// Position differences at or below this are not worth a seek.
pub const SEEK_EPSILON: f64 = 0.1;

/// Who caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    User,
    Engine,
}

/// Events reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Ready { duration: f64 },
    TimeUpdate(f64),
    Play,
    Pause,
    Finish,
    LoadError(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AppliedMix {
    volume: f32,
    pan: f32,
    muted: bool,
}

#[derive(Debug, Default)]
pub struct MixSynchronizer {
    loaded: Vec<EngineTrack>,
    engine_position: f64,
    engine_playing: bool,
    engine_zoom: Option<f64>,
    engine_rate: Option<f64>,
    engine_volume: Option<f32>,
    engine_loop: Option<bool>,
    applied_mix: HashMap<String, AppliedMix>,
}

impl MixSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last position the engine is known to be at.
    pub fn engine_position(&self) -> f64 {
        self.engine_position
    }

    /// Move the play position.
    ///
    /// User seeks snap to the grid when snapping is on and are sent to the
    /// engine on the next flush. Engine updates are recorded as already
    /// applied.
    pub fn seek(&mut self, store: &mut AppStore, time: f64, origin: UpdateOrigin) -> f64 {
        match origin {
            UpdateOrigin::User => {
                let snapped = store.snap_time(time);
                store.set_current_time(snapped)
            }
            UpdateOrigin::Engine => {
                let stored = store.set_current_time(time);
                self.engine_position = stored;
                stored
            }
        }
    }

    pub fn handle_engine_event(&mut self, store: &mut AppStore, event: EngineEvent) {
        match event {
            EngineEvent::Ready { duration } => {
                store.set_duration(duration);
                store.set_engine_error(None);
                log::debug!("Engine ready, duration {:.2}s", duration);
            }
            EngineEvent::TimeUpdate(time) => {
                self.seek(store, time, UpdateOrigin::Engine);
            }
            EngineEvent::Play => {
                self.engine_playing = true;
                store.set_playing(true);
            }
            EngineEvent::Pause => {
                self.engine_playing = false;
                store.set_playing(false);
            }
            EngineEvent::Finish => {
                self.engine_playing = false;
                if store.playback().looping {
                    // Rewind; the next flush seeks and restarts the engine.
                    store.set_current_time(0.0);
                } else {
                    store.set_playing(false);
                }
            }
            EngineEvent::LoadError(message) => {
                log::error!("Waveform engine failed to load: {}", message);
                store.set_engine_error(Some(message));
            }
        }
    }

    /// Push every store change the engine has not seen yet.
    pub fn flush<E: WaveformEngine>(
        &mut self,
        store: &AppStore,
        engine: &mut E,
    ) -> Result<(), EngineError> {
        let tracks = store.current_tracks();

        let wanted: Vec<EngineTrack> = tracks.iter().map(EngineTrack::from).collect();
        if wanted != self.loaded {
            log::info!("Loading {} tracks into the engine", wanted.len());
            engine.load(&wanted)?;
            self.loaded = wanted;
            self.applied_mix.clear();
            self.engine_position = 0.0;
            self.engine_playing = false;
            // a fresh load starts from engine defaults
            self.engine_zoom = None;
            self.engine_rate = None;
            self.engine_volume = None;
            self.engine_loop = None;
        }

        let playback = store.playback();

        if (playback.current_time - self.engine_position).abs() > SEEK_EPSILON {
            engine.seek(playback.current_time)?;
            self.engine_position = playback.current_time;
        }

        if playback.is_playing != self.engine_playing {
            if playback.is_playing {
                engine.play()?;
            } else {
                engine.pause()?;
            }
            self.engine_playing = playback.is_playing;
        }

        if self.engine_rate != Some(playback.playback_rate) {
            engine.set_speed(playback.playback_rate)?;
            self.engine_rate = Some(playback.playback_rate);
        }

        if self.engine_volume != Some(playback.volume) {
            engine.set_volume(playback.volume)?;
            self.engine_volume = Some(playback.volume);
        }

        if self.engine_loop != Some(playback.looping) {
            engine.set_loop(playback.looping)?;
            self.engine_loop = Some(playback.looping);
        }

        let zoom = store.editor().zoom;
        if self.engine_zoom != Some(zoom) {
            engine.set_zoom(zoom * PIXELS_PER_SECOND)?;
            self.engine_zoom = Some(zoom);
        }

        self.flush_mix(tracks, engine)
    }

    fn flush_mix<E: WaveformEngine>(
        &mut self,
        tracks: &[AudioTrack],
        engine: &mut E,
    ) -> Result<(), EngineError> {
        for track in tracks {
            let mix = AppliedMix {
                volume: track.volume,
                pan: track.pan,
                muted: !store::track_audible(tracks, &track.id),
            };
            let previous = self.applied_mix.get(&track.id).copied();

            if previous.map(|p| p.volume) != Some(mix.volume) {
                engine.set_track_volume(&track.id, mix.volume)?;
            }
            if previous.map(|p| p.pan) != Some(mix.pan) {
                engine.set_track_pan(&track.id, mix.pan)?;
            }
            if previous.map(|p| p.muted) != Some(mix.muted) {
                engine.set_track_muted(&track.id, mix.muted)?;
            }
            self.applied_mix.insert(track.id.clone(), mix);
        }
        Ok(())
    }
}
