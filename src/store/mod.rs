//! Application state
//!
//! One `AppStore` per editing session holds the job history, the current
//! job, transport, editor view and mashup configuration. Every mutation is
//! a method call, so a caller holding the store (or its lock) always sees a
//! consistent snapshot. Background tasks reach it through `SharedStore`.

pub mod types;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ApiError;
use crate::jobs::category::auto_mashup_selection;
pub use types::*;

/// Store handle shared with background tasks (poller, stats watcher).
pub type SharedStore = Arc<Mutex<AppStore>>;

pub fn shared(store: AppStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock the store, recovering the data if a previous holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, AppStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct AppStore {
    is_loading: bool,
    current_session: Option<String>,

    separation_jobs: Vec<SeparationJob>,
    current_job_id: Option<String>,

    playback: PlaybackState,
    editor: EditorState,

    mashup: MashupSettings,
    mashup_job: Option<MashupJob>,

    /// User-visible waveform engine failure (load errors etc.)
    engine_error: Option<String>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Global ──

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    pub fn set_current_session(&mut self, session_id: Option<String>) {
        self.current_session = session_id;
    }

    // ── Jobs ──

    pub fn separation_jobs(&self) -> &[SeparationJob] {
        &self.separation_jobs
    }

    pub fn job(&self, job_id: &str) -> Option<&SeparationJob> {
        self.separation_jobs.iter().find(|j| j.id == job_id)
    }

    pub fn contains_job(&self, job_id: &str) -> bool {
        self.job(job_id).is_some()
    }

    pub fn current_job(&self) -> Option<&SeparationJob> {
        self.current_job_id.as_deref().and_then(|id| self.job(id))
    }

    /// Append to history, replacing any job with the same id.
    pub fn add_separation_job(&mut self, job: SeparationJob) {
        match self.separation_jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => self.separation_jobs.push(job),
        }
    }

    /// Merge `update` into the job. Returns false if the job is unknown.
    pub fn update_separation_job(&mut self, job_id: &str, update: &JobUpdate) -> bool {
        match self.separation_jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) => {
                update.apply(job);
                true
            }
            None => false,
        }
    }

    /// Replace the job wholesale. Returns false if the job is unknown.
    pub fn replace_separation_job(&mut self, job: SeparationJob) -> bool {
        match self.separation_jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                *existing = job;
                true
            }
            None => false,
        }
    }

    /// Drop a job and its tracks; clears the current job if it was this one.
    pub fn remove_separation_job(&mut self, job_id: &str) -> Option<SeparationJob> {
        let index = self.separation_jobs.iter().position(|j| j.id == job_id)?;
        if self.current_job_id.as_deref() == Some(job_id) {
            self.current_job_id = None;
        }
        let removed = self.separation_jobs.remove(index);
        self.editor
            .selected_tracks
            .retain(|id| removed.track(id).is_none());
        self.mashup
            .selected_tracks
            .retain(|id| removed.track(id).is_none());
        Some(removed)
    }

    /// Make `job` the current one (added to history if new), or clear it.
    pub fn set_current_job(&mut self, job: Option<SeparationJob>) {
        let previous = self.current_job_id.take();
        if let Some(job) = job {
            self.current_job_id = Some(job.id.clone());
            self.add_separation_job(job);
        }
        if self.current_job_id != previous {
            self.retain_current_selections();
        }
    }

    /// Switch to a job already in history.
    pub fn select_job(&mut self, job_id: &str) -> bool {
        if !self.contains_job(job_id) {
            return false;
        }
        if self.current_job_id.as_deref() != Some(job_id) {
            self.current_job_id = Some(job_id.to_string());
            self.retain_current_selections();
        }
        true
    }

    /// Selections only ever name tracks of the current job.
    fn retain_current_selections(&mut self) {
        let current = self.current_job_id.as_deref();
        let tracks = current
            .and_then(|id| self.separation_jobs.iter().find(|j| j.id == id))
            .map(|j| j.tracks.as_slice())
            .unwrap_or(&[]);
        let in_job = |id: &String| tracks.iter().any(|t| &t.id == id);
        self.editor.selected_tracks.retain(in_job);
        self.mashup.selected_tracks.retain(in_job);
    }

    // ── Playback ──

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playback.is_playing = playing;
    }

    /// Pause and rewind to the start.
    pub fn stop(&mut self) {
        self.playback.is_playing = false;
        self.playback.current_time = 0.0;
    }

    /// Set the play position clamped to `[0, duration]`; returns the stored value.
    pub fn set_current_time(&mut self, time: f64) -> f64 {
        let time = if time.is_finite() { time } else { 0.0 };
        self.playback.current_time = time.clamp(0.0, self.playback.duration.max(0.0));
        self.playback.current_time
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.playback.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        if self.playback.current_time > self.playback.duration {
            self.playback.current_time = self.playback.duration;
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.playback.volume = volume.clamp(0.0, 1.0);
    }

    /// Master mute shortcut: silent <-> default level.
    pub fn toggle_master_mute(&mut self) {
        self.playback.volume = if self.playback.volume == 0.0 { 0.8 } else { 0.0 };
    }

    /// Only the supported multipliers are accepted.
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<(), ApiError> {
        if PLAYBACK_RATES.iter().any(|r| (r - rate).abs() < f64::EPSILON) {
            self.playback.playback_rate = rate;
            Ok(())
        } else {
            Err(ApiError::Validation(format!(
                "Unsupported playback rate {} (allowed: {:?})",
                rate, PLAYBACK_RATES
            )))
        }
    }

    pub fn toggle_loop(&mut self) {
        self.playback.looping = !self.playback.looping;
    }

    // ── Editor ──

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        let zoom = if zoom.is_finite() { zoom } else { 1.0 };
        self.editor.zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
        self.editor.zoom
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.set_zoom(self.editor.zoom * ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.set_zoom(self.editor.zoom / ZOOM_STEP)
    }

    /// Zoom so the whole duration fits `width_px`.
    pub fn fit_zoom(&mut self, width_px: f64) -> f64 {
        if self.playback.duration <= 0.0 || width_px <= 0.0 {
            return self.editor.zoom;
        }
        self.set_zoom(width_px / self.playback.duration / PIXELS_PER_SECOND)
    }

    pub fn set_selected_tracks<I>(&mut self, track_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.editor.selected_tracks = track_ids.into_iter().collect();
    }

    pub fn add_selected_track(&mut self, track_id: &str) {
        self.editor.selected_tracks.insert(track_id.to_string());
    }

    pub fn remove_selected_track(&mut self, track_id: &str) {
        self.editor.selected_tracks.remove(track_id);
    }

    /// Returns whether the track is selected afterwards.
    pub fn toggle_selected_track(&mut self, track_id: &str) -> bool {
        if !self.editor.selected_tracks.remove(track_id) {
            self.editor.selected_tracks.insert(track_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn set_view_range(&mut self, start: f64, end: f64) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.editor.view_start = start.max(0.0);
        self.editor.view_end = end.max(0.0);
    }

    pub fn toggle_snap_to_grid(&mut self) {
        self.editor.snap_to_grid = !self.editor.snap_to_grid;
    }

    pub fn set_grid_size(&mut self, size: f64) -> Result<(), ApiError> {
        if size.is_finite() && size > 0.0 {
            self.editor.grid_size = size;
            Ok(())
        } else {
            Err(ApiError::Validation(format!("Grid size must be positive, got {}", size)))
        }
    }

    /// Round `time` to the grid when snapping is on.
    pub fn snap_time(&self, time: f64) -> f64 {
        if self.editor.snap_to_grid && self.editor.grid_size > 0.0 {
            (time / self.editor.grid_size).round() * self.editor.grid_size
        } else {
            time
        }
    }

    // ── Tracks ──

    /// Tracks of the current job, empty when there is none.
    pub fn current_tracks(&self) -> &[AudioTrack] {
        self.current_job().map(|j| j.tracks.as_slice()).unwrap_or(&[])
    }

    pub fn track(&self, track_id: &str) -> Option<&AudioTrack> {
        self.separation_jobs.iter().find_map(|j| j.track(track_id))
    }

    /// Merge `update` into every job holding `track_id`.
    /// Returns false if no job has it.
    pub fn update_track(&mut self, track_id: &str, update: &TrackUpdate) -> bool {
        let mut found = false;
        for job in &mut self.separation_jobs {
            for track in job.tracks.iter_mut().filter(|t| t.id == track_id) {
                update.apply(track);
                found = true;
            }
        }
        found
    }

    /// Returns the new muted flag, or `None` for an unknown track.
    pub fn toggle_track_mute(&mut self, track_id: &str) -> Option<bool> {
        let muted = !self.track(track_id)?.muted;
        self.update_track(track_id, &TrackUpdate::muted(muted));
        Some(muted)
    }

    /// Returns the new solo flag, or `None` for an unknown track.
    pub fn toggle_track_solo(&mut self, track_id: &str) -> Option<bool> {
        let solo = !self.track(track_id)?.solo;
        self.update_track(track_id, &TrackUpdate::solo(solo));
        Some(solo)
    }

    pub fn set_track_volume(&mut self, track_id: &str, volume: f32) -> bool {
        self.update_track(track_id, &TrackUpdate::volume(volume))
    }

    pub fn set_track_pan(&mut self, track_id: &str, pan: f32) -> bool {
        self.update_track(track_id, &TrackUpdate::pan(pan))
    }

    /// Apply the same update to every track of the current job.
    pub fn apply_to_all_tracks(&mut self, update: &TrackUpdate) -> usize {
        let Some(job_id) = self.current_job_id.clone() else {
            return 0;
        };
        match self.separation_jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) => {
                for track in &mut job.tracks {
                    update.apply(track);
                }
                job.tracks.len()
            }
            None => 0,
        }
    }

    pub fn normalize_all_tracks(&mut self) -> usize {
        self.apply_to_all_tracks(&TrackUpdate::volume(DEFAULT_TRACK_VOLUME))
    }

    /// Back to unity gain, centered, unmuted, unsoloed.
    pub fn reset_all_tracks(&mut self) -> usize {
        self.apply_to_all_tracks(&TrackUpdate {
            volume: Some(1.0),
            pan: Some(0.0),
            muted: Some(false),
            solo: Some(false),
            ..TrackUpdate::default()
        })
    }

    /// Audible = not muted and (nothing soloed or this track soloed).
    /// Solo scope is the job the track belongs to.
    pub fn is_track_audible(&self, track_id: &str) -> bool {
        self.separation_jobs
            .iter()
            .find(|j| j.track(track_id).is_some())
            .map(|job| track_audible(&job.tracks, track_id))
            .unwrap_or(false)
    }

    // ── Mashup ──

    pub fn mashup_settings(&self) -> &MashupSettings {
        &self.mashup
    }

    pub fn set_mashup_settings(&mut self, update: &MashupSettingsUpdate) {
        update.apply(&mut self.mashup);
    }

    /// Add or remove a track from the mashup selection.
    /// Returns whether it is selected afterwards.
    pub fn toggle_mashup_track(&mut self, track_id: &str) -> Result<bool, ApiError> {
        if let Some(pos) = self.mashup.selected_tracks.iter().position(|id| id == track_id) {
            self.mashup.selected_tracks.remove(pos);
            return Ok(false);
        }
        if self.mashup.selected_tracks.len() >= MAX_MASHUP_TRACKS {
            return Err(ApiError::Validation(format!(
                "A mashup can use at most {} tracks",
                MAX_MASHUP_TRACKS
            )));
        }
        self.mashup.selected_tracks.push(track_id.to_string());
        Ok(true)
    }

    /// Pre-select vocal and instrument stems of the current job when
    /// nothing is selected yet. Returns the number of tracks selected.
    pub fn auto_select_mashup_tracks(&mut self) -> usize {
        if !self.mashup.selected_tracks.is_empty() {
            return 0;
        }
        self.mashup.selected_tracks = auto_mashup_selection(self.current_tracks());
        self.mashup.selected_tracks.len()
    }

    pub fn mashup_job(&self) -> Option<&MashupJob> {
        self.mashup_job.as_ref()
    }

    pub fn set_mashup_job(&mut self, job: Option<MashupJob>) {
        self.mashup_job = job;
    }

    pub fn mashup_job_mut(&mut self, job_id: &str) -> Option<&mut MashupJob> {
        self.mashup_job.as_mut().filter(|j| j.id == job_id)
    }

    pub fn reset_mashup(&mut self) {
        self.mashup = MashupSettings::default();
        self.mashup_job = None;
    }

    // ── Engine ──

    pub fn engine_error(&self) -> Option<&str> {
        self.engine_error.as_deref()
    }

    pub fn set_engine_error(&mut self, error: Option<String>) {
        self.engine_error = error;
    }

    // ── Reset ──

    /// Transport and view back to defaults; job history is kept.
    pub fn reset_editor(&mut self) {
        self.playback = PlaybackState::default();
        self.editor = EditorState::default();
        self.engine_error = None;
    }
}

/// Additive solo: any soloed track silences the unsoloed ones.
pub fn track_audible(tracks: &[AudioTrack], track_id: &str) -> bool {
    let any_solo = tracks.iter().any(|t| t.solo);
    tracks
        .iter()
        .find(|t| t.id == track_id)
        .map(|t| !t.muted && (!any_solo || t.solo))
        .unwrap_or(false)
}
