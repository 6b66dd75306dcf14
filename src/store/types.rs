use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::engine::types::{Analysis, JobStatus};

// ── Limits ──

pub const TRACK_VOLUME_MAX: f32 = 1.5;
pub const DEFAULT_TRACK_VOLUME: f32 = 0.8;
pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 10.0;
pub const ZOOM_STEP: f64 = 1.5;
/// Engine zoom unit: pixels per second at zoom 1.0
pub const PIXELS_PER_SECOND: f64 = 50.0;
pub const PLAYBACK_RATES: [f64; 7] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0];
pub const MIN_MASHUP_TRACKS: usize = 2;
pub const MAX_MASHUP_TRACKS: usize = 8;
pub const CROSSFADE_MAX_SECS: f64 = 10.0;

// ── Tracks ──

/// One stem loaded into the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    /// `{job_id}_{stem_name}`
    pub id: String,
    pub name: String,
    pub url: String,
    pub duration: f64,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform_data: Option<Vec<f32>>,
}

/// Partial update for a track; `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackUpdate {
    pub name: Option<String>,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
    pub muted: Option<bool>,
    pub solo: Option<bool>,
    pub color: Option<String>,
    pub waveform_data: Option<Vec<f32>>,
}

impl TrackUpdate {
    pub fn volume(volume: f32) -> Self {
        Self { volume: Some(volume), ..Self::default() }
    }

    pub fn pan(pan: f32) -> Self {
        Self { pan: Some(pan), ..Self::default() }
    }

    pub fn muted(muted: bool) -> Self {
        Self { muted: Some(muted), ..Self::default() }
    }

    pub fn solo(solo: bool) -> Self {
        Self { solo: Some(solo), ..Self::default() }
    }

    /// Merge into `track`, clamping volume and pan to their ranges.
    pub fn apply(&self, track: &mut AudioTrack) {
        if let Some(name) = &self.name {
            track.name = name.clone();
        }
        if let Some(volume) = self.volume {
            track.volume = volume.clamp(0.0, TRACK_VOLUME_MAX);
        }
        if let Some(pan) = self.pan {
            track.pan = pan.clamp(-1.0, 1.0);
        }
        if let Some(muted) = self.muted {
            track.muted = muted;
        }
        if let Some(solo) = self.solo {
            track.solo = solo;
        }
        if let Some(color) = &self.color {
            track.color = color.clone();
        }
        if let Some(waveform) = &self.waveform_data {
            track.waveform_data = Some(waveform.clone());
        }
    }
}

// ── Jobs ──

/// The local file a separation job was started from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub original_file: SourceFile,
    pub tracks: Vec<AudioTrack>,
    pub created_at: DateTime<Utc>,
    pub estimated_time: Option<f64>,
    pub error: Option<String>,
    pub analysis: Option<Analysis>,
}

impl SeparationJob {
    pub fn new(id: impl Into<String>, original_file: SourceFile) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            original_file,
            tracks: Vec::new(),
            created_at: Utc::now(),
            estimated_time: None,
            error: None,
            analysis: None,
        }
    }

    pub fn track(&self, track_id: &str) -> Option<&AudioTrack> {
        self.tracks.iter().find(|t| t.id == track_id)
    }
}

/// Partial update for a separation job.
///
/// Double options distinguish "leave alone" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub tracks: Option<Vec<AudioTrack>>,
    pub estimated_time: Option<Option<f64>>,
    pub error: Option<Option<String>>,
    pub analysis: Option<Option<Analysis>>,
}

impl JobUpdate {
    pub fn apply(&self, job: &mut SeparationJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(tracks) = &self.tracks {
            job.tracks = tracks.clone();
        }
        if let Some(estimated_time) = self.estimated_time {
            job.estimated_time = estimated_time;
        }
        if let Some(error) = &self.error {
            job.error = error.clone();
        }
        if let Some(analysis) = &self.analysis {
            job.analysis = analysis.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MashupJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

impl MashupJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            result_url: None,
            error: None,
        }
    }
}

// ── Transport / editor ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f32,
    pub playback_rate: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: 0.8,
            playback_rate: 1.0,
            looping: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub zoom: f64,
    pub selected_tracks: BTreeSet<String>,
    pub view_start: f64,
    pub view_end: f64,
    pub snap_to_grid: bool,
    /// Seconds
    pub grid_size: f64,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            selected_tracks: BTreeSet::new(),
            view_start: 0.0,
            view_end: 100.0,
            snap_to_grid: true,
            grid_size: 0.25,
        }
    }
}

// ── Mashup ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MashupSettings {
    /// Track ids in selection order, unique, at most `MAX_MASHUP_TRACKS`
    pub selected_tracks: Vec<String>,
    #[serde(rename = "targetBPM")]
    pub target_bpm: u32,
    /// Musical key or `"auto"`
    pub target_key: String,
    pub crossfade_duration: f64,
    pub auto_align: bool,
    pub harmonic_mixing: bool,
    pub energy_matching: bool,
}

impl Default for MashupSettings {
    fn default() -> Self {
        Self {
            selected_tracks: Vec::new(),
            target_bpm: 120,
            target_key: "auto".to_string(),
            crossfade_duration: 4.0,
            auto_align: true,
            harmonic_mixing: false,
            energy_matching: false,
        }
    }
}

/// Partial update for mashup settings (track selection has its own calls).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MashupSettingsUpdate {
    pub target_bpm: Option<u32>,
    pub target_key: Option<String>,
    pub crossfade_duration: Option<f64>,
    pub auto_align: Option<bool>,
    pub harmonic_mixing: Option<bool>,
    pub energy_matching: Option<bool>,
}

impl MashupSettingsUpdate {
    pub fn apply(&self, settings: &mut MashupSettings) {
        if let Some(bpm) = self.target_bpm {
            settings.target_bpm = bpm;
        }
        if let Some(key) = &self.target_key {
            settings.target_key = key.clone();
        }
        if let Some(crossfade) = self.crossfade_duration {
            settings.crossfade_duration = crossfade.clamp(0.0, CROSSFADE_MAX_SECS);
        }
        if let Some(v) = self.auto_align {
            settings.auto_align = v;
        }
        if let Some(v) = self.harmonic_mixing {
            settings.harmonic_mixing = v;
        }
        if let Some(v) = self.energy_matching {
            settings.energy_matching = v;
        }
    }
}
