//! Backend wire types
//!
//! JSON payloads exchanged with the separation/mashup backend. Field names
//! follow the backend's snake_case schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a backend job (separation or mashup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "separating")]
    Processing,
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side description of the uploaded file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// POST /upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_info: FileInfo,
}

/// POST /separate
#[derive(Debug, Clone, Deserialize)]
pub struct SeparationResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub estimated_time: Option<f64>,
}

/// One separated stem as reported by the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemInfo {
    #[serde(default)]
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub duration: f64,
}

/// Musical analysis of the source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub tempo: f64,
    pub key: String,
    pub energy: f64,
    pub danceability: f64,
}

/// GET /status/{job_id}
///
/// `stems` keeps the payload's key order; track colors depend on it.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stems: Option<IndexMap<String, StemInfo>>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub estimated_time: Option<f64>,
}

/// Per-track reference sent with a mashup request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MashupTrackRef {
    pub id: String,
    pub name: String,
    pub volume: f32,
    pub pan: f32,
}

/// Mashup settings as the backend expects them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MashupRequestSettings {
    pub target_bpm: u32,
    pub target_key: String,
    pub crossfade_duration: f64,
    pub auto_align: bool,
    pub harmonic_mixing: bool,
    pub energy_matching: bool,
}

/// POST /mashup
#[derive(Debug, Clone, Serialize)]
pub struct MashupRequest {
    pub session_id: String,
    pub tracks: Vec<MashupTrackRef>,
    pub settings: MashupRequestSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MashupResponse {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: String,
}

/// GET /mashup-status/{job_id}
#[derive(Debug, Clone, Deserialize)]
pub struct MashupStatusResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /session/{session_id}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// GET /stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(default)]
    pub gpu_usage: Option<f64>,
    pub disk_usage: f64,
    pub active_jobs: u32,
    pub queue_length: u32,
    pub uptime: f64,
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
