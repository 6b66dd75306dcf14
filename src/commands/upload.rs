//! Upload and separation commands

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AppContext;
use crate::engine::types::UploadResponse;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{PollGuard, PollHandle, PollOutcome};
use crate::store::{SeparationJob, SourceFile};

/// Extensions accepted for upload and the MIME type sent with each.
pub const ACCEPTED_FORMATS: [(&str, &str); 5] = [
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
];

pub fn audio_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    ACCEPTED_FORMATS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Check type and size before anything touches the network.
pub fn validate_audio_file(path: &Path, max_bytes: u64) -> ApiResult<SourceFile> {
    let mime = audio_mime_type(path).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unsupported file type: {}. Use MP3, WAV, FLAC, M4A or AAC.",
            path.display()
        ))
    })?;

    let metadata = std::fs::metadata(path)
        .map_err(|e| ApiError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(ApiError::Validation(format!("{} is not a file", path.display())));
    }
    let size = metadata.len();
    if size == 0 {
        return Err(ApiError::Validation(format!("{} is empty", path.display())));
    }
    if size > max_bytes {
        return Err(ApiError::Validation(format!(
            "File too large: {} (maximum {})",
            super::session::format_file_size(size),
            super::session::format_file_size(max_bytes)
        )));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio")
        .to_string();

    Ok(SourceFile {
        path: path.to_path_buf(),
        name,
        size,
        mime: mime.to_string(),
    })
}

/// Local view of an audio file, read without decoding samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAudioInfo {
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
}

/// Confirm the file is readable audio and read its basic properties.
pub fn probe_audio(path: &Path) -> ApiResult<LocalAudioInfo> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ApiError::Validation(format!("Not a readable audio file: {}", e)))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| ApiError::Validation("No audio tracks found".to_string()))?;

    let params = &track.codec_params;
    let sample_rate = params.sample_rate.unwrap_or(44100);
    let channels = params.channels.map(|c| c.count() as u32).unwrap_or(2);
    let duration = params
        .n_frames
        .map(|frames| frames as f64 / sample_rate as f64)
        .unwrap_or(0.0);

    Ok(LocalAudioInfo {
        duration,
        sample_rate,
        channels,
        format: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_uppercase(),
    })
}

/// Validate, probe and upload a file; the new session becomes current.
pub async fn upload_audio<F>(
    ctx: &AppContext,
    path: &Path,
    on_progress: F,
) -> ApiResult<(SourceFile, UploadResponse)>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    let source = validate_audio_file(path, ctx.settings.max_upload_bytes)?;

    let probe_path = source.path.clone();
    let info = tokio::task::spawn_blocking(move || probe_audio(&probe_path))
        .await
        .map_err(|e| ApiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
    log::info!(
        "Uploading {} ({}, {:.1}s, {}Hz, {}ch)",
        source.name,
        source.mime,
        info.duration,
        info.sample_rate,
        info.channels
    );

    let data = tokio::fs::read(&source.path).await?;

    ctx.update_store(|s| s.set_loading(true));
    let result = ctx
        .client
        .upload_audio(&source.name, &source.mime, data, on_progress)
        .await;
    ctx.update_store(|s| s.set_loading(false));

    let response = result?;
    log::info!("Upload complete, session {}", response.session_id);
    ctx.update_store(|s| s.set_current_session(Some(response.session_id.clone())));
    Ok((source, response))
}

/// Ask the backend to separate an uploaded file and make the new job current.
pub async fn start_separation(
    ctx: &AppContext,
    session_id: &str,
    source: SourceFile,
) -> ApiResult<String> {
    let response = ctx.client.start_separation(session_id).await?;
    log::info!(
        "Separation job {} started ({}), estimate {:?}s",
        response.job_id,
        response.status,
        response.estimated_time
    );

    let mut job = SeparationJob::new(response.job_id.clone(), source);
    job.status = response.status;
    job.estimated_time = response.estimated_time;

    ctx.update_store(|s| {
        s.reset_editor();
        s.set_current_job(Some(job));
    });
    Ok(response.job_id)
}

/// Start polling a job in the background.
pub fn poll_separation(ctx: &AppContext, job_id: &str) -> PollHandle {
    ctx.poller().spawn_separation(job_id)
}

/// Upload, separate and wait for the stems.
pub async fn separate_file<F>(ctx: &AppContext, path: &Path, on_progress: F) -> ApiResult<SeparationJob>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    let (source, upload) = upload_audio(ctx, path, on_progress).await?;
    let job_id = start_separation(ctx, &upload.session_id, source).await?;

    let guard = PollGuard::new();
    match ctx.poller().run_separation(&job_id, &guard).await {
        PollOutcome::Completed => ctx
            .with_store(|s| s.job(&job_id).cloned())
            .ok_or_else(|| ApiError::JobFailed("Job disappeared".to_string())),
        PollOutcome::Failed(message) => Err(ApiError::JobFailed(message)),
        PollOutcome::Cancelled => Err(ApiError::JobFailed("Polling cancelled".to_string())),
    }
}
