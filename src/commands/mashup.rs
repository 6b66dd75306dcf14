//! Mashup commands

use std::path::{Path, PathBuf};

use chrono::Utc;

use super::AppContext;
use crate::engine::types::{JobStatus, MashupRequest, MashupRequestSettings, MashupTrackRef};
use crate::error::{ApiError, ApiResult};
use crate::jobs::{PollGuard, PollHandle, PollOutcome};
use crate::store::{AppStore, MashupJob, MAX_MASHUP_TRACKS, MIN_MASHUP_TRACKS};

/// Build the request from the current selection and settings.
///
/// Fails with `Validation` (no request is made) when there is no session,
/// the selection is outside 2..=8 tracks, or a selected track is not one of
/// the current job's.
pub fn build_mashup_request(store: &AppStore) -> ApiResult<MashupRequest> {
    let session_id = store
        .current_session()
        .ok_or_else(|| ApiError::Validation("Upload a file before creating a mashup".to_string()))?
        .to_string();

    let settings = store.mashup_settings();
    let count = settings.selected_tracks.len();
    if count < MIN_MASHUP_TRACKS {
        return Err(ApiError::Validation(format!(
            "Select at least {} tracks to create a mashup",
            MIN_MASHUP_TRACKS
        )));
    }
    if count > MAX_MASHUP_TRACKS {
        return Err(ApiError::Validation(format!(
            "A mashup can use at most {} tracks",
            MAX_MASHUP_TRACKS
        )));
    }

    let tracks = settings
        .selected_tracks
        .iter()
        .map(|id| {
            store
                .current_tracks()
                .iter()
                .find(|t| &t.id == id)
                .map(|t| MashupTrackRef {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    volume: t.volume,
                    pan: t.pan,
                })
                .ok_or_else(|| {
                    ApiError::Validation(format!("Track {} is not part of the current job", id))
                })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(MashupRequest {
        session_id,
        tracks,
        settings: MashupRequestSettings {
            target_bpm: settings.target_bpm,
            target_key: settings.target_key.clone(),
            crossfade_duration: settings.crossfade_duration,
            auto_align: settings.auto_align,
            harmonic_mixing: settings.harmonic_mixing,
            energy_matching: settings.energy_matching,
        },
    })
}

/// Submit the mashup and record it as the current mashup job.
pub async fn create_mashup(ctx: &AppContext) -> ApiResult<String> {
    let request = ctx.with_store(build_mashup_request)?;
    log::info!(
        "Creating mashup from {} tracks at {} BPM, key {}",
        request.tracks.len(),
        request.settings.target_bpm,
        request.settings.target_key
    );

    let response = ctx.client.create_mashup(&request).await?;
    let mut job = MashupJob::new(response.job_id.clone());
    if let Some(status) = response.status {
        job.status = status;
    }
    ctx.update_store(|s| s.set_mashup_job(Some(job)));
    Ok(response.job_id)
}

pub fn poll_mashup(ctx: &AppContext, job_id: &str) -> PollHandle {
    ctx.poller().spawn_mashup(job_id)
}

/// Create a mashup and wait for it; returns the finished job.
pub async fn create_mashup_and_wait(ctx: &AppContext) -> ApiResult<MashupJob> {
    let job_id = create_mashup(ctx).await?;
    let guard = PollGuard::new();
    match ctx.poller().run_mashup(&job_id, &guard).await {
        PollOutcome::Completed => ctx
            .with_store(|s| s.mashup_job().cloned())
            .ok_or_else(|| ApiError::JobFailed("Mashup job disappeared".to_string())),
        PollOutcome::Failed(message) => Err(ApiError::JobFailed(message)),
        PollOutcome::Cancelled => Err(ApiError::JobFailed("Polling cancelled".to_string())),
    }
}

/// Save the finished mashup into `dest_dir` as `mashup_<unix millis>.wav`.
pub async fn download_result(ctx: &AppContext, dest_dir: &Path) -> ApiResult<PathBuf> {
    let result_url = ctx
        .with_store(|s| {
            s.mashup_job()
                .filter(|j| j.status == JobStatus::Completed)
                .and_then(|j| j.result_url.clone())
        })
        .ok_or_else(|| ApiError::Validation("No finished mashup to download".to_string()))?;

    let bytes = ctx.client.download_result(&result_url).await?;
    tokio::fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(format!("mashup_{}.wav", Utc::now().timestamp_millis()));
    tokio::fs::write(&path, &bytes).await?;
    log::info!("Saved mashup ({} bytes) to {}", bytes.len(), path.display());
    Ok(path)
}
