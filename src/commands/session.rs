//! Session, download and server status commands

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::AppContext;
use crate::engine::types::{HealthStatus, ServerStats, SessionInfo};
use crate::error::{ApiError, ApiResult};
use crate::jobs::PollGuard;

fn current_session(ctx: &AppContext) -> ApiResult<String> {
    ctx.with_store(|s| s.current_session().map(str::to_string))
        .ok_or_else(|| ApiError::Validation("No active session".to_string()))
}

/// Reject names that would escape `dest_dir` once used in a file name.
fn file_name_part<'a>(kind: &str, value: &'a str) -> ApiResult<&'a str> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(ApiError::Validation(format!("Invalid {}: {:?}", kind, value)));
    }
    Ok(value)
}

/// Download one stem of the current session into `dest_dir`.
pub async fn download_stem(ctx: &AppContext, stem_name: &str, dest_dir: &Path) -> ApiResult<PathBuf> {
    let session_id = current_session(ctx)?;
    file_name_part("stem name", stem_name)?;
    let bytes = ctx.client.download_stem(&session_id, stem_name).await?;

    tokio::fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(format!("{}.wav", stem_name));
    tokio::fs::write(&path, &bytes).await?;
    log::info!("Saved {} ({} bytes) to {}", stem_name, bytes.len(), path.display());
    Ok(path)
}

/// Download every stem of the current session as one archive.
pub async fn download_all_stems(ctx: &AppContext, dest_dir: &Path) -> ApiResult<PathBuf> {
    let session_id = current_session(ctx)?;
    file_name_part("session id", &session_id)?;
    let bytes = ctx.client.download_all_stems(&session_id).await?;

    tokio::fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(format!("{}_stems.zip", session_id));
    tokio::fs::write(&path, &bytes).await?;
    log::info!("Saved all stems ({} bytes) to {}", bytes.len(), path.display());
    Ok(path)
}

/// Fetch session metadata and make it the current session.
///
/// An expired session is forgotten so the next action starts fresh.
pub async fn load_session(ctx: &AppContext, session_id: &str) -> ApiResult<SessionInfo> {
    match ctx.client.get_session_info(session_id).await {
        Ok(info) => {
            ctx.update_store(|s| s.set_current_session(Some(session_id.to_string())));
            Ok(info)
        }
        Err(ApiError::SessionNotFound(id)) => {
            log::warn!("Session {} not found or expired", id);
            ctx.update_store(|s| {
                if s.current_session() == Some(id.as_str()) {
                    s.set_current_session(None);
                }
            });
            Err(ApiError::SessionNotFound(id))
        }
        Err(e) => Err(e),
    }
}

pub async fn delete_session(ctx: &AppContext, session_id: &str) -> ApiResult<()> {
    ctx.client.delete_session(session_id).await?;
    ctx.update_store(|s| {
        if s.current_session() == Some(session_id) {
            s.set_current_session(None);
        }
    });
    log::info!("Deleted session {}", session_id);
    Ok(())
}

pub async fn check_health(ctx: &AppContext) -> ApiResult<HealthStatus> {
    ctx.client.health_check().await
}

/// Latest server stats and the error from the most recent refresh, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub stats: Option<ServerStats>,
    pub error: Option<String>,
}

/// Periodic `/stats` refresh. Dropping the watcher stops it.
#[derive(Debug)]
pub struct StatsWatcher {
    guard: PollGuard,
    rx: watch::Receiver<StatsSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl StatsWatcher {
    /// Fetch immediately, then every `settings.stats_interval_ms`.
    pub fn spawn(ctx: &AppContext) -> Self {
        let (tx, rx) = watch::channel(StatsSnapshot::default());
        let guard = PollGuard::new();
        let task_guard = guard.clone();
        let client = ctx.client.clone();
        let interval = ctx.settings.stats_interval();

        let task = tokio::spawn(async move {
            while task_guard.is_alive() {
                let result = client.get_server_stats().await;
                if !task_guard.is_alive() {
                    break;
                }
                tx.send_modify(|snapshot| match result {
                    Ok(stats) => {
                        snapshot.stats = Some(stats);
                        snapshot.error = None;
                    }
                    Err(e) => {
                        log::debug!("Stats refresh failed: {}", e);
                        snapshot.error = Some(e.user_message());
                    }
                });
                task_guard.sleep(interval).await;
            }
        });

        Self {
            guard,
            rx,
            task: Some(task),
        }
    }

    pub fn latest(&self) -> StatsSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next refresh.
    pub async fn changed(&mut self) -> ApiResult<StatsSnapshot> {
        self.rx
            .changed()
            .await
            .map_err(|_| ApiError::Network("Stats watcher stopped".to_string()))?;
        Ok(self.rx.borrow_and_update().clone())
    }

    pub async fn stop(mut self) {
        self.guard.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StatsWatcher {
    fn drop(&mut self) {
        self.guard.cancel();
    }
}

/// "Xh Ym" from seconds.
pub fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
