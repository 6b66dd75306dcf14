//! End-to-end tests against a stub backend served by tiny_http.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use musicai_editor::commands::{mashup, session, upload};
use indexmap::IndexMap;
use musicai_editor::engine::types::{JobStatus, StemInfo};
use musicai_editor::jobs::{materialize_tracks, PollOutcome};
use musicai_editor::store::{SeparationJob, SourceFile};
use musicai_editor::{ApiError, AppContext, Settings};
use tiny_http::{Header, Response, Server};

/// One request as the stub saw it.
#[derive(Debug, Clone)]
struct Hit {
    method: String,
    url: String,
    body: Vec<u8>,
    request_id: Option<String>,
}

type Handler = Box<dyn Fn(&Hit) -> (u16, Vec<u8>) + Send + 'static>;

struct StubBackend {
    base_url: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl StubBackend {
    fn start(handler: Handler) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&hits);

        std::thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                let request_id = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("X-Request-Id"))
                    .map(|h| h.value.as_str().to_string());
                let hit = Hit {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    body,
                    request_id,
                };
                recorded.lock().unwrap().push(hit.clone());

                let (status, payload) = handler(&hit);
                let response = Response::from_data(payload)
                    .with_status_code(status)
                    .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
                let _ = request.respond(response);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            hits,
        }
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    fn count(&self, method: &str, prefix: &str) -> usize {
        self.hits()
            .iter()
            .filter(|h| h.method == method && h.url.starts_with(prefix))
            .count()
    }

    fn context(&self) -> AppContext {
        let settings = Settings {
            api_base_url: self.base_url.clone(),
            request_timeout_secs: 5,
            poll_interval_ms: 10,
            stats_interval_ms: 10,
            ..Settings::default()
        };
        AppContext::new(settings).unwrap()
    }
}

fn json(status: u16, value: serde_json::Value) -> (u16, Vec<u8>) {
    (status, value.to_string().into_bytes())
}

/// Helper: a short mono WAV the probe accepts.
fn create_test_wav(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..4000 {
        writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn stems_payload() -> serde_json::Value {
    serde_json::json!({
        "vocals": {"filename": "vocals.wav", "url": "/download/s1/vocals", "duration": 0.5},
        "drums": {"filename": "drums.wav", "url": "/download/s1/drums", "duration": 0.5}
    })
}

/// Helper: a finished job "j1" with vocals and drums, as polling would leave it.
fn separated_job() -> SeparationJob {
    let stems: IndexMap<String, StemInfo> = serde_json::from_value(stems_payload()).unwrap();
    let mut job = SeparationJob::new(
        "j1",
        SourceFile {
            path: PathBuf::from("song.wav"),
            name: "song.wav".into(),
            size: 8044,
            mime: "audio/wav".into(),
        },
    );
    job.status = JobStatus::Completed;
    job.tracks = materialize_tracks("j1", &stems);
    job
}

fn upload_and_separate(url: &str) -> Option<(u16, Vec<u8>)> {
    match url {
        "/upload" => Some(json(
            200,
            serde_json::json!({
                "session_id": "s1",
                "message": "ok",
                "file_info": {"filename": "song.wav", "size": 8044}
            }),
        )),
        "/separate" => Some(json(
            200,
            serde_json::json!({"job_id": "j1", "status": "pending", "estimated_time": 30}),
        )),
        _ => None,
    }
}

#[tokio::test]
async fn test_upload_separate_poll_to_completion() {
    // The second status request waits for the test to observe 40%.
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let go_rx = Mutex::new(go_rx);
    let status_calls = Mutex::new(0usize);

    let backend = StubBackend::start(Box::new(move |hit| {
        if let Some(response) = upload_and_separate(&hit.url) {
            return response;
        }
        if hit.url == "/status/j1" {
            let mut calls = status_calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return json(
                    200,
                    serde_json::json!({"job_id": "j1", "status": "processing", "progress": 40}),
                );
            }
            let _ = go_rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
            return json(
                200,
                serde_json::json!({
                    "job_id": "j1",
                    "status": "completed",
                    "progress": 100,
                    "stems": stems_payload()
                }),
            );
        }
        json(404, serde_json::json!({"detail": "not found"}))
    }));

    let dir = tempfile::tempdir().unwrap();
    let wav = create_test_wav(dir.path(), "song.wav");
    let ctx = backend.context();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    let (source, uploaded) = upload::upload_audio(&ctx, &wav, move |p| seen.lock().unwrap().push(p))
        .await
        .unwrap();
    assert_eq!(uploaded.session_id, "s1");
    assert_eq!(progress.lock().unwrap().last(), Some(&100));
    assert_eq!(ctx.with_store(|s| s.current_session().map(str::to_string)), Some("s1".into()));

    let job_id = upload::start_separation(&ctx, &uploaded.session_id, source).await.unwrap();
    assert_eq!(job_id, "j1");
    assert_eq!(
        ctx.with_store(|s| s.current_job().map(|j| j.status)),
        Some(JobStatus::Pending)
    );

    let handle = upload::poll_separation(&ctx, &job_id);

    let mut saw_forty = false;
    for _ in 0..200 {
        let state = ctx.with_store(|s| s.current_job().map(|j| (j.status, j.progress)));
        if state == Some((JobStatus::Processing, 40.0)) {
            saw_forty = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_forty, "store never showed processing at 40%");
    go_tx.send(()).unwrap();

    assert_eq!(handle.join().await, PollOutcome::Completed);

    let job = ctx.with_store(|s| s.current_job().cloned()).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let ids: Vec<&str> = job.tracks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["j1_vocals", "j1_drums"]);
    assert!(job.tracks.iter().all(|t| t.volume == 0.8));
    assert_ne!(job.tracks[0].color, job.tracks[1].color);

    assert_eq!(backend.count("GET", "/status/j1"), 2);
    assert!(backend.hits().iter().all(|h| h.request_id.is_some()));
    let separate = backend.hits().into_iter().find(|h| h.url == "/separate").unwrap();
    let body: serde_json::Value = serde_json::from_slice(&separate.body).unwrap();
    assert_eq!(body["session_id"], "s1");
}

#[tokio::test]
async fn test_failed_job_stops_polling() {
    let backend = StubBackend::start(Box::new(|hit| {
        if let Some(response) = upload_and_separate(&hit.url) {
            return response;
        }
        json(
            200,
            serde_json::json!({"job_id": "j1", "status": "failed", "error": "model_load_error"}),
        )
    }));

    let dir = tempfile::tempdir().unwrap();
    let wav = create_test_wav(dir.path(), "song.wav");
    let ctx = backend.context();

    let result = upload::separate_file(&ctx, &wav, |_| {}).await;
    match result {
        Err(ApiError::JobFailed(message)) => assert_eq!(message, "model_load_error"),
        other => panic!("expected JobFailed, got {:?}", other),
    }

    let job = ctx.with_store(|s| s.current_job().cloned()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("model_load_error"));

    // No further status requests once the job failed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.count("GET", "/status/"), 1);
}

#[tokio::test]
async fn test_http_errors_map_to_taxonomy() {
    let backend = StubBackend::start(Box::new(|hit| match (hit.method.as_str(), hit.url.as_str()) {
        ("POST", "/upload") => json(413, serde_json::json!({"detail": "too big"})),
        ("POST", "/separate") => json(500, serde_json::json!({"detail": "boom"})),
        ("GET", "/stats") => json(429, serde_json::json!({"detail": "slow down"})),
        ("GET", "/session/gone") => json(404, serde_json::json!({"detail": "missing"})),
        _ => json(404, serde_json::json!({"detail": "not found"})),
    }));

    let dir = tempfile::tempdir().unwrap();
    let wav = create_test_wav(dir.path(), "song.wav");
    let ctx = backend.context();

    let err = upload::upload_audio(&ctx, &wav, |_| {}).await.unwrap_err();
    assert!(matches!(err, ApiError::PayloadTooLarge));
    assert_eq!(err.user_message(), "File too large. Maximum size: 100MB");
    assert!(!ctx.with_store(|s| s.is_loading()));

    let err = ctx.client.start_separation("s1").await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 500 }));

    let err = ctx.client.get_server_stats().await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimited));

    ctx.update_store(|s| s.set_current_session(Some("gone".into())));
    let err = session::load_session(&ctx, "gone").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionNotFound(ref id) if id == "gone"));
    assert!(ctx.with_store(|s| s.current_session().is_none()));

    let err = ctx.client.get_job_status("nope").await.unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_invalid_file_never_reaches_backend() {
    let backend = StubBackend::start(Box::new(|_| json(200, serde_json::json!({}))));
    let dir = tempfile::tempdir().unwrap();
    let text = dir.path().join("notes.txt");
    std::fs::write(&text, b"not audio").unwrap();
    let ctx = backend.context();

    let err = upload::upload_audio(&ctx, &text, |_| {}).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(err.is_client_side());
    assert!(backend.hits().is_empty());
}

#[tokio::test]
async fn test_mashup_from_separated_stems() {
    let backend = StubBackend::start(Box::new(|hit| {
        if let Some(response) = upload_and_separate(&hit.url) {
            return response;
        }
        match hit.url.as_str() {
            "/status/j1" => json(
                200,
                serde_json::json!({"job_id": "j1", "status": "completed", "stems": stems_payload()}),
            ),
            "/mashup" => json(200, serde_json::json!({"job_id": "m1", "status": "pending"})),
            "/mashup-status/m1" => json(
                200,
                serde_json::json!({
                    "job_id": "m1",
                    "status": "completed",
                    "progress": 100,
                    "result_url": "/download/s1/mashup"
                }),
            ),
            "/download/s1/mashup" => (200, b"RIFFmashup".to_vec()),
            _ => json(404, serde_json::json!({"detail": "not found"})),
        }
    }));

    let dir = tempfile::tempdir().unwrap();
    let wav = create_test_wav(dir.path(), "song.wav");
    let ctx = backend.context();

    upload::separate_file(&ctx, &wav, |_| {}).await.unwrap();
    ctx.update_store(|s| {
        s.toggle_mashup_track("j1_vocals").unwrap();
        s.toggle_mashup_track("j1_drums").unwrap();
    });

    let job = mashup::create_mashup_and_wait(&ctx).await.unwrap();
    assert_eq!(job.id, "m1");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_url.as_deref(), Some("/download/s1/mashup"));

    let request = backend.hits().into_iter().find(|h| h.url == "/mashup").unwrap();
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["tracks"].as_array().unwrap().len(), 2);
    assert_eq!(body["tracks"][0]["id"], "j1_vocals");
    assert_eq!(body["settings"]["target_bpm"], 120);
    assert_eq!(body["settings"]["target_key"], "auto");
    assert_eq!(body["settings"]["auto_align"], true);

    let out = tempfile::tempdir().unwrap();
    let saved = mashup::download_result(&ctx, out.path()).await.unwrap();
    let name = saved.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("mashup_") && name.ends_with(".wav"), "{}", name);
    assert_eq!(std::fs::read(&saved).unwrap(), b"RIFFmashup");
}

#[tokio::test]
async fn test_poll_mashup_in_background() {
    let status_calls = Mutex::new(0usize);
    let backend = StubBackend::start(Box::new(move |hit| match hit.url.as_str() {
        "/mashup" => json(200, serde_json::json!({"job_id": "m1", "status": "pending"})),
        "/mashup-status/m1" => {
            let mut calls = status_calls.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                let progress = 30 * *calls;
                json(
                    200,
                    serde_json::json!({"job_id": "m1", "status": "processing", "progress": progress}),
                )
            } else {
                json(
                    200,
                    serde_json::json!({
                        "job_id": "m1",
                        "status": "completed",
                        "result_url": "/download/s1/mashup"
                    }),
                )
            }
        }
        _ => json(404, serde_json::json!({"detail": "not found"})),
    }));
    let ctx = backend.context();
    ctx.update_store(|s| {
        s.set_current_session(Some("s1".into()));
        s.set_current_job(Some(separated_job()));
        s.toggle_mashup_track("j1_vocals").unwrap();
        s.toggle_mashup_track("j1_drums").unwrap();
    });

    let job_id = mashup::create_mashup(&ctx).await.unwrap();
    assert_eq!(job_id, "m1");
    let handle = mashup::poll_mashup(&ctx, &job_id);
    assert_eq!(handle.join().await, PollOutcome::Completed);

    let job = ctx.with_store(|s| s.mashup_job().cloned()).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.result_url.as_deref(), Some("/download/s1/mashup"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.count("GET", "/mashup-status/m1"), 3);
}

#[tokio::test]
async fn test_downloads_and_session_passthroughs() {
    let backend = StubBackend::start(Box::new(|hit| match (hit.method.as_str(), hit.url.as_str()) {
        ("GET", "/download/s1/vocals") => (200, b"RIFFvocals".to_vec()),
        ("GET", "/download/s1/all") => (200, b"PKarchive".to_vec()),
        ("GET", "/session/s1") => json(
            200,
            serde_json::json!({"session_id": "s1", "filename": "song.wav", "stems": ["vocals"]}),
        ),
        ("DELETE", "/session/s1") => json(200, serde_json::json!({"message": "deleted"})),
        ("GET", "/health") => json(200, serde_json::json!({"status": "healthy", "gpu": true})),
        _ => json(404, serde_json::json!({"detail": "not found"})),
    }));
    let ctx = backend.context();
    let dir = tempfile::tempdir().unwrap();

    let info = session::load_session(&ctx, "s1").await.unwrap();
    assert_eq!(info.filename.as_deref(), Some("song.wav"));
    assert!(info.extra.contains_key("stems"));

    let stem = session::download_stem(&ctx, "vocals", dir.path()).await.unwrap();
    assert_eq!(std::fs::read(&stem).unwrap(), b"RIFFvocals");
    let all = session::download_all_stems(&ctx, dir.path()).await.unwrap();
    assert_eq!(std::fs::read(&all).unwrap(), b"PKarchive");

    let err = session::download_stem(&ctx, "bass", dir.path()).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionNotFound(_)));

    assert_eq!(session::check_health(&ctx).await.unwrap().status, "healthy");

    session::delete_session(&ctx, "s1").await.unwrap();
    assert!(ctx.with_store(|s| s.current_session().is_none()));
}

#[tokio::test]
async fn test_stats_watcher_refreshes() {
    let backend = StubBackend::start(Box::new(|hit| match hit.url.as_str() {
        "/stats" => json(
            200,
            serde_json::json!({
                "cpu_usage": 12.5,
                "memory_usage": 40.0,
                "gpu_usage": null,
                "disk_usage": 70.0,
                "active_jobs": 1,
                "queue_length": 0,
                "uptime": 3725
            }),
        ),
        _ => json(404, serde_json::json!({})),
    }));
    let ctx = backend.context();

    let mut watcher = session::StatsWatcher::spawn(&ctx);
    let first = watcher.changed().await.unwrap();
    let stats = first.stats.unwrap();
    assert_eq!(stats.active_jobs, 1);
    assert_eq!(session::format_uptime(stats.uptime), "1h 2m");
    watcher.changed().await.unwrap();
    watcher.stop().await;

    assert!(backend.count("GET", "/stats") >= 2);
}
