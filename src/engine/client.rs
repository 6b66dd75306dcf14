//! Backend client
//!
//! Single choke point for every HTTP call to the separation/mashup backend.
//! One shared timeout, one status-code translation, one request id per call.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::types::{
    HealthStatus, MashupRequest, MashupResponse, MashupStatusResponse, SeparationResponse,
    ServerStats, SessionInfo, StatusResponse, UploadResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::services::settings::Settings;

/// Size of the pieces the upload body is streamed in (progress granularity).
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Header carrying the per-call id, echoed in our logs.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP client for the backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Settings(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> ApiResult<Self> {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL for a path built from caller-supplied segments, each one
    /// percent-encoded so ids cannot add segments, a query or a fragment.
    fn endpoint(&self, segments: &[&str]) -> ApiResult<String> {
        let invalid = || ApiError::Settings(format!("Invalid API URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// Send a request and turn non-success statuses into `ApiError`.
    ///
    /// `session_id` is set for session-scoped endpoints so a 404 becomes
    /// `SessionNotFound` instead of a bare HTTP error.
    async fn send(
        &self,
        request: RequestBuilder,
        label: &str,
        session_id: Option<&str>,
    ) -> ApiResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        log::debug!("[{}] {}", request_id, label);

        let response = request
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await
            .map_err(|e| {
                log::warn!("[{}] {} failed: {}", request_id, label, e);
                ApiError::Network(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::error!("[{}] {} -> HTTP {}: {}", request_id, label, status.as_u16(), body);
        Err(map_status(status.as_u16(), body, session_id))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        session_id: Option<&str>,
    ) -> ApiResult<T> {
        let label = format!("GET {}", url);
        let response = self.send(self.http.get(url), &label, session_id).await?;
        decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
        session_id: Option<&str>,
    ) -> ApiResult<T> {
        let label = format!("POST {}", url);
        let request = self.http.post(url).json(body);
        let response = self.send(request, &label, session_id).await?;
        decode(response).await
    }

    async fn get_bytes(&self, url: String, session_id: Option<&str>) -> ApiResult<Vec<u8>> {
        let label = format!("GET {}", url);
        let response = self.send(self.http.get(url), &label, session_id).await?;
        let bytes = response.bytes().await.map_err(ApiError::from)?;
        Ok(bytes.to_vec())
    }

    /// Upload an audio file as multipart form data.
    ///
    /// `on_progress` receives the sent fraction as a percentage (0-100) as
    /// the body is consumed. Type and size checks are the caller's job.
    pub async fn upload_audio<F>(
        &self,
        file_name: &str,
        mime: &str,
        data: Vec<u8>,
        on_progress: F,
    ) -> ApiResult<UploadResponse>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let data = Bytes::from(data);
        let total = data.len() as u64;
        let chunks = upload_chunks(&data, UPLOAD_CHUNK_SIZE);

        let mut sent: u64 = 0;
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(upload_percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| ApiError::Validation(format!("Invalid MIME type {}: {}", mime, e)))?;
        let form = Form::new().part("file", part);

        log::info!("Uploading {} ({} bytes)", file_name, total);
        let request = self.http.post(self.url("/upload")).multipart(form);
        let response = self.send(request, "POST /upload", None).await?;
        decode(response).await
    }

    pub async fn start_separation(&self, session_id: &str) -> ApiResult<SeparationResponse> {
        let body = serde_json::json!({ "session_id": session_id });
        self.post_json(self.url("/separate"), &body, Some(session_id)).await
    }

    pub async fn get_job_status(&self, job_id: &str) -> ApiResult<StatusResponse> {
        self.get_json(self.endpoint(&["status", job_id])?, None).await
    }

    pub async fn create_mashup(&self, request: &MashupRequest) -> ApiResult<MashupResponse> {
        self.post_json(self.url("/mashup"), request, Some(&request.session_id))
            .await
    }

    pub async fn get_mashup_status(&self, job_id: &str) -> ApiResult<MashupStatusResponse> {
        self.get_json(self.endpoint(&["mashup-status", job_id])?, None)
            .await
    }

    pub async fn download_stem(&self, session_id: &str, stem_name: &str) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(&["download", session_id, stem_name])?;
        self.get_bytes(url, Some(session_id)).await
    }

    /// All stems of a session as one archive.
    pub async fn download_all_stems(&self, session_id: &str) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(&["download", session_id, "all"])?;
        self.get_bytes(url, Some(session_id)).await
    }

    /// Fetch a finished mashup. `result_url` is either absolute or a path
    /// on the backend, as reported by the mashup status.
    pub async fn download_result(&self, result_url: &str) -> ApiResult<Vec<u8>> {
        let url = if result_url.starts_with("http://") || result_url.starts_with("https://") {
            result_url.to_string()
        } else if result_url.starts_with('/') {
            self.url(result_url)
        } else {
            self.url(&format!("/{}", result_url))
        };
        self.get_bytes(url, None).await
    }

    pub async fn get_session_info(&self, session_id: &str) -> ApiResult<SessionInfo> {
        self.get_json(self.endpoint(&["session", session_id])?, Some(session_id))
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["session", session_id])?;
        let label = format!("DELETE {}", url);
        self.send(self.http.delete(url), &label, Some(session_id))
            .await?;
        Ok(())
    }

    pub async fn get_server_stats(&self) -> ApiResult<ServerStats> {
        self.get_json(self.url("/stats"), None).await
    }

    pub async fn health_check(&self) -> ApiResult<HealthStatus> {
        self.get_json(self.url("/health"), None).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await.map_err(ApiError::from)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Split `data` into `size`-byte pieces. Slices share the one buffer.
fn upload_chunks(data: &Bytes, size: usize) -> Vec<Bytes> {
    (0..data.len())
        .step_by(size)
        .map(|start| data.slice(start..(start + size).min(data.len())))
        .collect()
}

fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 * 100.0) / total as f64).round().min(100.0) as u8
}

/// Translate a non-success HTTP status into the error taxonomy.
pub fn map_status(status: u16, body: String, session_id: Option<&str>) -> ApiError {
    match status {
        413 => ApiError::PayloadTooLarge,
        429 => ApiError::RateLimited,
        s if s >= 500 => ApiError::Server { status: s },
        404 if session_id.is_some() => {
            ApiError::SessionNotFound(session_id.unwrap_or_default().to_string())
        }
        _ => ApiError::Http { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert!(matches!(map_status(413, String::new(), None), ApiError::PayloadTooLarge));
        assert!(matches!(map_status(429, String::new(), None), ApiError::RateLimited));
        assert!(matches!(map_status(503, String::new(), None), ApiError::Server { status: 503 }));
        assert!(matches!(
            map_status(404, String::new(), Some("s1")),
            ApiError::SessionNotFound(ref s) if s == "s1"
        ));
        match map_status(400, "bad request".into(), None) {
            ApiError::Http { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad request");
            }
            other => panic!("unexpected {:?}", other),
        }
        // Without a session a 404 is passed through unmodified
        assert!(matches!(map_status(404, String::new(), None), ApiError::Http { status: 404, .. }));
    }

    #[test]
    fn test_upload_percent() {
        assert_eq!(upload_percent(0, 200), 0);
        assert_eq!(upload_percent(100, 200), 50);
        assert_eq!(upload_percent(200, 200), 100);
        assert_eq!(upload_percent(0, 0), 100);
        assert_eq!(upload_percent(1, 3), 33);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/health"), "http://localhost:8000/health");
    }

    #[test]
    fn test_upload_chunks_share_buffer() {
        let data = Bytes::from((0..10u8).collect::<Vec<u8>>());
        let chunks = upload_chunks(&data, 4);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(&chunks[2][..], &[8, 9]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.as_ptr(), data[i * 4..].as_ptr());
        }
        assert!(upload_chunks(&Bytes::new(), 4).is_empty());
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = ApiClient::new("http://localhost:8000", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["download", "s1", "vocals"]).unwrap(),
            "http://localhost:8000/download/s1/vocals"
        );
        assert_eq!(
            client.endpoint(&["download", "s1", "a/b?c#d"]).unwrap(),
            "http://localhost:8000/download/s1/a%2Fb%3Fc%23d"
        );

        // A path prefix on the base URL is kept
        let client = ApiClient::new("http://gpu-box:9000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["status", "j1"]).unwrap(),
            "http://gpu-box:9000/api/status/j1"
        );
    }
}
