//! Common utilities for integration tests

#![allow(dead_code)]

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use clone_core::{CloneJob, VoiceCloner};
use clone_server::{build_router, config::ServerConfig, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "clone-test-boundary";

/// Stand-in for the model: remembers each reference and writes a short WAV.
#[derive(Default)]
pub struct FakeCloner {
    pub references: Mutex<Vec<PathBuf>>,
    pub failure: Option<String>,
    /// Leave a partial file behind and stall this long before finishing.
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCloner {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Most calls that were ever inside the model at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn references(&self) -> Vec<PathBuf> {
        self.references.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceCloner for FakeCloner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn check(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clone_to_file(&self, job: &CloneJob<'_>) -> anyhow::Result<()> {
        self.references.lock().unwrap().push(job.reference.to_path_buf());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = self.synthesize(job).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeCloner {
    async fn synthesize(&self, job: &CloneJob<'_>) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            std::fs::write(job.output, b"RIFFpartial")?;
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        std::fs::write(job.output, wav_bytes())?;
        Ok(())
    }
}

/// 50 ms of silence, 16 kHz mono.
pub fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    buf
}

pub struct TestApp {
    pub router: Router,
    pub cloner: Arc<FakeCloner>,
    pub root: TempDir,
}

impl TestApp {
    pub fn voices_dir(&self) -> PathBuf {
        self.root.path().join("voices")
    }

    pub fn cloned_dir(&self) -> PathBuf {
        self.root.path().join("cloned")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Upload a WAV sample for `user_id` and return the stored path.
    pub async fn upload_sample(&self, user_id: &str) -> PathBuf {
        let (status, body) = self
            .send_json(upload_request(Some(user_id), Some(("me.wav", wav_bytes().as_slice()))))
            .await;
        assert_eq!(status, StatusCode::OK, "upload failed: {body}");
        PathBuf::from(body["file_path_on_server"].as_str().unwrap())
    }
}

/// Create a test app over temp directories and a fake model.
pub fn create_test_app() -> TestApp {
    create_test_app_with(FakeCloner::default())
}

pub fn create_test_app_with(cloner: FakeCloner) -> TestApp {
    create_test_app_with_config(cloner, |_| {})
}

/// Like [`create_test_app_with`], with a hook to adjust the server config.
pub fn create_test_app_with_config(
    cloner: FakeCloner,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let mut config = ServerConfig {
        voices_dir: root.path().join("voices"),
        cloned_dir: root.path().join("cloned"),
        rate_limit_per_minute: 10_000,
        ..ServerConfig::default()
    };
    configure(&mut config);
    let cloner = Arc::new(cloner);
    let state = AppState::new(config, cloner.clone()).unwrap();
    let router = build_router(state).unwrap();
    TestApp {
        router,
        cloner,
        root,
    }
}

pub fn multipart_body(user_id: Option<&str>, audio: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(user_id) = user_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\n{user_id}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = audio {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(user_id: Option<&str>, audio: Option<(&str, &[u8])>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/record_voice")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(user_id, audio)))
        .unwrap()
}

pub fn clone_request(fields: &[(&str, &str)]) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();
    Request::builder()
        .method("POST")
        .uri("/clone_voice")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}
