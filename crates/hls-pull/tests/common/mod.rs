#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use hls_pull::{ConsumerError, IngestConfig, RequestTemplate, SegmentConsumer};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Pull timings shrunk so a test runs in milliseconds.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        request_timeout: Duration::from_secs(2),
        retry_delay: Duration::from_millis(5),
        stale_delay: Duration::from_millis(5),
        min_refresh_interval: Duration::from_millis(5),
        ..IngestConfig::default()
    }
}

/// Live playlist text with a zero target duration, so refreshes only wait
/// for the configured minimum.
pub fn media_playlist(sequence: u64, items: &[&str]) -> String {
    let mut text = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:0\n#EXT-X-MEDIA-SEQUENCE:{sequence}\n"
    );
    for item in items {
        if *item == "DISCONTINUITY" {
            text.push_str("#EXT-X-DISCONTINUITY\n");
        } else {
            text.push_str("#EXTINF:2.000,\n");
            text.push_str(item);
            text.push('\n');
        }
    }
    text
}

/// Body of a segment named `name`: whole 188 byte packets tagged with the name.
pub fn segment_body(name: &str) -> Bytes {
    let mut body = vec![0xFF; 188 * 2];
    for packet in body.chunks_mut(188) {
        packet[0] = 0x47;
        let tag = name.as_bytes();
        let len = tag.len().min(180);
        packet[4..4 + len].copy_from_slice(&tag[..len]);
    }
    Bytes::from(body)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Playlist(String),
    Gzipped(String),
    Status(u16),
}

#[derive(Default)]
struct FixtureState {
    // Each request pops the front reply; the last one keeps being served.
    scripts: Mutex<HashMap<String, Vec<Reply>>>,
    segment_status: Mutex<HashMap<String, u16>>,
    gzip_segments: Mutex<HashSet<String>>,
    request_counts: Mutex<HashMap<String, usize>>,
    last_headers: Mutex<HashMap<String, HeaderMap>>,
}

pub struct TestServer {
    base_url: String,
    state: Arc<FixtureState>,
}

impl TestServer {
    pub async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());

        let state = Arc::new(FixtureState::default());
        let app = Router::new().fallback(serve).with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn template(&self, path: &str) -> RequestTemplate {
        RequestTemplate::parse(&self.url(path), reqwest::header::HeaderMap::new()).unwrap()
    }

    /// Replies served in order for `path`; the last one repeats.
    pub fn script(&self, path: &str, replies: Vec<Reply>) {
        self.state.scripts.lock().insert(path.to_string(), replies);
    }

    pub fn fail_segment(&self, path: &str, status: u16) {
        self.state
            .segment_status
            .lock()
            .insert(path.to_string(), status);
    }

    /// Serves the segment at `path` with `Content-Encoding: gzip`.
    pub fn gzip_segment(&self, path: &str) {
        self.state.gzip_segments.lock().insert(path.to_string());
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.state
            .request_counts
            .lock()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_headers(&self, path: &str) -> Option<HeaderMap> {
        self.state.last_headers.lock().get(path).cloned()
    }
}

async fn serve(State(state): State<Arc<FixtureState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    *state.request_counts.lock().entry(path.clone()).or_insert(0) += 1;
    state.last_headers.lock().insert(path.clone(), headers);

    if path.ends_with(".m3u8") {
        let reply = {
            let mut scripts = state.scripts.lock();
            match scripts.get_mut(&path) {
                Some(replies) if replies.len() > 1 => Some(replies.remove(0)),
                Some(replies) => replies.first().cloned(),
                None => None,
            }
        };
        return match reply {
            Some(Reply::Playlist(text)) => text.into_response(),
            Some(Reply::Gzipped(text)) => gzipped(text.as_bytes()),
            Some(Reply::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if let Some(code) = state.segment_status.lock().get(&path).copied() {
        return StatusCode::from_u16(code).unwrap().into_response();
    }
    let name = path.rsplit('/').next().unwrap_or_default();
    if state.gzip_segments.lock().contains(&path) {
        return gzipped(&segment_body(name));
    }
    segment_body(name).into_response()
}

fn gzipped(data: &[u8]) -> Response {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let body = encoder.finish().unwrap();
    (
        [(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"))],
        body,
    )
        .into_response()
}

/// Consumer double recording every fed segment.
#[derive(Default)]
pub struct RecordingConsumer {
    fed: Mutex<Vec<Bytes>>,
    /// 1-based feed that fails with a decode error.
    fail_at: Option<usize>,
    failure: Mutex<Option<ConsumerError>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    cancel: CancellationToken,
}

impl RecordingConsumer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn failing_at(cancel: CancellationToken, feed: usize) -> Self {
        Self {
            cancel,
            fail_at: Some(feed),
            ..Default::default()
        }
    }

    pub fn fed(&self) -> Vec<Bytes> {
        self.fed.lock().clone()
    }

    pub fn feed_count(&self) -> usize {
        self.fed.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SegmentConsumer for RecordingConsumer {
    async fn feed(&self, data: Bytes) -> Result<(), ConsumerError> {
        // Feeds of both renditions serialize here.
        let mut fed = self.fed.lock();
        if let Some(err) = self.err() {
            return Err(err);
        }
        if self.is_closed() {
            return Err(ConsumerError::InputClosed);
        }
        fed.push(data);
        if self.fail_at == Some(fed.len()) {
            let err = ConsumerError::Decode("scripted failure".to_string());
            *self.failure.lock() = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    fn err(&self) -> Option<ConsumerError> {
        if let Some(err) = self.failure.lock().clone() {
            return Some(err);
        }
        self.cancel
            .is_cancelled()
            .then_some(ConsumerError::Cancelled)
    }

    fn queued(&self) -> usize {
        self.fed.lock().len()
    }

    fn close_input(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_calls.fetch_add(1, Ordering::AcqRel);
    }
}
