use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Options recognised by the HLS plugin, as read from the host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsPluginConfig {
    /// Segment duration hint in seconds. Passed through, not used by the pull loop.
    pub fragment: u64,
    /// Playlist window size hint.
    pub window: usize,
    /// Persist segments of every published stream under `path`.
    pub enable_write: bool,
    /// Base directory for persisted segments.
    pub path: PathBuf,
    pub ingest: IngestSettings,
}

impl Default for HlsPluginConfig {
    fn default() -> Self {
        Self {
            fragment: 10,
            window: 2,
            enable_write: false,
            path: PathBuf::from("./hls"),
            ingest: IngestSettings::default(),
        }
    }
}

/// Serialisable pull loop tuning, durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub request_timeout_ms: u64,
    pub max_consecutive_failures: u32,
    pub retry_delay_ms: u64,
    pub stale_delay_ms: u64,
    pub min_refresh_interval_ms: u64,
    pub user_agent: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_consecutive_failures: 10,
            retry_delay_ms: 1_000,
            stale_delay_ms: 1_000,
            min_refresh_interval_ms: 1_000,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Runtime form of [`IngestSettings`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Timeout applied to every playlist and segment request.
    pub request_timeout: Duration,
    /// The loop terminates once this many playlist fetches failed in a row.
    pub max_consecutive_failures: u32,
    /// Delay before retrying after a failed playlist fetch.
    pub retry_delay: Duration,
    /// Pause after a poll whose sequence number did not advance.
    pub stale_delay: Duration,
    /// Lower bound for the `2 x target duration` refresh delay.
    pub min_refresh_interval: Duration,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from(&IngestSettings::default())
    }
}

impl From<&IngestSettings> for IngestConfig {
    fn from(settings: &IngestSettings) -> Self {
        Self {
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            max_consecutive_failures: settings.max_consecutive_failures,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            stale_delay: Duration::from_millis(settings.stale_delay_ms),
            min_refresh_interval: Duration::from_millis(settings.min_refresh_interval_ms),
            user_agent: settings.user_agent.clone(),
        }
    }
}

impl IngestConfig {
    /// Delay between two fresh polls for a playlist with the given target duration.
    pub fn refresh_delay(&self, target_duration: u64) -> Duration {
        Duration::from_secs(target_duration.saturating_mul(2)).max(self.min_refresh_interval)
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        // Only gzip: the playlist fetcher inflates it itself.
        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers
    }
}
