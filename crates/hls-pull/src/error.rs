use reqwest::StatusCode;
use std::sync::Arc;

/// Errors produced while pulling a live HLS rendition.
///
/// Playlist-level failures (`NetworkError`, `HttpStatus`, `DecompressError`,
/// `PlaylistError`) all count against a rendition's consecutive-failure cap.
/// `SegmentFetchError` and `IoError` stay local to a single segment.
#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsPullError {
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("Server returned status code {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("Failed to decompress playlist: {0}")]
    DecompressError(String),
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("Segment fetch error: {0}")]
    SegmentFetchError(String),
    #[error("Invalid URL: {0}")]
    UrlError(String),
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),
    #[error("Stream {0} is already publishing")]
    AlreadyPublishing(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// Manual implementation of From<reqwest::Error> because of the Arc wrapping.
impl From<reqwest::Error> for HlsPullError {
    fn from(err: reqwest::Error) -> Self {
        HlsPullError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsPullError {
    fn from(err: std::io::Error) -> Self {
        HlsPullError::IoError {
            source: Arc::new(err),
        }
    }
}

impl HlsPullError {
    /// True for failures of the playlist request itself (transport, status,
    /// gzip or parse), the ones a poll loop retries.
    pub fn is_playlist_failure(&self) -> bool {
        matches!(
            self,
            HlsPullError::NetworkError { .. }
                | HlsPullError::HttpStatus { .. }
                | HlsPullError::DecompressError(_)
                | HlsPullError::PlaylistError(_)
        )
    }
}

/// Terminal conditions reported by a downstream segment consumer.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    #[error("consumer cancelled")]
    Cancelled,
    #[error("consumer input closed")]
    InputClosed,
    #[error("decode failed: {0}")]
    Decode(String),
}

pub type Result<T, E = HlsPullError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_failures_are_classified() {
        assert!(HlsPullError::DecompressError("bad header".into()).is_playlist_failure());
        assert!(HlsPullError::PlaylistError("no #EXTM3U".into()).is_playlist_failure());
        assert!(
            HlsPullError::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                url: "http://localhost/a.m3u8".into(),
            }
            .is_playlist_failure()
        );
        assert!(!HlsPullError::SegmentFetchError("404".into()).is_playlist_failure());
        assert!(!HlsPullError::Consumer(ConsumerError::Cancelled).is_playlist_failure());
    }

    #[test]
    fn io_errors_are_wrapped() {
        let err: HlsPullError = std::io::Error::other("disk full").into();
        assert!(err.to_string().contains("disk full"));
    }
}
