use reqwest::Client;
use reqwest::header::HeaderMap;
use tracing::debug;
use url::Url;

use crate::HlsPullError;
use crate::config::IngestConfig;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &IngestConfig) -> Result<Client, HlsPullError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(IngestConfig::get_default_headers())
        .redirect(reqwest::redirect::Policy::limited(10));

    if !config.request_timeout.is_zero() {
        client_builder = client_builder.timeout(config.request_timeout);
    }

    debug!(timeout = ?config.request_timeout, "Building HLS pull client");
    client_builder.build().map_err(HlsPullError::from)
}

/// Playlist URL and headers of one rendition.
///
/// Captured once when a session is published and never mutated afterwards;
/// both the playlist and the segment requests are built from it.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    url: Url,
    headers: HeaderMap,
}

impl RequestTemplate {
    pub fn new(url: Url, headers: HeaderMap) -> Self {
        Self { url, headers }
    }

    pub fn parse(url: &str, headers: HeaderMap) -> Result<Self, HlsPullError> {
        let url = Url::parse(url)
            .map_err(|e| HlsPullError::UrlError(format!("Invalid playlist URL {url}: {e}")))?;
        Ok(Self::new(url, headers))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Resolves a segment reference relative to the playlist URL.
    pub fn resolve(&self, segment_uri: &str) -> Result<Url, HlsPullError> {
        self.url.join(segment_uri).map_err(|e| {
            HlsPullError::UrlError(format!(
                "Could not join playlist URL {} with segment URI {segment_uri}: {e}",
                self.url
            ))
        })
    }

    pub(crate) fn get(&self, client: &Client, url: Url) -> reqwest::RequestBuilder {
        client.get(url).headers(self.headers.clone())
    }
}
