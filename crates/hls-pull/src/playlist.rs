//! Playlist fetcher: one bounded GET of a media playlist, gzip handling and parsing.

use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;
use m3u8_rs::{MediaPlaylist, parse_playlist_res};
use reqwest::Client;
use reqwest::header::CONTENT_ENCODING;
use tracing::{debug, trace};

use crate::HlsPullError;
use crate::client::RequestTemplate;

/// A parsed live media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    /// `#EXT-X-MEDIA-SEQUENCE`
    pub sequence: u64,
    /// `#EXT-X-TARGETDURATION`, in seconds.
    pub target_duration: u64,
    pub items: Vec<PlaylistItem>,
    /// The playlist text as received (after decompression).
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistItem {
    Segment(SegmentItem),
    Discontinuity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentItem {
    /// Segment reference exactly as written in the playlist.
    pub uri: String,
    pub duration: f32,
}

impl Playlist {
    pub fn parse(body: &[u8]) -> Result<Self, HlsPullError> {
        match parse_playlist_res(body) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => Ok(Self::from_media(
                media,
                String::from_utf8_lossy(body).into_owned(),
            )),
            Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(HlsPullError::PlaylistError(
                "Expected Media Playlist, got Master".to_string(),
            )),
            Err(e) => Err(HlsPullError::PlaylistError(format!(
                "Failed to parse playlist: {e}"
            ))),
        }
    }

    fn from_media(media: MediaPlaylist, text: String) -> Self {
        let mut items = Vec::with_capacity(media.segments.len());
        for segment in media.segments {
            // The parser attaches the tag to the segment that follows it.
            if segment.discontinuity {
                items.push(PlaylistItem::Discontinuity);
            }
            items.push(PlaylistItem::Segment(SegmentItem {
                uri: segment.uri,
                duration: segment.duration,
            }));
        }
        Self {
            sequence: media.media_sequence,
            target_duration: media.target_duration,
            items,
            text,
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentItem> {
        self.items.iter().filter_map(|item| match item {
            PlaylistItem::Segment(segment) => Some(segment),
            PlaylistItem::Discontinuity => None,
        })
    }
}

/// Fetches one rendition's playlist. Never retries; the poll loop decides.
#[derive(Debug, Clone)]
pub struct PlaylistFetcher {
    http_client: Client,
    template: RequestTemplate,
}

impl PlaylistFetcher {
    pub fn new(http_client: Client, template: RequestTemplate) -> Self {
        Self {
            http_client,
            template,
        }
    }

    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    pub async fn fetch(&self) -> Result<Playlist, HlsPullError> {
        let playlist_url = self.template.url().clone();
        let response = self
            .template
            .get(&self.http_client, playlist_url.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HlsPullError::HttpStatus {
                status: response.status(),
                url: playlist_url.to_string(),
            });
        }

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

        let body = response.bytes().await?;
        trace!(url = %playlist_url, len = body.len(), gzipped, "Playlist response received");

        let body = if gzipped { gunzip(&body)? } else { body };
        let playlist = Playlist::parse(&body)?;
        debug!(
            url = %playlist_url,
            sequence = playlist.sequence,
            target_duration = playlist.target_duration,
            items = playlist.items.len(),
            "Playlist parsed"
        );
        Ok(playlist)
    }
}

/// Inflates a gzip encoded playlist body.
pub fn gunzip(body: &[u8]) -> Result<Bytes, HlsPullError> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::with_capacity(body.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| HlsPullError::DecompressError(e.to_string()))?;
    Ok(Bytes::from(out))
}
