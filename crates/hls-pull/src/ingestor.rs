//! Segment ingestor: downloads one segment, optionally saves it, feeds it downstream.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use reqwest::Client;
use reqwest::header::CONTENT_ENCODING;
use tracing::{debug, warn};
use url::Url;

use crate::client::RequestTemplate;
use crate::consumer::SegmentConsumer;
use crate::info::TsCost;
use crate::persist::{SaveSwitch, SegmentWriter};
use crate::tracker::Segment;
use crate::{ConsumerError, HlsPullError};

/// Outcome of ingesting one segment.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Zero when the download failed.
    pub cost: TsCost,
    /// The body was fully downloaded.
    pub downloaded: bool,
    pub segment_error: Option<HlsPullError>,
    pub persist_error: Option<HlsPullError>,
    /// Set when the consumer ended; its input has been closed.
    pub consumer_error: Option<ConsumerError>,
}

impl IngestReport {
    pub fn consumer_terminated(&self) -> bool {
        self.consumer_error.is_some()
    }
}

pub struct SegmentIngestor {
    http_client: Client,
    template: RequestTemplate,
    consumer: Arc<dyn SegmentConsumer>,
    save: SaveSwitch,
    writer: SegmentWriter,
    label: String,
}

impl SegmentIngestor {
    pub fn new(
        http_client: Client,
        template: RequestTemplate,
        consumer: Arc<dyn SegmentConsumer>,
        save: SaveSwitch,
        writer: SegmentWriter,
        label: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            template,
            consumer,
            save,
            writer,
            label: label.into(),
        }
    }

    async fn download(&self, url: &Url) -> Result<Bytes, HlsPullError> {
        let response = self
            .template
            .get(&self.http_client, url.clone())
            .send()
            .await
            .map_err(|e| HlsPullError::SegmentFetchError(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(HlsPullError::SegmentFetchError(format!(
                "Server returned status code {} for segment {url}",
                response.status()
            )));
        }

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

        let body = response
            .bytes()
            .await
            .map_err(|e| HlsPullError::SegmentFetchError(format!("reading {url}: {e}")))?;

        // The client asks for gzip but does not decode it; the consumer wants raw TS.
        if gzipped {
            return crate::playlist::gunzip(&body)
                .map_err(|e| HlsPullError::SegmentFetchError(format!("inflating {url}: {e}")));
        }
        Ok(body)
    }

    pub async fn ingest(&self, segment: &Segment) -> IngestReport {
        let mut report = IngestReport::default();

        let url = match self.template.resolve(&segment.uri) {
            Ok(url) => url,
            Err(e) => {
                warn!(stream = %self.label, segment = %segment.uri, error = %e, "Unresolvable segment");
                report.segment_error = Some(e);
                return report;
            }
        };

        let started = Instant::now();
        let body = match self.download(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(stream = %self.label, error = %e, "Segment download failed");
                report.segment_error = Some(e);
                return report;
            }
        };
        let download_cost = started.elapsed().as_millis() as u64;
        report.downloaded = true;

        // The in-flight request was allowed to finish; do not feed a dead consumer.
        if let Some(err) = self.consumer.err() {
            self.consumer.close_input();
            report.consumer_error = Some(err);
            return report;
        }

        if self.save.is_active()
            && let Err(e) = self.writer.write(&url, &body).await
        {
            warn!(stream = %self.label, segment = %url, error = %e, "Failed to save segment");
            report.persist_error = Some(e);
        }

        let before = self.consumer.queued();
        let started = Instant::now();
        let fed = self.consumer.feed(body).await;
        let decode_cost = started.elapsed().as_millis() as u64;
        let after = self.consumer.queued();

        report.cost = TsCost {
            download_cost,
            decode_cost,
            buffer_length: after,
            pes_count: after as i64 - before as i64,
        };

        if let Some(err) = fed.err().or_else(|| self.consumer.err()) {
            warn!(stream = %self.label, error = %err, "Consumer ended, closing its input");
            self.consumer.close_input();
            report.consumer_error = Some(err);
        } else {
            debug!(
                stream = %self.label,
                segment = %segment.uri,
                download_ms = download_cost,
                decode_ms = decode_cost,
                queued = after,
                "Segment ingested"
            );
        }
        report
    }
}
