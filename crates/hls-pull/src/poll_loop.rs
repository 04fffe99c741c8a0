//! Poll loop: drives one rendition from playlist polls to fed segments.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ConsumerError;
use crate::config::IngestConfig;
use crate::consumer::SegmentConsumer;
use crate::info::M3u8Info;
use crate::ingestor::{IngestReport, SegmentIngestor};
use crate::playlist::PlaylistFetcher;
use crate::tracker::{SegmentTracker, TrackOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rendition {
    Video,
    Audio,
}

impl fmt::Display for Rendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendition::Video => f.write_str("video"),
            Rendition::Audio => f.write_str("audio"),
        }
    }
}

/// Why a poll loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The session was cancelled.
    Cancelled,
    /// Too many playlist fetches failed in a row.
    FetchExhausted { failures: u32, last_error: String },
    /// The consumer reported a terminal error; its input was closed.
    ConsumerTerminated(ConsumerError),
}

impl From<ConsumerError> for ExitReason {
    fn from(err: ConsumerError) -> Self {
        match err {
            ConsumerError::Cancelled => ExitReason::Cancelled,
            other => ExitReason::ConsumerTerminated(other),
        }
    }
}

#[derive(Debug)]
enum PollState {
    Starting,
    Polling,
    Sleeping(Duration),
    Terminated(ExitReason),
}

pub struct PollLoop {
    rendition: Rendition,
    stream_path: String,
    fetcher: PlaylistFetcher,
    ingestor: SegmentIngestor,
    tracker: SegmentTracker,
    consumer: Arc<dyn SegmentConsumer>,
    config: Arc<IngestConfig>,
    cancel: CancellationToken,
    info_tx: watch::Sender<M3u8Info>,
    consecutive_failures: u32,
    cycle: u64,
}

impl PollLoop {
    /// Creates the loop and the receiver through which its counters are observed.
    /// The receiver reports closed once the loop has terminated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rendition: Rendition,
        stream_path: impl Into<String>,
        fetcher: PlaylistFetcher,
        ingestor: SegmentIngestor,
        consumer: Arc<dyn SegmentConsumer>,
        config: Arc<IngestConfig>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<M3u8Info>) {
        let (info_tx, info_rx) = watch::channel(M3u8Info::default());
        let poll_loop = Self {
            rendition,
            stream_path: stream_path.into(),
            fetcher,
            ingestor,
            tracker: SegmentTracker::new(),
            consumer,
            config,
            cancel,
            info_tx,
            consecutive_failures: 0,
            cycle: 0,
        };
        (poll_loop, info_rx)
    }

    pub async fn run(mut self) -> ExitReason {
        let mut state = PollState::Starting;
        loop {
            state = match state {
                PollState::Starting => {
                    info!(
                        stream_path = %self.stream_path,
                        rendition = %self.rendition,
                        url = %self.fetcher.template().url(),
                        "HLS pull started"
                    );
                    PollState::Polling
                }
                PollState::Polling => self.poll().await,
                PollState::Sleeping(delay) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => PollState::Terminated(ExitReason::Cancelled),
                        _ = tokio::time::sleep(delay) => PollState::Polling,
                    }
                }
                PollState::Terminated(reason) => {
                    self.terminate(&reason);
                    return reason;
                }
            };
        }
    }

    fn stop_reason(&self) -> Option<ExitReason> {
        match self.consumer.err() {
            Some(err) => Some(err.into()),
            None if self.cancel.is_cancelled() => Some(ExitReason::Cancelled),
            None => None,
        }
    }

    async fn poll(&mut self) -> PollState {
        if let Some(reason) = self.stop_reason() {
            return PollState::Terminated(reason);
        }

        let playlist = match self.fetcher.fetch().await {
            Ok(playlist) => playlist,
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    stream_path = %self.stream_path,
                    rendition = %self.rendition,
                    failures = self.consecutive_failures,
                    error = %e,
                    "Playlist fetch failed"
                );
                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    return PollState::Terminated(ExitReason::FetchExhausted {
                        failures: self.consecutive_failures,
                        last_error: e.to_string(),
                    });
                }
                return PollState::Sleeping(self.config.retry_delay);
            }
        };
        self.consecutive_failures = 0;
        self.info_tx
            .send_modify(|info| info.last_m3u8.clone_from(&playlist.text));

        let segments = match self.tracker.track(&playlist) {
            TrackOutcome::Stale {
                sequence,
                watermark,
            } => {
                debug!(
                    stream_path = %self.stream_path,
                    rendition = %self.rendition,
                    sequence,
                    watermark,
                    "Playlist sequence did not advance"
                );
                return PollState::Sleeping(self.config.stale_delay);
            }
            TrackOutcome::Fresh(segments) => segments,
        };

        self.cycle += 1;
        debug!(
            stream_path = %self.stream_path,
            rendition = %self.rendition,
            cycle = self.cycle,
            sequence = playlist.sequence,
            segments = segments.len(),
            "New playlist"
        );
        self.info_tx.send_modify(|info| {
            info.m3u8_count += 1;
            info.m3u8_info.clear();
        });

        for segment in &segments {
            if let Some(reason) = self.stop_reason() {
                return PollState::Terminated(reason);
            }
            let report = self.ingestor.ingest(segment).await;
            self.record(&report);
            if let Some(err) = report.consumer_error {
                return PollState::Terminated(err.into());
            }
        }

        PollState::Sleeping(self.config.refresh_delay(playlist.target_duration))
    }

    fn record(&self, report: &IngestReport) {
        self.info_tx.send_modify(|info| {
            if report.downloaded {
                info.ts_count += 1;
            }
            if report.segment_error.is_some() {
                info.segment_errors += 1;
            }
            if report.persist_error.is_some() {
                info.persist_errors += 1;
            }
            info.m3u8_info.push(report.cost);
        });
    }

    fn terminate(&self, reason: &ExitReason) {
        match reason {
            ExitReason::Cancelled => info!(
                stream_path = %self.stream_path,
                rendition = %self.rendition,
                "HLS pull cancelled"
            ),
            ExitReason::FetchExhausted {
                failures,
                last_error,
            } => warn!(
                stream_path = %self.stream_path,
                rendition = %self.rendition,
                failures,
                last_error = %last_error,
                "HLS pull giving up after consecutive playlist failures"
            ),
            ExitReason::ConsumerTerminated(err) => {
                self.consumer.close_input();
                warn!(
                    stream_path = %self.stream_path,
                    rendition = %self.rendition,
                    error = %err,
                    "HLS pull stopped by consumer"
                );
            }
        }
        self.cancel.cancel();
    }
}
