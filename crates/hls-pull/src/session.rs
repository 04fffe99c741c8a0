//! Stream sessions: one per published stream path, owning its poll loops.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::HlsPullError;
use crate::client::{RequestTemplate, create_client};
use crate::config::{HlsPluginConfig, IngestConfig};
use crate::consumer::SegmentConsumer;
use crate::info::{HlsInfo, M3u8Info, TsInfo};
use crate::ingestor::SegmentIngestor;
use crate::persist::{SaveGuard, SaveSwitch, SegmentWriter, prepare_base_dir};
use crate::playlist::PlaylistFetcher;
use crate::plugin::{PublishHook, PublishHooks, persistence_hook};
use crate::poll_loop::{ExitReason, PollLoop, Rendition};
use crate::registry::SessionRegistry;

/// What a publisher hands over to start pulling a stream.
pub struct PublishRequest {
    pub stream_path: String,
    pub video: RequestTemplate,
    pub audio: Option<RequestTemplate>,
    pub consumer: Arc<dyn SegmentConsumer>,
    /// Shared with `consumer`; cancelling it stops both directions.
    pub cancel: CancellationToken,
}

pub struct StreamSession {
    stream_path: String,
    consumer: Arc<dyn SegmentConsumer>,
    cancel: CancellationToken,
    save: SaveSwitch,
    renditions: Vec<(Rendition, watch::Receiver<M3u8Info>)>,
    loops: Mutex<Vec<(Rendition, JoinHandle<ExitReason>)>>,
    exit_reasons: Mutex<Vec<(Rendition, ExitReason)>>,
    closed: CancellationToken,
}

impl StreamSession {
    pub(crate) fn new(
        stream_path: String,
        consumer: Arc<dyn SegmentConsumer>,
        cancel: CancellationToken,
        save: SaveSwitch,
        renditions: Vec<(Rendition, watch::Receiver<M3u8Info>)>,
    ) -> Self {
        Self {
            stream_path,
            consumer,
            cancel,
            save,
            renditions,
            loops: Mutex::new(Vec::new()),
            exit_reasons: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        }
    }

    pub fn stream_path(&self) -> &str {
        &self.stream_path
    }

    pub fn consumer(&self) -> &Arc<dyn SegmentConsumer> {
        &self.consumer
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stops every poll loop of the session and its consumer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn save_switch(&self) -> &SaveSwitch {
        &self.save
    }

    /// Saves segments to disk until the returned guard is dropped.
    pub fn begin_save(&self) -> SaveGuard {
        self.save.begin()
    }

    /// Resolves once the loops were joined and the session was unregistered.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Exit reasons of the joined loops, filled in during teardown.
    pub fn exit_reasons(&self) -> Vec<(Rendition, ExitReason)> {
        self.exit_reasons.lock().clone()
    }

    /// Copy of the live counters. Renditions whose loop has ended are left out.
    pub fn snapshot(&self) -> HlsInfo {
        let mut info = HlsInfo {
            stream_path: self.stream_path.clone(),
            ..Default::default()
        };
        for (rendition, rx) in &self.renditions {
            if rx.has_changed().is_err() {
                continue;
            }
            let current = rx.borrow().clone();
            match rendition {
                Rendition::Video => info.video = Some(current),
                Rendition::Audio => info.audio = Some(current),
            }
        }
        let last_cost = info
            .video
            .iter()
            .chain(info.audio.iter())
            .filter_map(|m| m.m3u8_info.last())
            .next_back();
        info.ts_info = TsInfo {
            buffer_length: self.consumer.queued(),
            pes_count: last_cost.map_or(0, |cost| cost.pes_count),
        };
        info
    }

    fn attach(&self, rendition: Rendition, handle: JoinHandle<ExitReason>) {
        self.loops.lock().push((rendition, handle));
    }

    /// Joins the loops and closes the consumer's input.
    async fn teardown(&self) {
        let loops = std::mem::take(&mut *self.loops.lock());
        for (rendition, handle) in loops {
            let reason = match handle.await {
                Ok(reason) => reason,
                Err(e) => {
                    error!(stream_path = %self.stream_path, %rendition, error = %e, "Poll loop task failed");
                    ExitReason::Cancelled
                }
            };
            self.exit_reasons.lock().push((rendition, reason));
        }
        self.consumer.close_input();
    }
}

/// Owns the registry and starts sessions for published streams.
pub struct SessionManager {
    config: HlsPluginConfig,
    ingest: Arc<IngestConfig>,
    http_client: Client,
    registry: Arc<SessionRegistry>,
    hooks: PublishHooks,
}

impl SessionManager {
    /// Prepares the persistence directory and the publish hooks, then returns
    /// a manager ready to publish.
    pub fn start(config: HlsPluginConfig) -> Result<Self, HlsPullError> {
        let ingest = IngestConfig::from(&config.ingest);
        let http_client = create_client(&ingest)?;
        Self::with_client(config, http_client)
    }

    pub fn with_client(config: HlsPluginConfig, http_client: Client) -> Result<Self, HlsPullError> {
        let ingest = Arc::new(IngestConfig::from(&config.ingest));
        if ingest.max_consecutive_failures == 0 {
            return Err(HlsPullError::ConfigError(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        prepare_base_dir(&config.path)?;
        let mut hooks = PublishHooks::default();
        if config.enable_write {
            hooks.add(persistence_hook());
        }

        Ok(Self {
            config,
            ingest,
            http_client,
            registry: Arc::new(SessionRegistry::new()),
            hooks,
        })
    }

    pub fn config(&self) -> &HlsPluginConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn add_hook(&mut self, hook: PublishHook) {
        self.hooks.add(hook);
    }

    /// Registers a session and spawns one poll loop per rendition.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, request: PublishRequest) -> Result<Arc<StreamSession>, HlsPullError> {
        let PublishRequest {
            stream_path,
            video,
            audio,
            consumer,
            cancel,
        } = request;

        if self.registry.contains(&stream_path) {
            return Err(HlsPullError::AlreadyPublishing(stream_path));
        }

        let save = SaveSwitch::new();

        let mut loops = Vec::new();
        let mut receivers = Vec::new();
        for (rendition, template) in
            std::iter::once((Rendition::Video, video)).chain(audio.map(|a| (Rendition::Audio, a)))
        {
            let label = format!("{stream_path}/{rendition}");
            let ingestor = SegmentIngestor::new(
                self.http_client.clone(),
                template.clone(),
                Arc::clone(&consumer),
                save.clone(),
                SegmentWriter::new(&self.config.path, &stream_path, &rendition.to_string()),
                label,
            );
            let fetcher = PlaylistFetcher::new(self.http_client.clone(), template);
            let (poll_loop, info_rx) = PollLoop::new(
                rendition,
                stream_path.clone(),
                fetcher,
                ingestor,
                Arc::clone(&consumer),
                Arc::clone(&self.ingest),
                cancel.clone(),
            );
            loops.push((rendition, poll_loop));
            receivers.push((rendition, info_rx));
        }

        let session = Arc::new(StreamSession::new(
            stream_path,
            consumer,
            cancel,
            save,
            receivers,
        ));
        self.registry.insert(Arc::clone(&session))?;
        self.hooks.run(&session);

        for (rendition, poll_loop) in loops {
            session.attach(rendition, tokio::spawn(poll_loop.run()));
        }

        let supervised = Arc::clone(&session);
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            supervised.cancelled().await;
            supervised.teardown().await;
            registry.remove(&supervised);
            info!(
                stream_path = %supervised.stream_path(),
                reasons = ?supervised.exit_reasons(),
                "HLS session closed"
            );
            supervised.closed.cancel();
        });

        info!(stream_path = %session.stream_path(), renditions = session.renditions.len(), "HLS session published");
        Ok(session)
    }

    /// Cancels a session and waits for its teardown. `None` if the path is not live.
    pub async fn close(&self, stream_path: &str) -> Option<Vec<(Rendition, ExitReason)>> {
        let session = self.registry.get(stream_path)?;
        session.cancel();
        session.closed().await;
        Some(session.exit_reasons())
    }

    /// Cancels every live session and waits for all of them.
    pub async fn shutdown(&self) {
        let sessions = self.registry.sessions();
        for session in &sessions {
            session.cancel();
        }
        for session in sessions {
            session.closed().await;
        }
    }
}
