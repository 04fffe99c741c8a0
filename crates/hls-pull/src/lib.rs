//! # HLS pull
//!
//! Ingests live HLS streams from a remote origin and hands the raw MPEG-TS
//! segments to a downstream decoder.
//!
//! ## Features
//!
//! - Polls a media playlist per rendition (video, optional audio)
//! - Skips segments already ingested, with discontinuity handling
//! - Bounded catch-up: at most three segments per playlist cycle
//! - Optional on-disk copy of the segments
//! - Live per-session telemetry for status dashboards

pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod info;
pub mod ingestor;
pub mod persist;
pub mod playlist;
pub mod plugin;
pub mod poll_loop;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod ts_demux;

pub use client::{RequestTemplate, create_client};
pub use config::{HlsPluginConfig, IngestConfig, IngestSettings};
pub use consumer::SegmentConsumer;
pub use error::{ConsumerError, HlsPullError, Result};
pub use info::{HlsInfo, M3u8Info, TsCost, TsInfo};
pub use persist::{SaveGuard, SaveSwitch};
pub use plugin::{PLUGIN_INFO, PluginInfo, PublishHook};
pub use poll_loop::{ExitReason, PollLoop, Rendition};
pub use registry::SessionRegistry;
pub use session::{PublishRequest, SessionManager, StreamSession};
pub use ts_demux::{PesReceiver, PesUnit, TsDemuxer};
