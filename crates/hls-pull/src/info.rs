//! Serializable telemetry, shaped for the status dashboard.

use serde::Serialize;

/// Cost of pulling one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TsCost {
    /// GET plus body read, in milliseconds.
    #[serde(rename = "DownloadCost")]
    pub download_cost: u64,
    /// Time spent in the consumer's feed, in milliseconds.
    #[serde(rename = "DecodeCost")]
    pub decode_cost: u64,
    /// Consumer output queue length right after the feed.
    #[serde(rename = "BufferLength")]
    pub buffer_length: usize,
    /// Units the consumer queued for this segment.
    #[serde(rename = "PesCount")]
    pub pes_count: i64,
}

/// Live counters of one rendition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct M3u8Info {
    /// Playlists that advanced the sequence number.
    #[serde(rename = "M3U8Count")]
    pub m3u8_count: u64,
    /// Segments downloaded.
    #[serde(rename = "TSCount")]
    pub ts_count: u64,
    #[serde(rename = "LastM3u8")]
    pub last_m3u8: String,
    /// Costs of the current cycle, in ingestion order.
    #[serde(rename = "M3u8Info")]
    pub m3u8_info: Vec<TsCost>,
    #[serde(rename = "SegmentErrors")]
    pub segment_errors: u64,
    #[serde(rename = "PersistErrors")]
    pub persist_errors: u64,
}

/// Consumer-side figures of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TsInfo {
    #[serde(rename = "BufferLength")]
    pub buffer_length: usize,
    #[serde(rename = "PesCount")]
    pub pes_count: i64,
}

/// Snapshot of a stream session for status queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HlsInfo {
    #[serde(rename = "StreamPath")]
    pub stream_path: String,
    #[serde(rename = "Video")]
    pub video: Option<M3u8Info>,
    #[serde(rename = "Audio")]
    pub audio: Option<M3u8Info>,
    #[serde(rename = "TSInfo")]
    pub ts_info: TsInfo,
}
