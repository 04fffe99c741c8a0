//! Decides which segments of a freshly polled playlist still need ingesting.

use std::collections::HashSet;

use crate::playlist::{Playlist, PlaylistItem};

/// Upper bound on segments ingested per cycle. Older excess segments are
/// dropped so a stalled rendition catches up with the live edge.
pub const MAX_SEGMENTS_PER_CYCLE: usize = 3;

/// A segment selected for ingestion in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Identifier as written in the playlist.
    pub uri: String,
    /// A discontinuity marker preceded this segment in the playlist.
    pub discontinuity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The sequence number did not advance; nothing to do until the stale pause elapsed.
    Stale { sequence: u64, watermark: u64 },
    /// The playlist advanced; ingest these segments in order.
    Fresh(Vec<Segment>),
}

/// Watermark and seen-set carried across polls of one rendition.
#[derive(Debug, Default)]
pub struct SegmentTracker {
    watermark: Option<u64>,
    seen: HashSet<String>,
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest playlist sequence processed so far (0 before the first fresh playlist).
    pub fn watermark(&self) -> u64 {
        self.watermark.unwrap_or(0)
    }

    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn track(&mut self, playlist: &Playlist) -> TrackOutcome {
        if let Some(watermark) = self.watermark
            && playlist.sequence <= watermark
        {
            return TrackOutcome::Stale {
                sequence: playlist.sequence,
                watermark,
            };
        }
        self.watermark = Some(playlist.sequence);

        let mut this_cycle = HashSet::with_capacity(self.seen.len());
        let mut selected = Vec::new();
        let mut discontinuity = false;

        for item in &playlist.items {
            match item {
                PlaylistItem::Discontinuity => discontinuity = true,
                PlaylistItem::Segment(segment) => {
                    this_cycle.insert(segment.uri.clone());
                    if self.seen.contains(&segment.uri) && !discontinuity {
                        continue;
                    }
                    selected.push(Segment {
                        uri: segment.uri.clone(),
                        discontinuity,
                    });
                }
            }
        }
        self.seen = this_cycle;

        if selected.len() > MAX_SEGMENTS_PER_CYCLE {
            selected.drain(..selected.len() - MAX_SEGMENTS_PER_CYCLE);
        }
        TrackOutcome::Fresh(selected)
    }
}
