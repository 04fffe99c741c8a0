use async_trait::async_trait;
use bytes::Bytes;

use crate::ConsumerError;

/// Downstream pipeline that decodes the raw segment bytes pulled by a session.
///
/// A consumer is shared by every rendition of a session. `feed` may await when
/// the consumer's output queue is full.
#[async_trait]
pub trait SegmentConsumer: Send + Sync {
    /// Feeds one segment. An error means decoding failed terminally.
    async fn feed(&self, data: Bytes) -> Result<(), ConsumerError>;

    /// The terminal condition of the consumer, if any (failure or cancellation).
    fn err(&self) -> Option<ConsumerError>;

    /// Number of decoded units waiting in the output queue.
    fn queued(&self) -> usize;

    /// Closes the consumer's input. Further feeds fail with [`ConsumerError::InputClosed`].
    fn close_input(&self);
}
