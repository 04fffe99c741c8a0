//! Minimal MPEG-TS demuxer used as the default segment consumer.
//!
//! Splits fed segments into 188 byte packets, reassembles PES units per PID
//! and queues every completed unit on a bounded channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ConsumerError;
use crate::consumer::SegmentConsumer;

pub const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const PID_NULL: u16 = 0x1FFF;

/// One reassembled PES packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesUnit {
    pub pid: u16,
    pub data: Bytes,
}

/// Receiving half of a [`TsDemuxer`] output queue.
pub struct PesReceiver {
    rx: mpsc::Receiver<PesUnit>,
    queued: Arc<AtomicUsize>,
}

impl PesReceiver {
    /// Next unit, or `None` once the demuxer input is closed and the queue drained.
    pub async fn recv(&mut self) -> Option<PesUnit> {
        let unit = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(unit)
    }
}

pub struct TsDemuxer {
    tx: Mutex<Option<mpsc::Sender<PesUnit>>>,
    rx: Mutex<Option<PesReceiver>>,
    queued: Arc<AtomicUsize>,
    // Held across the whole feed so renditions sharing the demuxer never interleave packets.
    pending: tokio::sync::Mutex<HashMap<u16, BytesMut>>,
    failure: Mutex<Option<ConsumerError>>,
    cancel: CancellationToken,
}

impl TsDemuxer {
    pub fn new(queue_capacity: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let queued = Arc::new(AtomicUsize::new(0));
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(PesReceiver {
                rx,
                queued: Arc::clone(&queued),
            })),
            queued,
            pending: tokio::sync::Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            cancel,
        }
    }

    /// Hands out the output queue. Returns `None` after the first call.
    pub fn take_output(&self) -> Option<PesReceiver> {
        self.rx.lock().take()
    }

    fn fail(&self, reason: String) -> ConsumerError {
        let err = ConsumerError::Decode(reason);
        warn!(error = %err, "TS demuxer failed, cancelling session");
        self.failure.lock().get_or_insert_with(|| err.clone());
        self.cancel.cancel();
        err
    }

    async fn push(&self, tx: &mpsc::Sender<PesUnit>, unit: PesUnit) -> Result<(), ConsumerError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ConsumerError::Cancelled),
            sent = tx.send(unit) => {
                sent.map_err(|_| ConsumerError::InputClosed)?;
                self.queued.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }
}

/// Header fields of one transport packet that the demuxer needs.
struct PacketView<'a> {
    pid: u16,
    unit_start: bool,
    payload: &'a [u8],
}

fn parse_packet(packet: &[u8]) -> Result<PacketView<'_>, String> {
    if packet[0] != SYNC_BYTE {
        return Err(format!("lost sync: found 0x{:02x}", packet[0]));
    }
    let unit_start = packet[1] & 0x40 != 0;
    let pid = ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16;
    let adaptation_field_control = (packet[3] >> 4) & 0x03;

    let mut offset = 4;
    if adaptation_field_control & 0x02 != 0 {
        offset += 1 + packet[4] as usize;
        if offset > TS_PACKET_SIZE {
            return Err(format!("adaptation field overruns packet on PID {pid}"));
        }
    }
    let payload = if adaptation_field_control & 0x01 != 0 {
        &packet[offset..]
    } else {
        &[]
    };
    Ok(PacketView {
        pid,
        unit_start,
        payload,
    })
}

#[async_trait]
impl SegmentConsumer for TsDemuxer {
    async fn feed(&self, data: Bytes) -> Result<(), ConsumerError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let tx = self.tx.lock().clone().ok_or(ConsumerError::InputClosed)?;

        if data.len() % TS_PACKET_SIZE != 0 {
            return Err(self.fail(format!(
                "segment of {} bytes is not a whole number of TS packets",
                data.len()
            )));
        }

        let mut pending = self.pending.lock().await;
        let mut completed = Vec::new();
        for packet in data.chunks_exact(TS_PACKET_SIZE) {
            let view = parse_packet(packet).map_err(|reason| self.fail(reason))?;
            if view.pid == PID_NULL || view.payload.is_empty() {
                continue;
            }

            if view.unit_start {
                if let Some(previous) = pending.remove(&view.pid)
                    && !previous.is_empty()
                {
                    completed.push(PesUnit {
                        pid: view.pid,
                        data: previous.freeze(),
                    });
                }
                // PSI sections (PAT/PMT) do not carry a PES start code.
                if view.payload.starts_with(&[0x00, 0x00, 0x01]) {
                    pending.insert(view.pid, BytesMut::from(view.payload));
                }
            } else if let Some(buffer) = pending.get_mut(&view.pid) {
                buffer.extend_from_slice(view.payload);
            }
        }
        drop(pending);

        debug!(units = completed.len(), "Demuxed segment");
        for unit in completed {
            self.push(&tx, unit).await?;
        }
        Ok(())
    }

    fn err(&self) -> Option<ConsumerError> {
        if let Some(err) = self.failure.lock().clone() {
            return Some(err);
        }
        self.cancel
            .is_cancelled()
            .then_some(ConsumerError::Cancelled)
    }

    fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn close_input(&self) {
        if self.tx.lock().take().is_some() {
            debug!("TS demuxer input closed");
        }
    }
}

/// Builds transport packets carrying one PES payload on `pid`. Test helper.
#[cfg(test)]
pub(crate) fn pes_packets(pid: u16, payload_len: usize) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, 0xE0];
    pes.resize(payload_len.max(4), 0xAB);

    let mut out = Vec::new();
    for (i, chunk) in pes.chunks(TS_PACKET_SIZE - 4).enumerate() {
        let mut packet = vec![SYNC_BYTE, ((pid >> 8) as u8 & 0x1F), pid as u8, 0x10];
        if i == 0 {
            packet[1] |= 0x40;
        }
        if chunk.len() < TS_PACKET_SIZE - 4 {
            // Pad with an adaptation field, as muxers do.
            packet[3] = 0x30;
            let stuffing = TS_PACKET_SIZE - 4 - chunk.len();
            packet.push((stuffing - 1) as u8);
            if stuffing > 1 {
                packet.push(0x00);
                packet.resize(4 + stuffing, 0xFF);
            }
        }
        packet.extend_from_slice(chunk);
        out.extend_from_slice(&packet);
    }
    out
}
