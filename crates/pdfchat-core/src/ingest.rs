// Ingest path for Q&A events
//
// Each message taken from the queue is decoded, mirrored to the recency cache
// and appended to the staging buffer. The returned disposition tells the
// queue adapter whether to acknowledge or reject the delivery.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::StagingBuffer;
use crate::event::QaEvent;
use crate::traits::RecencyCache;

/// Bytes of a rejected payload quoted in the log
const PREVIEW_BYTES: usize = 64;

/// What the queue adapter must do with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Event accepted; acknowledge the delivery
    Ack,
    /// Payload is malformed; reject without requeue
    Reject,
}

/// Turns raw queue payloads into buffered events
#[derive(Clone)]
pub struct Ingestor {
    buffer: Arc<StagingBuffer>,
    cache: Arc<dyn RecencyCache>,
}

impl Ingestor {
    pub fn new(buffer: Arc<StagingBuffer>, cache: Arc<dyn RecencyCache>) -> Self {
        Self { buffer, cache }
    }

    /// Handle one delivery payload.
    ///
    /// A cache failure does not reject the event: it is still buffered and
    /// will become visible once the batch commits.
    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let event = match QaEvent::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    error = %e,
                    payload_len = payload.len(),
                    payload_preview = %payload_preview(payload),
                    "Rejecting malformed Q&A event"
                );
                return Disposition::Reject;
            }
        };

        if let Err(e) = self.cache.push(&event.document_id, &event.to_record()).await {
            warn!(
                event_id = %event.id,
                document_id = %event.document_id,
                error = %e,
                "Failed to mirror event to recency cache"
            );
        }

        debug!(event_id = %event.id, document_id = %event.document_id, "Event buffered");
        self.buffer.append(event);
        Disposition::Ack
    }

    /// Staging buffer fed by this ingestor
    pub fn buffer(&self) -> &Arc<StagingBuffer> {
        &self.buffer
    }
}

/// Lossy UTF-8 prefix of a payload, marked when cut short
fn payload_preview(payload: &[u8]) -> String {
    if payload.len() <= PREVIEW_BYTES {
        return String::from_utf8_lossy(payload).into_owned();
    }
    format!("{}...", String::from_utf8_lossy(&payload[..PREVIEW_BYTES]))
}
