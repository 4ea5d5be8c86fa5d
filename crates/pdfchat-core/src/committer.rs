//! Batch committer
//!
//! Periodically drains the [`StagingBuffer`] and writes the batch to the
//! durable store in one transaction:
//!
//! 1. Drain the buffer; an empty drain is a no-op.
//! 2. Open one transaction for the whole batch.
//! 3. For each event, in order, resolve `document_id -> chat_id`. Events of
//!    unknown documents are skipped and logged; the batch continues.
//! 4. Insert the row keyed by the event id. Any other failure aborts and
//!    rolls back the whole batch.
//! 5. Commit.
//!
//! A batch that fails is not returned to the buffer. It is handed to the
//! [`DeadLetterStore`] and can be replayed with
//! [`BatchCommitter::replay_dead_letters`]. A replay skips events that are
//! already durable, so a batch aborted by a duplicate id still commits the
//! rest. Letters that keep failing are parked after `max_replay_attempts`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::StagingBuffer;
use crate::error::Result;
use crate::event::QaEvent;
use crate::traits::{DeadLetterStore, HistoryStore};

/// Committer configuration
#[derive(Debug, Clone)]
pub struct CommitterConfig {
    /// Time between two flushes
    pub flush_interval: Duration,

    /// Maximum dead letters replayed per `replay_dead_letters` call
    pub replay_limit: usize,

    /// Dead letters with this many failed attempts are no longer replayed
    pub max_replay_attempts: u32,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            replay_limit: 100,
            max_replay_attempts: 5,
        }
    }
}

impl CommitterConfig {
    /// Set the flush interval; zero keeps the current one
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.flush_interval = interval;
        }
        self
    }

    /// Set the replay limit
    pub fn with_replay_limit(mut self, limit: usize) -> Self {
        self.replay_limit = limit;
        self
    }

    /// Set the attempt count after which a dead letter is parked
    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts.max(1);
        self
    }
}

/// Result of one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,

    /// The batch was committed
    Committed { committed: usize, orphaned: usize },

    /// The batch failed and was handed to the dead-letter store
    DeadLettered { events: usize, error: String },
}

/// Result of a dead-letter replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Dead letters committed and removed
    pub replayed: usize,

    /// Dead letters that failed again
    pub failed: usize,
}

/// Counts for one committed batch
#[derive(Debug, Clone, Copy, Default)]
struct CommitReport {
    committed: usize,
    orphaned: usize,
}

/// Drains the staging buffer into the durable store on a fixed interval
pub struct BatchCommitter {
    buffer: Arc<StagingBuffer>,
    store: Arc<dyn HistoryStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    config: CommitterConfig,
}

impl BatchCommitter {
    pub fn new(
        buffer: Arc<StagingBuffer>,
        store: Arc<dyn HistoryStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        config: CommitterConfig,
    ) -> Self {
        Self {
            buffer,
            store,
            dead_letters,
            config,
        }
    }

    /// Drain the buffer and commit its contents
    pub async fn flush(&self) -> FlushOutcome {
        let batch = self.buffer.drain_all();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        debug!(count = batch.len(), "Committing batch");

        match commit_batch(self.store.as_ref(), &batch).await {
            Ok(report) => {
                info!(
                    committed = report.committed,
                    orphaned = report.orphaned,
                    "Batch committed"
                );
                FlushOutcome::Committed {
                    committed: report.committed,
                    orphaned: report.orphaned,
                }
            }
            Err(e) => {
                let error = e.to_string();
                error!(error = %error, count = batch.len(), "Batch commit failed, rolling back");
                self.dead_letter(&batch, &error).await;
                FlushOutcome::DeadLettered {
                    events: batch.len(),
                    error,
                }
            }
        }
    }

    async fn dead_letter(&self, batch: &[QaEvent], error: &str) {
        match self.dead_letters.record(batch, error).await {
            Ok(id) => {
                warn!(dead_letter_id = %id, count = batch.len(), "Batch moved to dead-letter store");
            }
            Err(e) => {
                // Last resort: the batch only survives in the logs
                let payload = serde_json::to_string(batch).unwrap_or_default();
                error!(
                    error = %e,
                    count = batch.len(),
                    payload = %payload,
                    "Failed to dead-letter batch"
                );
            }
        }
    }

    /// Re-run pending dead letters through the commit algorithm.
    ///
    /// Events already in the durable store are skipped. Committed dead
    /// letters are removed; failing ones get their attempt counter and last
    /// error updated.
    #[instrument(skip(self))]
    pub async fn replay_dead_letters(&self) -> Result<ReplayReport> {
        let pending = self
            .dead_letters
            .pending(self.config.replay_limit, self.config.max_replay_attempts)
            .await?;
        let mut report = ReplayReport::default();

        for dead_letter in pending {
            let replay = match uncommitted(self.store.as_ref(), &dead_letter.events).await {
                Ok(events) => commit_batch(self.store.as_ref(), &events).await,
                Err(e) => Err(e),
            };

            match replay {
                Ok(commit) => {
                    self.dead_letters.resolve(dead_letter.id).await?;
                    info!(
                        dead_letter_id = %dead_letter.id,
                        committed = commit.committed,
                        orphaned = commit.orphaned,
                        "Dead letter replayed"
                    );
                    report.replayed += 1;
                }
                Err(e) => {
                    let attempts = dead_letter.attempts + 1;
                    warn!(
                        dead_letter_id = %dead_letter.id,
                        attempts,
                        error = %e,
                        "Dead letter replay failed"
                    );
                    if attempts >= self.config.max_replay_attempts {
                        error!(
                            dead_letter_id = %dead_letter.id,
                            attempts,
                            "Dead letter parked, no further replays"
                        );
                    }
                    self.dead_letters
                        .record_attempt(dead_letter.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Flush on every interval tick until shutdown, then flush once more.
    ///
    /// A flush always runs to completion; ticks that fire meanwhile are
    /// coalesced, so two flushes never overlap.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.flush_interval.as_secs(),
            "Batch committer started"
        );

        let period = if self.config.flush_interval.is_zero() {
            warn!("Zero flush interval, using the default");
            CommitterConfig::default().flush_interval
        } else {
            self.config.flush_interval
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!("Batch committer: shutdown requested");
                    break;
                }
            }
        }

        if let FlushOutcome::Committed { committed, .. } = self.flush().await {
            info!(committed, "Final flush before shutdown");
        }
        info!("Batch committer stopped");
    }
}

/// Events not yet in the durable store, first occurrence of each id
async fn uncommitted(store: &dyn HistoryStore, events: &[QaEvent]) -> Result<Vec<QaEvent>> {
    let ids: Vec<_> = events.iter().map(|e| e.id).collect();
    let mut seen: HashSet<_> = store.committed_ids(&ids).await?;
    let fresh: Vec<QaEvent> = events
        .iter()
        .filter(|e| seen.insert(e.id))
        .cloned()
        .collect();

    if fresh.len() < events.len() {
        debug!(
            skipped = events.len() - fresh.len(),
            "Skipping events already committed"
        );
    }
    Ok(fresh)
}

async fn commit_batch(store: &dyn HistoryStore, events: &[QaEvent]) -> Result<CommitReport> {
    let mut tx = store.begin().await?;
    let mut report = CommitReport::default();

    for event in events {
        let Some(chat_id) = tx.resolve_chat_id(&event.document_id).await? else {
            warn!(
                event_id = %event.id,
                document_id = %event.document_id,
                "Chat not found for document, dropping event"
            );
            report.orphaned += 1;
            continue;
        };

        tx.insert(chat_id, event).await?;
        report.committed += 1;
    }

    tx.commit().await?;
    Ok(report)
}
