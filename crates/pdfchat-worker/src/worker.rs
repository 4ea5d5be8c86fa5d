// Ingest worker
// Decision: The staging buffer is created here and handed to the ingestor and committer explicitly
// Decision: Dead letters are replayed once at startup, before new batches are committed
// Decision: The committer always gets a final flush, whichever side stops first

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use pdfchat_core::traits::{DeadLetterStore, HistoryStore, RecencyCache};
use pdfchat_core::{BatchCommitter, HistoryReconciler, Ingestor, ReplayReport, StagingBuffer};
use pdfchat_storage::{
    create_db_dead_letter_store, create_db_history_store, init_redis, Database, RedisRecencyCache,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;

// =============================================================================
// Backends
// =============================================================================

/// Storage handles shared by the ingest and read paths
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn HistoryStore>,
    pub cache: Arc<dyn RecencyCache>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
}

impl Backends {
    /// Connect to Postgres and Redis
    pub async fn connect(config: &WorkerConfig) -> Result<Self> {
        let db = Database::connect(&config.database_url, config.db_max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        let redis = init_redis(&config.redis_url)
            .await
            .context("Failed to connect to Redis")?;

        info!(
            max_connections = config.db_max_connections,
            recency_ttl_secs = config.recency_ttl.as_secs(),
            "Storage backends connected"
        );

        Ok(Self {
            store: Arc::new(create_db_history_store(db.clone())),
            cache: Arc::new(RedisRecencyCache::new(
                redis,
                config.recency_ttl,
                config.recency_max_entries,
            )),
            dead_letters: Arc::new(create_db_dead_letter_store(db)),
        })
    }

    /// Read-side view over the same backends
    pub fn reconciler(&self) -> HistoryReconciler {
        HistoryReconciler::new(Arc::clone(&self.store), Arc::clone(&self.cache))
    }
}

// =============================================================================
// Shutdown
// =============================================================================

/// Cloneable trigger for a graceful worker shutdown
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

// =============================================================================
// IngestWorker
// =============================================================================

/// Queue ingest plus timed batch commits over one staging buffer
pub struct IngestWorker {
    ingestor: Ingestor,
    committer: BatchCommitter,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl IngestWorker {
    pub fn new(config: &WorkerConfig, backends: Backends) -> Self {
        let buffer = Arc::new(StagingBuffer::new());
        let ingestor = Ingestor::new(Arc::clone(&buffer), backends.cache);
        let committer = BatchCommitter::new(
            buffer,
            backends.store,
            backends.dead_letters,
            config.committer(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            ingestor,
            committer,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Replay pending dead letters; failures are logged, not fatal
    pub async fn replay_dead_letters(&self) -> Option<ReplayReport> {
        match self.committer.replay_dead_letters().await {
            Ok(report) => {
                if report.replayed > 0 || report.failed > 0 {
                    info!(
                        replayed = report.replayed,
                        failed = report.failed,
                        "Dead letters replayed"
                    );
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Dead letter replay failed");
                None
            }
        }
    }

    /// Run until shutdown is triggered or `consume` returns.
    ///
    /// `consume` drives the event source: it receives the ingestor and the
    /// shutdown signal and should return once the signal fires.
    pub async fn run<F, Fut>(self, consume: F) -> Result<()>
    where
        F: FnOnce(Ingestor, watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = pdfchat_core::Result<()>>,
    {
        self.replay_dead_letters().await;

        let committer_handle = tokio::spawn(self.committer.run(self.shutdown_rx.clone()));

        let result = consume(self.ingestor, self.shutdown_rx).await;
        if let Err(e) = &result {
            error!(error = %e, "Event source stopped");
        }

        // Stop the committer too when the source ended on its own
        let _ = self.shutdown_tx.send(true);
        committer_handle
            .await
            .context("Batch committer task panicked")?;

        result.context("Event source failed")
    }
}
