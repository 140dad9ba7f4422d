//! Bounded worker pool processing sources through the ingestion pipeline.
//!
//! Sources are processed concurrently up to `max_concurrent_sources`;
//! within one source the pipeline keeps its strict stage order. The bound
//! protects the completion and embedding services from rate-limit
//! exhaustion. Shutdown is graceful (drain in-flight sources); abort flips
//! the cancellation watch that propagates into in-flight stage calls.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use faultline_core::{defaults, Error, IngestionStage, Result};

use crate::pipeline::{IngestOutcome, IngestionPipeline};

/// Configuration for the ingestion worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of concurrently processed sources.
    pub max_concurrent_sources: usize,
    /// Queue capacity for submitted sources.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: defaults::INGEST_MAX_CONCURRENT_SOURCES,
            queue_capacity: 64,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FAULTLINE_INGEST_MAX_CONCURRENT` | `4` | Concurrent source bound |
    /// | `FAULTLINE_INGEST_QUEUE_CAPACITY` | `64` | Submission queue size |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("FAULTLINE_INGEST_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_concurrent_sources = n.max(1);
        }
        if let Some(n) = std::env::var("FAULTLINE_INGEST_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.queue_capacity = n.max(1);
        }
        config
    }

    /// Set the concurrent source bound.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent_sources = n.max(1);
        self
    }
}

/// Event emitted by the ingestion worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A source began processing.
    SourceStarted { uri: String },
    /// A source's content was already in the store.
    SourceSkipped { uri: String },
    /// A source completed.
    SourceCompleted {
        uri: String,
        atoms_stored: usize,
        atoms_reviewed: usize,
    },
    /// A source was dead-lettered.
    SourceDeadLettered { uri: String, stage: IngestionStage },
    /// A source failed outside the dead-letter path (e.g. cancelled).
    SourceFailed { uri: String, error: String },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    submit_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
    cancel_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Queue a source for ingestion. Errors when the queue is full
    /// (capacity pressure) or the worker has stopped.
    pub fn submit(&self, uri: impl Into<String>) -> Result<()> {
        let uri = uri.into();
        self.submit_tx
            .try_send(uri)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    Error::Capacity("ingestion queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    Error::Internal("ingestion worker has stopped".into())
                }
            })
    }

    /// Signal the worker to stop accepting work and drain in-flight
    /// sources.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("worker already stopped".into()))
    }

    /// Abort: cancel in-flight stage calls, then stop.
    pub async fn abort(&self) -> Result<()> {
        let _ = self.cancel_tx.send(true);
        self.shutdown().await
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Ingestion worker that drains the submission queue through the pipeline.
pub struct IngestWorker {
    pipeline: Arc<IngestionPipeline>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl IngestWorker {
    /// Create a new worker over a pipeline.
    pub fn new(pipeline: Arc<IngestionPipeline>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            pipeline,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (submit_tx, submit_rx) = mpsc::channel(self.config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(self.run(submit_rx, shutdown_rx, cancel_rx));

        WorkerHandle {
            submit_tx,
            shutdown_tx,
            cancel_tx,
            event_rx,
        }
    }

    async fn run(
        self,
        mut submit_rx: mpsc::Receiver<String>,
        mut shutdown_rx: mpsc::Receiver<()>,
        cancel_rx: watch::Receiver<bool>,
    ) {
        info!(
            subsystem = "ingest",
            component = "worker",
            op = "start",
            max_concurrent = self.config.max_concurrent_sources,
            "Ingestion worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            // Respect the pool bound before taking more work.
            while tasks.len() >= self.config.max_concurrent_sources {
                if let Some(Err(e)) = tasks.join_next().await {
                    error!(
                        subsystem = "ingest",
                        component = "worker",
                        error = ?e,
                        "Ingestion task panicked"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(
                        subsystem = "ingest",
                        component = "worker",
                        "Shutdown signal received, draining in-flight sources"
                    );
                    break;
                }
                maybe_uri = submit_rx.recv() => {
                    let Some(uri) = maybe_uri else { break };
                    let pipeline = self.pipeline.clone();
                    let event_tx = self.event_tx.clone();
                    let mut cancel = cancel_rx.clone();
                    tasks.spawn(async move {
                        let _ = event_tx.send(WorkerEvent::SourceStarted { uri: uri.clone() });
                        match pipeline.ingest(&uri, &mut cancel).await {
                            Ok(IngestOutcome::AlreadyIngested) => {
                                debug!(
                                    subsystem = "ingest",
                                    component = "worker",
                                    source_id = %uri,
                                    "Source skipped (already ingested)"
                                );
                                let _ = event_tx.send(WorkerEvent::SourceSkipped { uri });
                            }
                            Ok(IngestOutcome::Ingested { atoms_stored, atoms_reviewed }) => {
                                let _ = event_tx.send(WorkerEvent::SourceCompleted {
                                    uri,
                                    atoms_stored,
                                    atoms_reviewed,
                                });
                            }
                            Ok(IngestOutcome::DeadLettered { stage, .. }) => {
                                let _ = event_tx.send(WorkerEvent::SourceDeadLettered { uri, stage });
                            }
                            Err(e) => {
                                let _ = event_tx.send(WorkerEvent::SourceFailed {
                                    uri,
                                    error: e.to_string(),
                                });
                            }
                        }
                    });
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(
                    subsystem = "ingest",
                    component = "worker",
                    error = ?e,
                    "Ingestion task panicked"
                );
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(
            subsystem = "ingest",
            component = "worker",
            op = "stop",
            "Ingestion worker stopped"
        );
    }
}
