// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded ingest queue feeding a fixed pool of delivery workers.
//!
//! ```text
//!   Producers ──submit──> [ bounded queue ] ──> Worker 1 (encoder, assembler, transport)
//!                                          ├──> Worker 2
//!                                          └──> Worker N ──POST──> Log Insight
//! ```
//!
//! Each worker owns its batch assembler and HTTP client, so the queue is the only shared
//! mutable state. A worker dequeues one event, encodes it, appends it to its batch and
//! posts the batch once it is full. The POST blocks only the worker that issued it.
//!
//! Events are load balanced across workers, so submission order is only preserved with a
//! single worker.
//!
//! # Queue full
//!
//! [`PipelineHandle::try_submit`] never waits: when the queue is full the event is dropped,
//! counted and logged. [`PipelineHandle::submit`] follows the configured
//! [`QueueFullPolicy`].
//!
//! # Shutdown
//!
//! [`PipelineHandle::shutdown`] closes the queue to new events. Workers drain what is
//! already queued, flush their partial batches and exit. [`IngestPipeline::run`] waits for
//! them for the configured grace period, then aborts whatever is still running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchAssembler};
use crate::config::{ForwarderConfig, QueueFullPolicy};
use crate::encoder::MessageEncoder;
use crate::error::{ConfigError, SubmitError};
use crate::http::client_from_config;
use crate::message::Event;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::Transport;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Event>>>;

/// Cloneable producer side of the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    tx: mpsc::Sender<Event>,
    queue_full_policy: QueueFullPolicy,
    stats: Arc<PipelineStats>,
    cancel_token: CancellationToken,
}

impl PipelineHandle {
    /// Enqueues `event` without waiting. A full queue drops the event.
    pub fn try_submit(&self, event: Event) -> Result<(), SubmitError> {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.record_submitted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.stats.record_dropped();
                warn!(
                    "Ingest queue full ({} events), dropping event. {} dropped so far",
                    self.tx.max_capacity(),
                    dropped
                );
                Err(SubmitError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.rejected(),
        }
    }

    /// Enqueues `event` following the configured queue full policy.
    pub async fn submit(&self, event: Event) -> Result<(), SubmitError> {
        match self.queue_full_policy {
            QueueFullPolicy::Drop => self.try_submit(event),
            QueueFullPolicy::Block => match self.tx.send(event).await {
                Ok(()) => {
                    self.stats.record_submitted();
                    Ok(())
                }
                Err(_) => self.rejected(),
            },
        }
    }

    fn rejected(&self) -> Result<(), SubmitError> {
        self.stats.record_rejected();
        debug!("Pipeline is shut down, rejecting event");
        Err(SubmitError::Closed)
    }

    /// Signals the workers to drain the queue, flush and stop.
    pub fn shutdown(&self) {
        if !self.cancel_token.is_cancelled() {
            info!("Shutting down ingest pipeline");
            self.cancel_token.cancel();
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of events waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Owns the worker side of the pipeline. Spawn [`IngestPipeline::run`] to start it.
pub struct IngestPipeline {
    rx: SharedReceiver,
    workers: Vec<Worker>,
    stats: Arc<PipelineStats>,
    cancel_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl IngestPipeline {
    /// Validates `config` and builds the queue and workers. Nothing runs until
    /// [`IngestPipeline::run`] is polled, but events can already be submitted.
    pub fn new(config: &ForwarderConfig) -> Result<(Self, PipelineHandle), ConfigError> {
        config.validate()?;

        let url = config.ingest_url()?;
        let encoder = Arc::new(MessageEncoder::new(
            config.namespacer()?,
            config.flatten_json,
            config.timestamp_default,
        ));

        let (tx, rx) = mpsc::channel::<Event>(config.queue_capacity);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let stats = Arc::new(PipelineStats::default());
        let cancel_token = CancellationToken::new();

        if config.skip_tls_verify {
            warn!("TLS certificate validation is disabled for the Log Insight endpoint");
        }
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let client =
                client_from_config(config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;
            workers.push(Worker {
                id,
                rx: Arc::clone(&rx),
                encoder: Arc::clone(&encoder),
                assembler: BatchAssembler::new(config.batch_size),
                transport: Transport::new(client, url.clone(), config.debug),
                stats: Arc::clone(&stats),
                cancel_token: cancel_token.clone(),
            });
        }

        info!(
            "Using {} for Log Insight with {} workers, batch size {}, queue capacity {}, TLS verification {}",
            url,
            config.workers,
            config.batch_size,
            config.queue_capacity,
            if config.skip_tls_verify { "disabled" } else { "enabled" }
        );

        let handle = PipelineHandle {
            tx,
            queue_full_policy: config.queue_full_policy,
            stats: Arc::clone(&stats),
            cancel_token: cancel_token.clone(),
        };

        let pipeline = Self {
            rx,
            workers,
            stats,
            cancel_token,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        };
        Ok((pipeline, handle))
    }

    /// Runs the workers until shutdown, or until every handle is dropped and the queue
    /// is empty.
    pub async fn run(self) {
        let mut workers = JoinSet::new();
        for worker in self.workers {
            workers.spawn(worker.run());
        }

        tokio::select! {
            () = self.cancel_token.cancelled() => {}
            () = join_workers(&mut workers) => {
                debug!("All workers exited, ingest pipeline stopped");
                return;
            }
        }

        debug!(
            "Waiting up to {}s for workers to drain and flush",
            self.shutdown_timeout.as_secs()
        );
        if tokio::time::timeout(self.shutdown_timeout, join_workers(&mut workers))
            .await
            .is_err()
        {
            warn!(
                "Shutdown grace period of {}s expired, aborting {} workers",
                self.shutdown_timeout.as_secs(),
                workers.len()
            );
            workers.shutdown().await;
            let queued = self.rx.try_lock().map_or(0, |rx| rx.len());
            if queued > 0 {
                warn!("Discarding {} queued events", queued);
            }
        }

        let stats = self.stats.snapshot();
        info!(
            "Ingest pipeline stopped: {} submitted, {} dropped, {} messages sent, {} messages failed",
            stats.submitted, stats.dropped, stats.messages_sent, stats.messages_failed
        );
    }
}

async fn join_workers(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!("Worker task failed: {}", e);
        }
    }
}

struct Worker {
    id: usize,
    rx: SharedReceiver,
    encoder: Arc<MessageEncoder>,
    assembler: BatchAssembler,
    transport: Transport,
    stats: Arc<PipelineStats>,
    cancel_token: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker = self.id, "Worker started");

        loop {
            let next = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                next = dequeue(&self.rx) => next,
            };
            match next {
                Some(event) => self.process(event).await,
                None => {
                    // Every producer handle is gone and the queue is empty
                    self.flush_partial().await;
                    debug!(worker = self.id, "Queue closed, worker stopped");
                    return;
                }
            }
        }

        while let Some(event) = drain_one(&self.rx).await {
            self.process(event).await;
        }
        self.flush_partial().await;
        debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&mut self, event: Event) {
        let encoded = self.encoder.encode(&event);
        if !encoded.errors.is_empty() {
            self.stats.record_encoding_errors(encoded.errors.len());
            for e in &encoded.errors {
                warn!(worker = self.id, "Encoding error, sending best-effort message: {}", e);
            }
        }

        if let Some(batch) = self.assembler.append(encoded.message) {
            self.flush(batch).await;
        }
    }

    async fn flush_partial(&mut self) {
        if let Some(batch) = self.assembler.take() {
            debug!(worker = self.id, "Flushing partial batch of {} messages", batch.len());
            self.flush(batch).await;
        }
    }

    async fn flush(&self, batch: Batch) {
        let count = batch.len();
        if self.transport.send(&batch).await.is_success() {
            self.stats.record_sent(count);
        } else {
            self.stats.record_failed(count);
        }
    }
}

async fn dequeue(rx: &SharedReceiver) -> Option<Event> {
    rx.lock().await.recv().await
}

/// Closes the queue to producers and returns the next buffered event, `None` once empty.
async fn drain_one(rx: &SharedReceiver) -> Option<Event> {
    let mut rx = rx.lock().await;
    rx.close();
    rx.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tracing_test::traced_test;

    fn config(queue_capacity: usize) -> ForwarderConfig {
        ForwarderConfig {
            // Nothing listens on port 1, sends fail fast
            url_override: Some("http://127.0.0.1:1".to_string()),
            workers: 1,
            queue_capacity,
            batch_size: 1,
            request_timeout_secs: 1,
            shutdown_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn event(i: i64) -> Event {
        let mut fields = HashMap::new();
        fields.insert("timestamp".to_string(), json!(i));
        Event::new(fields, format!("event-{i}"))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_drops_event_when_queue_full() {
        let capacity = 4;
        let (_pipeline, handle) = IngestPipeline::new(&config(capacity)).unwrap();

        for i in 0..capacity {
            assert_eq!(handle.try_submit(event(i as i64)), Ok(()));
        }
        assert_eq!(handle.try_submit(event(99)), Err(SubmitError::QueueFull));

        let stats = handle.stats();
        assert_eq!(stats.submitted, capacity as u64);
        assert_eq!(stats.dropped, 1);
        assert_eq!(handle.queued(), capacity);
        assert!(logs_contain("dropping event"));
    }

    #[tokio::test]
    async fn test_submit_uses_drop_policy() {
        let (_pipeline, handle) = IngestPipeline::new(&config(1)).unwrap();

        assert_eq!(handle.submit(event(1)).await, Ok(()));
        assert_eq!(handle.submit(event(2)).await, Err(SubmitError::QueueFull));
        assert_eq!(handle.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_capacity() {
        let config = ForwarderConfig {
            queue_full_policy: QueueFullPolicy::Block,
            ..config(1)
        };
        let (pipeline, handle) = IngestPipeline::new(&config).unwrap();
        handle.submit(event(1)).await.unwrap();

        // The queue is full, the second submit only completes once a worker dequeues
        let blocked = handle.clone();
        let second = tokio::spawn(async move { blocked.submit(event(2)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        let running = tokio::spawn(pipeline.run());
        assert_eq!(second.await.unwrap(), Ok(()));

        handle.shutdown();
        running.await.unwrap();
        assert_eq!(handle.stats().dropped, 0);
        assert_eq!(handle.stats().submitted, 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (pipeline, handle) = IngestPipeline::new(&config(4)).unwrap();
        let running = tokio::spawn(pipeline.run());

        handle.shutdown();
        running.await.unwrap();

        assert!(handle.is_shutdown());
        assert_eq!(handle.try_submit(event(1)), Err(SubmitError::Closed));
        assert_eq!(handle.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_sends_are_counted_and_pipeline_keeps_running() {
        let (pipeline, handle) = IngestPipeline::new(&config(8)).unwrap();
        let running = tokio::spawn(pipeline.run());

        for i in 0..3 {
            handle.try_submit(event(i)).unwrap();
        }
        handle.shutdown();
        running.await.unwrap();

        let stats = handle.stats();
        assert_eq!(stats.batches_failed, 3);
        assert_eq!(stats.messages_failed, 3);
        assert_eq!(stats.messages_sent, 0);
    }

    #[tokio::test]
    async fn test_workers_stop_when_all_handles_dropped() {
        let (pipeline, handle) = IngestPipeline::new(&config(4)).unwrap();
        let running = tokio::spawn(pipeline.run());
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("pipeline did not stop")
            .unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_shutdown_grace_period_aborts_stuck_workers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let config = ForwarderConfig {
            url_override: Some(format!("http://{addr}")),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 1,
            ..config(4)
        };
        let (pipeline, handle) = IngestPipeline::new(&config).unwrap();
        let running = tokio::spawn(pipeline.run());

        handle.try_submit(event(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("shutdown was not bounded by the grace period")
            .unwrap();
        assert!(logs_contain("grace period of 1s expired"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_encoding_errors_are_logged_and_message_still_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/messages/ingest/1")
            .match_body(mockito::Matcher::Json(json!({
                "messages": [{
                    "fields": [{"name": "app", "content": "web"}],
                    "text": "not json",
                    "timestamp": 0
                }]
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = ForwarderConfig {
            url_override: Some(server.url()),
            flatten_json: true,
            ..config(4)
        };
        let (pipeline, handle) = IngestPipeline::new(&config).unwrap();
        let running = tokio::spawn(pipeline.run());

        let mut fields = HashMap::new();
        fields.insert("timestamp".to_string(), json!("yesterday"));
        fields.insert("app".to_string(), json!("web"));
        handle.try_submit(Event::new(fields, "not json")).unwrap();
        handle.shutdown();
        running.await.unwrap();

        mock.assert_async().await;
        let stats = handle.stats();
        assert_eq!(stats.encoding_errors, 2);
        assert_eq!(stats.messages_sent, 1);
        assert!(logs_contain("Encoding error"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ForwarderConfig {
            workers: 0,
            ..config(4)
        };
        assert!(matches!(
            IngestPipeline::new(&config),
            Err(ConfigError::ZeroValue("worker count"))
        ));
    }
}
