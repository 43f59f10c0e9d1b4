// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::config::ForwarderConfig;
use crate::error::{ConfigError, SubmitError};
use crate::message::Event;
use crate::pipeline::{IngestPipeline, PipelineHandle};
use crate::stats::StatsSnapshot;

/// Sink the event source ships events to.
#[async_trait]
pub trait EventForwarder: Send + Sync {
    /// Log Insight ingestion is connectionless, so this always succeeds.
    fn connect(&self) -> bool;

    /// Hands `event` to the forwarder without waiting for delivery.
    async fn ship_events(&self, event: Event) -> Result<(), SubmitError>;

    /// Stops accepting events and flushes what is buffered.
    async fn shutdown(&self);

    fn stats(&self) -> StatsSnapshot;
}

/// Builds the forwarder selected by `config.noop`.
///
/// Must be called from within a tokio runtime.
pub fn from_config(config: &ForwarderConfig) -> Result<Box<dyn EventForwarder>, ConfigError> {
    if config.noop {
        debug!("Forwarding disabled, events will be discarded");
        return Ok(Box::new(NoopForwarder));
    }
    Ok(Box::new(LogInsightForwarder::start(config)?))
}

/// Forwards events to Log Insight through a running [`IngestPipeline`].
pub struct LogInsightForwarder {
    handle: PipelineHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogInsightForwarder {
    /// Builds the pipeline and spawns its workers on the current runtime.
    pub fn start(config: &ForwarderConfig) -> Result<Self, ConfigError> {
        let (pipeline, handle) = IngestPipeline::new(config)?;
        let task = tokio::spawn(pipeline.run());
        Ok(Self {
            handle,
            task: Mutex::new(Some(task)),
        })
    }
}

#[async_trait]
impl EventForwarder for LogInsightForwarder {
    fn connect(&self) -> bool {
        true
    }

    async fn ship_events(&self, event: Event) -> Result<(), SubmitError> {
        self.handle.submit(event).await
    }

    async fn shutdown(&self) {
        self.handle.shutdown();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Ingest pipeline task failed: {}", e);
            }
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.handle.stats()
    }
}

/// Accepts every event and does nothing with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopForwarder;

#[async_trait]
impl EventForwarder for NoopForwarder {
    fn connect(&self) -> bool {
        true
    }

    async fn ship_events(&self, _event: Event) -> Result<(), SubmitError> {
        trace!("Discarding event");
        Ok(())
    }

    async fn shutdown(&self) {}

    fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }
}
