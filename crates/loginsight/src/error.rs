// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the forwarding pipeline.
//!
//! Only [`ConfigError`] is fatal, and only at construction time. Everything that can go
//! wrong in the steady-state send path is recoverable: it is logged, counted and the
//! pipeline keeps going.

/// Errors raised while building a forwarder. The pipeline never starts when one occurs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Log Insight server is not set (INSIGHT_SERVER)")]
    MissingServer,

    #[error("Invalid ingest endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Invalid reserved field list '{0}'")]
    InvalidReservedFields(String),

    #[error("{0} must be greater than 0")]
    ZeroValue(&'static str),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Recoverable problems found while turning an event into a wire message.
///
/// The encoder still returns its best-effort message alongside these.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("timestamp field is not an integer: {0}")]
    InvalidTimestamp(String),

    #[error("message text is not a JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Failures reaching the ingest endpoint. The batch is dropped, never retried here.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to serialize batch: {0}")]
    Serialize(serde_json::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Returned to producers when an event could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("ingest queue is full, event dropped")]
    QueueFull,

    #[error("pipeline is shut down, event rejected")]
    Closed,
}
