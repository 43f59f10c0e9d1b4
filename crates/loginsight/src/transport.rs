// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS delivery of batches to the Log Insight ingest API.
//!
//! Every outcome is classified and logged here. Nothing is retried: a batch that fails to
//! send is dropped, which makes delivery at-most-once.

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, error};

use crate::batch::Batch;
use crate::constants::MAX_LOGGED_BODY_BYTES;
use crate::error::TransportError;

#[derive(Debug)]
pub enum TransportResult {
    /// 2xx response.
    Success { status: StatusCode },
    /// Non-2xx response. `body` is truncated for diagnostics.
    RemoteRejected { status: StatusCode, body: String },
    /// The request never completed: serialization, network, TLS or timeout error.
    Failure(TransportError),
}

impl TransportResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TransportResult::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    url: String,
    verbose: bool,
}

impl Transport {
    #[must_use]
    pub fn new(client: reqwest::Client, url: String, verbose: bool) -> Self {
        Self {
            client,
            url,
            verbose,
        }
    }

    /// POSTs `batch` as JSON and classifies the outcome.
    pub async fn send(&self, batch: &Batch) -> TransportResult {
        let result = self.post(batch).await;
        match &result {
            TransportResult::Success { status } => {
                if self.verbose {
                    debug!(
                        "Post response code {} for {} messages",
                        status,
                        batch.len()
                    );
                }
            }
            TransportResult::RemoteRejected { status, body } => {
                error!(
                    "Log Insight rejected batch of {} messages with status {}: {}",
                    batch.len(),
                    status,
                    body
                );
            }
            TransportResult::Failure(e) => {
                error!(
                    "Failed to send batch of {} messages to {}: {}",
                    batch.len(),
                    self.url,
                    e
                );
            }
        }
        result
    }

    async fn post(&self, batch: &Batch) -> TransportResult {
        let payload = match serde_json::to_vec(batch) {
            Ok(payload) => payload,
            Err(e) => return TransportResult::Failure(TransportError::Serialize(e)),
        };

        if self.verbose {
            debug!("Post being sent with {} bytes", payload.len());
        }

        let response = match self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return TransportResult::Failure(e.into()),
        };

        let status = response.status();
        if status.is_success() {
            return TransportResult::Success { status };
        }

        let body = match read_body_prefix(response, MAX_LOGGED_BODY_BYTES).await {
            Ok(body) => body,
            Err(e) => format!("<unreadable body: {e}>"),
        };
        TransportResult::RemoteRejected { status, body }
    }
}

/// Reads at most `max` bytes of the response body. The rest is never downloaded, the
/// connection is dropped with the response.
async fn read_body_prefix(
    mut response: reqwest::Response,
    max: usize,
) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::with_capacity(max);
    while buf.len() < max {
        match response.chunk().await? {
            Some(chunk) => {
                let take = chunk.len().min(max - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }

    // The cut may land inside a multi-byte character
    if let Err(e) = std::str::from_utf8(&buf) {
        if e.error_len().is_none() {
            buf.truncate(e.valid_up_to());
        }
    }
    let body = String::from_utf8_lossy(&buf);
    Ok(truncate(&body, max).to_string())
}

/// Cuts `s` to at most `max` bytes without splitting a UTF-8 character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
