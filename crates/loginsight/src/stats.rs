// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the pipeline handle and its workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    encoding_errors: AtomicU64,
    batches_sent: AtomicU64,
    messages_sent: AtomicU64,
    batches_failed: AtomicU64,
    messages_failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events accepted into the queue.
    pub submitted: u64,
    /// Events dropped because the queue was full.
    pub dropped: u64,
    /// Events rejected because the pipeline was shut down.
    pub rejected: u64,
    pub encoding_errors: u64,
    pub batches_sent: u64,
    pub messages_sent: u64,
    pub batches_failed: u64,
    pub messages_failed: u64,
}

impl PipelineStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encoding_errors(&self, count: usize) {
        self.encoding_errors
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, messages: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.messages_sent
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, messages: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.messages_failed
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            encoding_errors: self.encoding_errors.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
        }
    }
}
