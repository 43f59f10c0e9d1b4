// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding of Cloud Foundry firehose events to VMware Log Insight.
//!
//! Events are submitted to a bounded queue, encoded into Log Insight messages by a fixed
//! pool of workers, batched per worker and POSTed to
//! `https://<host>:<port>/api/v1/messages/ingest/<agent_id>`.
//!
//! Delivery is best effort and at-most-once: failed batches are logged and dropped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod message;
pub mod namespace;
pub mod pipeline;
pub mod stats;
pub mod transport;
