// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Prefix applied to field names that collide with Log Insight's own schema.
pub const RESERVED_FIELD_PREFIX: &str = "cf_";

/// Event field carrying the epoch timestamp. Never emitted as a regular field.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Path of the Log Insight ingestion API, followed by the agent id.
pub const INGEST_API_PATH: &str = "/api/v1/messages/ingest";

pub const DEFAULT_PORT: u16 = 9543;
pub const DEFAULT_AGENT_ID: &str = "1";
pub const DEFAULT_RESERVED_FIELDS: &str = "event_type";
pub const DEFAULT_WORKERS: usize = 50;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// One message per POST unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Grace period given to workers to drain and flush on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

pub const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;
pub const IDLE_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Response bodies longer than this are cut before being logged.
pub const MAX_LOGGED_BODY_BYTES: usize = 512;
