// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;

use reqwest::Url;

use crate::constants::{
    DEFAULT_AGENT_ID, DEFAULT_BATCH_SIZE, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESERVED_FIELDS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_WORKERS, INGEST_API_PATH,
};
use crate::encoder::TimestampDefault;
use crate::error::ConfigError;
use crate::namespace::KeyNamespacer;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// What `submit` does when the ingest queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Drop the event, count it and log the drop. The producer never waits.
    #[default]
    Drop,
    /// Wait until a worker frees a slot.
    Block,
}

impl FromStr for QueueFullPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(QueueFullPolicy::Drop),
            "block" => Ok(QueueFullPolicy::Block),
            _ => Err(()),
        }
    }
}

impl FromStr for TimestampDefault {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zero" => Ok(TimestampDefault::Zero),
            "now" => Ok(TimestampDefault::Now),
            _ => Err(()),
        }
    }
}

/// Forwarder configuration. Built once and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Log Insight host name or address
    pub server: String,
    pub port: u16,
    /// Comma separated field names that get the `cf_` prefix
    pub reserved_fields: String,
    /// Agent id path segment of the ingest URL
    pub agent_id: String,
    /// Promote top-level keys of JSON message text to fields
    pub flatten_json: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub queue_full_policy: QueueFullPolicy,
    pub timestamp_default: TimestampDefault,
    /// Accept invalid or self-signed certificates from the endpoint
    pub skip_tls_verify: bool,
    /// Timeout for each ingest request, in seconds
    pub request_timeout_secs: u64,
    /// Grace period for draining and flushing on shutdown, in seconds
    pub shutdown_timeout_secs: u64,
    pub https_proxy: Option<String>,
    /// Replaces `https://<server>:<port>`, primarily used by integration tests
    pub url_override: Option<String>,
    /// Accept events and discard them
    pub noop: bool,
    /// Log every send attempt and response
    pub debug: bool,
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            reserved_fields: DEFAULT_RESERVED_FIELDS.to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            flatten_json: false,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_full_policy: QueueFullPolicy::default(),
            timestamp_default: TimestampDefault::default(),
            skip_tls_verify: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            https_proxy: None,
            url_override: None,
            noop: false,
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            server: env::var("INSIGHT_SERVER").unwrap_or_default(),
            port: parse_env("INSIGHT_SERVER_PORT", defaults.port)?,
            reserved_fields: env::var("INSIGHT_RESERVED_FIELDS")
                .unwrap_or(defaults.reserved_fields),
            agent_id: env::var("INSIGHT_AGENT_ID").unwrap_or(defaults.agent_id),
            flatten_json: bool_env("INSIGHT_HAS_JSON_LOG_MSG"),
            workers: parse_env("CONCURRENT_WORKERS", defaults.workers)?,
            queue_capacity: parse_env("INSIGHT_QUEUE_CAPACITY", defaults.queue_capacity)?,
            batch_size: parse_env("INSIGHT_BATCH_SIZE", defaults.batch_size)?,
            queue_full_policy: parse_env("INSIGHT_QUEUE_FULL_POLICY", defaults.queue_full_policy)?,
            timestamp_default: parse_env("INSIGHT_TIMESTAMP_DEFAULT", defaults.timestamp_default)?,
            skip_tls_verify: bool_env("INSIGHT_SKIP_SSL_VALIDATION"),
            request_timeout_secs: parse_env(
                "INSIGHT_REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
            shutdown_timeout_secs: parse_env(
                "INSIGHT_SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout_secs,
            )?,
            https_proxy: env::var("INSIGHT_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            url_override: env::var("INSIGHT_URL").ok().filter(|url| !url.is_empty()),
            noop: bool_env("INSIGHT_NOOP"),
            debug: bool_env("DEBUG"),
            log_level: env::var("INSIGHT_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        // Nothing is sent in noop mode, the remaining settings are irrelevant
        if self.noop {
            return Ok(());
        }

        if self.workers == 0 {
            return Err(ConfigError::ZeroValue("worker count"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroValue("queue capacity"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroValue("batch size"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("request timeout"));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("shutdown timeout"));
        }

        self.namespacer()?;
        self.ingest_url()?;
        Ok(())
    }

    pub fn namespacer(&self) -> Result<KeyNamespacer, ConfigError> {
        KeyNamespacer::from_list(&self.reserved_fields)
    }

    /// The full ingest URL, `https://<server>:<port>/api/v1/messages/ingest/<agent_id>`.
    pub fn ingest_url(&self) -> Result<String, ConfigError> {
        let base = match &self.url_override {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                if self.server.trim().is_empty() {
                    return Err(ConfigError::MissingServer);
                }
                format!("https://{}:{}", self.server, self.port)
            }
        };
        let url = format!("{base}{INGEST_API_PATH}/{}", self.agent_id);

        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            url: url.clone(),
            reason: reason.to_string(),
        };

        if self.agent_id.is_empty() || self.agent_id.contains('/') {
            return Err(invalid("agent id must be a single non-empty path segment"));
        }
        let parsed = Url::parse(&url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(invalid("scheme must be https"));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        Ok(url)
    }
}

fn bool_env(name: &str) -> bool {
    env::var(name)
        .map(|val| val.trim().to_lowercase() == "true")
        .unwrap_or(false)
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}
