// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use loginsight::{
    config::ForwarderConfig,
    error::SubmitError,
    forwarder::{self, EventForwarder},
    message::Event,
};

#[tokio::main]
pub async fn main() {
    let debug_enabled = env::var("DEBUG")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);
    let log_level = if debug_enabled {
        "debug".to_string()
    } else {
        env::var("INSIGHT_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or("info".to_string())
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ForwarderConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return;
        }
    };

    let forwarder = match forwarder::from_config(&config) {
        Ok(f) => f,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return;
        }
    };

    if !forwarder.connect() {
        error!("Unable to connect to Log Insight. Shutting down.");
        return;
    }

    info!("Forwarding firehose events from stdin");

    tokio::select! {
        () = forward_stdin(forwarder.as_ref()) => {
            debug!("Reached end of input");
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Received shutdown signal");
        }
    }

    forwarder.shutdown().await;

    let stats = forwarder.stats();
    info!(
        "Forwarded {} of {} events ({} dropped, {} failed)",
        stats.messages_sent, stats.submitted, stats.dropped, stats.messages_failed
    );
}

/// Reads one JSON event per line until EOF or until the forwarder stops accepting events.
async fn forward_stdin(forwarder: &dyn EventForwarder) {
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read from stdin: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event: {e}");
                continue;
            }
        };

        match forwarder.ship_events(event).await {
            Ok(()) | Err(SubmitError::QueueFull) => {}
            Err(SubmitError::Closed) => {
                warn!("Forwarder closed, no longer reading input");
                return;
            }
        }
    }
}
