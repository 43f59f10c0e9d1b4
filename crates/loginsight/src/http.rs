// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::error::Error;

use reqwest::ClientBuilder;

use crate::config::ForwarderConfig;
use crate::constants::{IDLE_CONNECTION_TIMEOUT_SECS, MAX_IDLE_CONNECTIONS_PER_HOST};

/// Creates a reqwest client builder using rustls with the connection pool settings used
/// for the ingest endpoint.
fn create_reqwest_client_builder() -> ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
        .pool_idle_timeout(Duration::from_secs(IDLE_CONNECTION_TIMEOUT_SECS))
}

/// Builds a reqwest client with optional proxy configuration and timeout.
///
/// Certificate validation stays on unless `skip_tls_verify` is set, which is meant for
/// self-signed Log Insight deployments.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
    skip_tls_verify: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = create_reqwest_client_builder().timeout(timeout);
    if skip_tls_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

/// Builds the client for one worker. Every worker owns its own connection pool.
pub fn client_from_config(config: &ForwarderConfig) -> Result<reqwest::Client, Box<dyn Error>> {
    build_client(
        config.https_proxy.as_deref(),
        Duration::from_secs(config.request_timeout_secs),
        config.skip_tls_verify,
    )
}
