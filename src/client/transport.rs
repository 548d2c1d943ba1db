// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw HTTP transport to the RBMC service.

use super::ResilientClientConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

/// A single GET against the upstream, without retries or breaker.
///
/// Anything but `200 OK` is a failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the body at `url`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Timeout`, `GatewayError::Transport` or
    /// `GatewayError::Status`.
    async fn get(&self, url: &Url) -> Result<Bytes>;
}

/// Transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the HTTP client with the configured timeouts and user agent.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the client cannot be built.
    pub fn new(config: &ResilientClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.response_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<Bytes> {
        let response = self.client.get(url.clone()).send().await?;

        if response.status() != StatusCode::OK {
            return Err(GatewayError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?)
    }
}
