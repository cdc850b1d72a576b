// SPDX-License-Identifier: MIT

//! Notification provider client (pings).
//!
//! Dispatch failures are always `NotificationDispatch` errors; callers in
//! the refresh pipeline log them and move on. They never affect
//! reconciliation or credential state.

use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// The pings service is slow to fail; cap dispatch attempts hard.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(7);

/// Notification dispatch interface consumed by the scheduler.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `body` to `username` on the configured route.
    async fn send(&self, username: &str, body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct PingPayload<'a> {
    username: &'a str,
    body: &'a str,
}

/// Client for the pings notification service.
#[derive(Clone)]
pub struct PingsClient {
    http: reqwest::Client,
    base_url: String,
    route: String,
    token: String,
}

impl PingsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.pings_base_url.clone(),
            route: config.pings_route.clone(),
            token: config.pings_token.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for PingsClient {
    async fn send(&self, username: &str, body: &str) -> Result<()> {
        let url = format!("{}/service/route/{}/ping", self.base_url, self.route);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PingPayload { username, body })
            .send()
            .await
            .map_err(|e| AppError::NotificationDispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::NotificationDispatch(format!(
                "ping rejected with HTTP {}",
                response.status()
            )));
        }

        tracing::debug!(username, "Ping dispatched");
        Ok(())
    }
}
