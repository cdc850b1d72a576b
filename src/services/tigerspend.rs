// SPDX-License-Identifier: MIT

//! TigerSpend statement provider client.
//!
//! Handles:
//! - Credential probes (the only signal of skey validity is whether the
//!   request gets redirected back to the login page)
//! - Statement fetches over the configured date window
//! - Plan listing from the account page
//!
//! The scheduler talks to this through the [`StatementProvider`] trait so
//! tests can substitute a scripted provider.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::plan::meal_plan_name;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

/// One raw statement row: `[timestamp, merchant_code, amount, balance]`.
pub type RawRow = Vec<String>;

/// Bounded retry policy for the credential probe.
const VALIDATE_MAX_ATTEMPTS: u32 = 10;
const VALIDATE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Upstream statement provider interface consumed by the scheduler.
#[async_trait]
pub trait StatementProvider: Send + Sync {
    /// Probe whether a stored skey is still accepted upstream.
    ///
    /// `Ok(false)` means the provider redirected the probe to login: the
    /// credential is permanently invalid. A `TransientUpstream` error means
    /// the probe never completed and nothing can be concluded.
    async fn validate_credential(&self, skey: &str) -> Result<bool>;

    /// Fetch raw statement rows for one plan over the configured window.
    ///
    /// Errors are a distinct sentinel from an empty statement: a failed
    /// fetch must never be conflated with "zero purchases", or stored
    /// history would be wrongly overwritten with emptiness.
    async fn fetch_statement(&self, skey: &str, plan_id: u32) -> Result<Vec<RawRow>>;

    /// List the plans visible to a credential as `(plan_id, name)` pairs.
    async fn list_plans(&self, skey: &str) -> Result<Vec<(u32, String)>>;
}

/// TigerSpend HTTP client.
#[derive(Clone)]
pub struct TigerSpendClient {
    http: reqwest::Client,
    base_url: String,
    cid: u32,
    window_start: NaiveDate,
    window_end: NaiveDate,
}

impl TigerSpendClient {
    /// Build a client from configuration.
    ///
    /// Redirects are never followed: a redirect response is itself the
    /// invalid-credential signal, so it must stay observable.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {}", e)))?;

        let (window_start, window_end) = config.statement_window();

        Ok(Self {
            http,
            base_url: config.tigerspend_base_url.clone(),
            cid: config.cid,
            window_start,
            window_end,
        })
    }

    fn statement_url(&self) -> String {
        format!("{}/statementdetail.php", self.base_url)
    }

    fn account_url(&self) -> String {
        format!("{}/statementnew.php", self.base_url)
    }
}

#[async_trait]
impl StatementProvider for TigerSpendClient {
    async fn validate_credential(&self, skey: &str) -> Result<bool> {
        let query = [
            ("cid", self.cid.to_string()),
            ("skey", skey.to_string()),
            ("acct", "1".to_string()),
        ];

        let mut attempt = 0;
        loop {
            match self
                .http
                .get(self.statement_url())
                .query(&query)
                .send()
                .await
            {
                Ok(response) => {
                    // Redirected away from the data endpoint means the skey
                    // was rejected.
                    return Ok(!response.status().is_redirection());
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    attempt += 1;
                    if attempt >= VALIDATE_MAX_ATTEMPTS {
                        return Err(AppError::TransientUpstream(format!(
                            "credential probe failed after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    tokio::time::sleep(VALIDATE_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(AppError::TransientUpstream(format!(
                        "credential probe failed: {}",
                        e
                    )));
                }
            }
        }
    }

    async fn fetch_statement(&self, skey: &str, plan_id: u32) -> Result<Vec<RawRow>> {
        let query = [
            ("skey", skey.to_string()),
            ("format", "csv".to_string()),
            ("startdate", self.window_start.format("%Y-%m-%d").to_string()),
            ("enddate", self.window_end.format("%Y-%m-%d").to_string()),
            ("acct", plan_id.to_string()),
            ("cid", self.cid.to_string()),
        ];

        let response = self
            .http
            .get(self.statement_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::TransientUpstream(format!("statement fetch failed: {}", e)))?;

        // A redirect here would yield an empty body; surface it as a failed
        // fetch rather than an empty statement so nothing is overwritten.
        if response.status().is_redirection() {
            return Err(AppError::TransientUpstream(
                "statement fetch was redirected".to_string(),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::TransientUpstream(format!("statement body read failed: {}", e)))?;

        Ok(parse_statement_body(&body))
    }

    async fn list_plans(&self, skey: &str) -> Result<Vec<(u32, String)>> {
        let query = [("skey", skey.to_string()), ("cid", self.cid.to_string())];

        let response = self
            .http
            .get(self.account_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::TransientUpstream(format!("plan listing failed: {}", e)))?;

        if response.status().is_redirection() {
            return Err(AppError::InvalidCredential);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::TransientUpstream(format!("plan body read failed: {}", e)))?;

        let plans = parse_plan_options(&body);
        if plans.is_empty() {
            // No select-account markup at all: the token did not reach the
            // account page.
            return Err(AppError::InvalidCredential);
        }
        Ok(plans)
    }
}

/// Split a CSV statement body into rows of columns.
///
/// The wire format is fixed but parsed defensively: blank lines are
/// dropped, quoting is honored, and short rows are passed through for the
/// normalizer to reject per-row.
pub fn parse_statement_body(body: &str) -> Vec<RawRow> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(split_csv_line)
        .collect()
}

/// Minimal CSV field splitter with double-quote handling.
fn split_csv_line(line: &str) -> RawRow {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Escaped quote inside a quoted field
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Pull `(plan_id, name)` pairs out of the account page's select-account
/// options. Plan names come from the fixed plan-name table, not the page.
pub fn parse_plan_options(body: &str) -> Vec<(u32, String)> {
    let Some(select_start) = body.find("select-account") else {
        return Vec::new();
    };
    let section = &body[select_start..];
    let section = match section.find("</select>") {
        Some(end) => &section[..end],
        None => section,
    };

    let mut plans = Vec::new();
    let mut rest = section;
    while let Some(pos) = rest.find("value=\"") {
        rest = &rest[pos + "value=\"".len()..];
        let Some(end) = rest.find('"') else { break };
        if let Ok(plan_id) = rest[..end].parse::<u32>() {
            plans.push((plan_id, meal_plan_name(plan_id).to_string()));
        }
        rest = &rest[end..];
    }
    plans
}
