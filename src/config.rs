// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! The statement date window is derived from a fixed semester table keyed
//! by the `CURRENT_SEMESTER` environment variable. Statements are always
//! requested from the start of the TigerSpend era so deposits made before
//! the semester still appear in the running balance.

use chrono::NaiveDate;
use std::env;

/// Default number of refresh workers in the pool.
pub const DEFAULT_NUM_WORKERS: usize = 8;

/// Default minutes between refresh passes.
pub const DEFAULT_UPDATE_RATE_MINUTES: f64 = 15.0;

/// TigerSpend client id sent with every upstream request.
pub const DEFAULT_CID: u32 = 105;

/// Start of the TigerSpend era; statements are fetched from this date.
fn era_start() -> NaiveDate {
    date(2010, 7, 1)
}

/// Date range covered by one semester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Look up the date window for a semester id.
pub fn semester_window(semester: u32) -> Option<SemesterWindow> {
    let window = match semester {
        2221 => SemesterWindow {
            start: date(2022, 7, 1),
            end: date(2022, 12, 15),
        },
        2225 => SemesterWindow {
            start: date(2022, 12, 15),
            end: date(2023, 5, 14),
        },
        _ => return None,
    };
    Some(window)
}

/// The inter-pass sleep is built from this value; it must be a usable
/// positive duration.
fn validate_update_rate(minutes: f64) -> Result<f64, ConfigError> {
    if minutes.is_finite() && minutes > 0.0 {
        Ok(minutes)
    } else {
        Err(ConfigError::Invalid("UPDATE_RATE"))
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    // Table entries are fixed, valid calendar dates.
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minutes to sleep between refresh passes.
    pub update_rate_minutes: f64,
    /// Width of the refresh worker pool.
    pub num_workers: usize,
    /// Current semester id (keys the semester date table).
    pub current_semester: u32,
    /// GCP project id for Firestore.
    pub gcp_project_id: String,
    /// Base URL of the TigerSpend statement provider.
    pub tigerspend_base_url: String,
    /// TigerSpend client id.
    pub cid: u32,
    /// Base URL of the pings notification provider.
    pub pings_base_url: String,
    /// Bearer token for the pings service.
    pub pings_token: String,
    /// Route id for receipt notifications.
    pub pings_route: String,
}

impl Config {
    /// Load configuration from environment variables (`.env` honored).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let current_semester: u32 = env::var("CURRENT_SEMESTER")
            .map_err(|_| ConfigError::Missing("CURRENT_SEMESTER"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("CURRENT_SEMESTER"))?;
        if semester_window(current_semester).is_none() {
            return Err(ConfigError::UnknownSemester(current_semester));
        }

        let update_rate_minutes = validate_update_rate(
            env::var("UPDATE_RATE")
                .ok()
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| ConfigError::Invalid("UPDATE_RATE"))?
                .unwrap_or(DEFAULT_UPDATE_RATE_MINUTES),
        )?;

        Ok(Self {
            update_rate_minutes,
            num_workers: env::var("NUM_WORKERS")
                .ok()
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| ConfigError::Invalid("NUM_WORKERS"))?
                .unwrap_or(DEFAULT_NUM_WORKERS),
            current_semester,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            tigerspend_base_url: env::var("TIGERSPEND_BASE_URL")
                .unwrap_or_else(|_| "https://tigerspend.rit.edu".to_string()),
            cid: env::var("TIGERSPEND_CID")
                .ok()
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| ConfigError::Invalid("TIGERSPEND_CID"))?
                .unwrap_or(DEFAULT_CID),
            pings_base_url: env::var("PINGS_BASE_URL")
                .unwrap_or_else(|_| "https://pings.csh.rit.edu".to_string()),
            pings_token: env::var("PINGS_TOKEN").map_err(|_| ConfigError::Missing("PINGS_TOKEN"))?,
            pings_route: env::var("PINGS_ROUTE").map_err(|_| ConfigError::Missing("PINGS_ROUTE"))?,
        })
    }

    /// Statement date window for the configured semester: era start through
    /// the semester end.
    pub fn statement_window(&self) -> (NaiveDate, NaiveDate) {
        let window =
            semester_window(self.current_semester).expect("semester validated at startup");
        (era_start(), window.end)
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            update_rate_minutes: DEFAULT_UPDATE_RATE_MINUTES,
            num_workers: DEFAULT_NUM_WORKERS,
            current_semester: 2221,
            gcp_project_id: "test-project".to_string(),
            tigerspend_base_url: "http://localhost:9090".to_string(),
            cid: DEFAULT_CID,
            pings_base_url: "http://localhost:9091".to_string(),
            pings_token: "test_pings_token".to_string(),
            pings_route: "test-route".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Could not parse environment variable: {0}")]
    Invalid(&'static str),

    #[error("Unknown semester id: {0}")]
    UnknownSemester(u32),
}
