// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod locations;
pub mod notify;
pub mod policy;
pub mod refresh;
pub mod tigerspend;

pub use notify::{NotificationSink, PingsClient};
pub use refresh::{CredentialOutcome, PassSummary, RefreshScheduler};
pub use tigerspend::{StatementProvider, TigerSpendClient};
