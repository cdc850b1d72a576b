// SPDX-License-Identifier: MIT

//! User profile and per-user settings.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore (keyed by uid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Opaque account id derived from the TigerSpend account page
    pub uid: String,
    pub first_name: String,
    pub last_name: String,
    /// Preferred display name
    pub pref_name: String,
    /// When the user first signed in (RFC3339)
    pub first_sign_in: String,
    /// Most recent sign-in (RFC3339)
    pub last_sign_in: String,
    /// Number of completed auth flows
    pub total_auths: u32,
}

/// Per-user settings gating refresh participation and notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub uid: String,
    /// When false the refresh scheduler skips this user entirely.
    pub credential_sync: bool,
    /// Send a ping when a new transaction shows up during reconciliation.
    pub receipt_notifications: bool,
    /// Send a ping on low-balance conditions (consumed by the dashboard).
    pub balance_notifications: bool,
    /// Contact address receipt pings are routed to.
    pub email_address: String,
    pub phone_number: String,
}

impl UserSettings {
    /// Settings assigned when an account is first created: sync on,
    /// notifications off until the user opts in.
    pub fn defaults_for(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            credential_sync: true,
            receipt_notifications: false,
            balance_notifications: false,
            email_address: String::new(),
            phone_number: String::new(),
        }
    }
}
