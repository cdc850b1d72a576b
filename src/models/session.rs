// SPDX-License-Identifier: MIT

//! Stored session credential ("skey") per user.

use serde::{Deserialize, Serialize};

/// One stored credential per user. This is the root entity of an account:
/// deleting it cascades to settings, plans and purchases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub uid: String,
    /// Opaque access token issued by TigerSpend after login. Empty when the
    /// user has logged out; such rows are excluded from refresh passes.
    pub skey: String,
    /// Dashboard theme preference (not consumed by the sync core).
    pub theme: String,
    /// Plan shown by default on the dashboard.
    pub default_plan: u32,
}

impl SessionData {
    pub fn new(uid: &str, skey: &str, default_plan: u32) -> Self {
        Self {
            uid: uid.to_string(),
            skey: skey.to_string(),
            theme: "dark".to_string(),
            default_plan,
        }
    }

    /// Whether this session holds a credential worth refreshing.
    pub fn has_credential(&self) -> bool {
        !self.skey.is_empty()
    }
}
