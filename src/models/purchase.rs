// SPDX-License-Identifier: MIT

//! Persisted purchase records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One transaction under a (user, plan). The stored set for a (user, plan)
/// is fully replaced by every successful fetch; the source of truth is the
/// last successful statement, not an accumulating ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub uid: String,
    pub plan_id: u32,
    /// Transaction time as reported by the statement (campus-local, no tz).
    pub dt: NaiveDateTime,
    /// Normalized merchant label.
    pub location: String,
    /// Signed amount; spending is negative, deposits positive.
    pub amount: f64,
    /// Running balance after this transaction, copied verbatim.
    pub new_balance: f64,
    /// Record id, deterministic per (uid, plan, position in statement) so
    /// that replacing the same statement twice is idempotent.
    pub pid: String,
}

impl Purchase {
    /// Document id used in the purchase collection.
    pub fn doc_id(&self) -> String {
        format!("{}_{}_{}", urlencoding::encode(&self.uid), self.plan_id, self.pid)
    }
}
