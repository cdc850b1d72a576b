// SPDX-License-Identifier: MIT

//! Reconciliation and notification policy.
//!
//! Pure decision logic: given what was stored before a fetch and what the
//! fetch produced, decide whether a receipt ping should go out and what it
//! should say. Keeping this free of I/O lets every branch be tested
//! directly.

use crate::models::{Purchase, UserSettings};

/// What a receipt notification should describe: the newest fetched record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptNotice {
    pub location: String,
    pub amount: f64,
    pub new_balance: f64,
}

/// Decide whether reconciliation should dispatch a receipt ping.
///
/// Fires only when the fresh statement holds more records than were
/// persisted before the overwrite, the user opted in, and there is a
/// contact address to route to. Statements arrive newest-first, so the
/// first fetched record is the new transaction.
pub fn receipt_notice(
    previous_count: usize,
    fetched: &[Purchase],
    settings: &UserSettings,
) -> Option<ReceiptNotice> {
    if !settings.receipt_notifications {
        return None;
    }
    if settings.email_address.is_empty() {
        tracing::debug!(uid = %settings.uid, "Receipt ping skipped: no contact address");
        return None;
    }
    if fetched.len() <= previous_count {
        return None;
    }

    let newest = fetched.first()?;
    Some(ReceiptNotice {
        location: newest.location.clone(),
        amount: newest.amount,
        new_balance: newest.new_balance,
    })
}

/// Body text for a receipt ping.
pub fn format_receipt(notice: &ReceiptNotice) -> String {
    format!(
        "New transaction at {}: {:+.2} (balance: {:.2})",
        notice.location, notice.amount, notice.new_balance
    )
}
