// SPDX-License-Identifier: MIT

//! Location normalization and statement row parsing.
//!
//! Statement rows arrive as `[timestamp, merchant_code, signed_amount,
//! running_balance]`. Merchant codes are opaque register identifiers like
//! `"STARBUCKS01 OnDemand"`; they are mapped to display labels through a
//! fixed substring table. Row parsing is defensive: a malformed row is
//! skipped, never fatal to the batch.

use crate::error::AppError;
use crate::models::Purchase;
use chrono::NaiveDateTime;

/// Timestamp format used by TigerSpend statements, e.g. `8/1/2024 10:00am`.
const STATEMENT_DT_FORMAT: &str = "%m/%d/%Y %I:%M%p";

/// Marker in the merchant code indicating an online order.
const ONLINE_MARKER: &str = "OnDemand";

/// Substring-to-label table, checked in order; first match wins.
const LOCATIONS: &[(&str, &str)] = &[
    ("WELLNESS", "Vending Machine (Wellness)"),
    ("BEVERAGE", "Vending Machine (Beverage)"),
    ("SNACK", "Vending Machine (Snack)"),
    ("STARBUCKS", "Vending Machine (StarBucks)"),
    ("FOOD", "Vending Machine (FOOD)"),
    ("MILK", "Vending Machine (Milk)"),
    ("Beanz", "Beanz"),
    ("Commons", "The Commons"),
    ("Gracie", "Gracie's"),
    ("Corner", "The Corner Store"),
    ("Ctrl Alt DELi", "Ctrl Alt DELi"),
    ("Crossroads", "C&M at The Crossroads"),
    ("RITz", "RITz Sports Zone"),
    ("Market", "Global Village Market"),
    ("Underground", "Sol's Underground"),
    ("Tablet", "Food Trucks"),
    ("Midnight", "Midnight Oil"),
    ("Grind", "The College Grind"),
    ("Concessions", "Campus Concessions"),
    ("Cantina", "GV Cantina & Grille"),
    ("Artesano", "Artesano Bakery & Cafe"),
    ("Brick City", "Brick City Cafe"),
    ("Nathan", "Nathan's Soup & Salad"),
    ("Jerry", "Ben & Jerry's"),
    ("Petals", "RIT Inn Petals"),
    ("Deposit", "Deposit"),
    ("Moves", "Transfer to Rollover"),
];

/// Map a raw merchant code to its display label. Total: unmatched codes
/// map to `"Unknown"` rather than failing.
pub fn normalize_location(raw: &str) -> String {
    for (needle, label) in LOCATIONS {
        if raw.contains(needle) {
            if raw.contains(ONLINE_MARKER) {
                return format!("{} (Online)", label);
            }
            return label.to_string();
        }
    }
    tracing::debug!(raw, "No label for merchant code");
    "Unknown".to_string()
}

/// Marker in an in-band provider message, e.g. "No transaction history
/// found for this date range.". Such a body is a statement-level signal,
/// not a statement with zero rows.
const NO_DATA_MARKER: &str = "transaction";

/// Parse raw statement rows into purchase records for one (user, plan).
///
/// Header rows are skipped. Upstream reports spending as positive, so the
/// amount sign is inverted; the running balance is copied verbatim. Rows
/// that fail to parse are logged and dropped.
///
/// A body carrying the provider's in-band "no transactions" message fails
/// the whole statement. It must never decay into an empty record set, or
/// reconciliation would overwrite stored history with emptiness.
pub fn to_purchase_records(
    rows: &[Vec<String>],
    uid: &str,
    plan_id: u32,
) -> Result<Vec<Purchase>, AppError> {
    if let Some(row) = rows
        .iter()
        .find(|r| r.first().is_some_and(|c| c.contains(NO_DATA_MARKER)))
    {
        return Err(AppError::TransientUpstream(format!(
            "statement is an in-band provider message: {:?}",
            row[0]
        )));
    }

    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        if row.first().map(String::as_str) == Some("Date") {
            continue;
        }
        match parse_row(row, uid, plan_id, records.len()) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(uid, plan_id, index, error = %e, "Skipping statement row");
            }
        }
    }

    Ok(records)
}

fn parse_row(row: &[String], uid: &str, plan_id: u32, seq: usize) -> Result<Purchase, AppError> {
    if row.len() < 4 {
        return Err(AppError::MalformedRow(format!(
            "expected 4 columns, got {}",
            row.len()
        )));
    }

    let dt = NaiveDateTime::parse_from_str(&row[0], STATEMENT_DT_FORMAT)
        .map_err(|e| AppError::MalformedRow(format!("bad timestamp {:?}: {}", row[0], e)))?;
    let raw_amount: f64 = row[2]
        .trim()
        .parse()
        .map_err(|_| AppError::MalformedRow(format!("non-numeric amount {:?}", row[2])))?;
    let new_balance: f64 = row[3]
        .trim()
        .parse()
        .map_err(|_| AppError::MalformedRow(format!("non-numeric balance {:?}", row[3])))?;

    Ok(Purchase {
        uid: uid.to_string(),
        plan_id,
        dt,
        location: normalize_location(&row[1]),
        amount: -raw_amount,
        new_balance,
        pid: format!("{:04}", seq),
    })
}
