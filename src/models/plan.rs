// SPDX-License-Identifier: MIT

//! Meal plan sub-accounts.

use serde::{Deserialize, Serialize};

/// A named sub-account (meal plan, dining dollars, ...) under one user.
/// Each plan carries its own transaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub uid: String,
    pub plan_id: u32,
    pub plan_name: String,
}

impl MealPlan {
    pub fn new(uid: &str, plan_id: u32, plan_name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            plan_id,
            plan_name: plan_name.to_string(),
        }
    }
}

/// Display name for a known plan id; unknown plans fall back to a generic
/// label rather than failing.
pub fn meal_plan_name(plan_id: u32) -> &'static str {
    match plan_id {
        1 => "TigerBucks",
        24 => "Voluntary Dining",
        29 => "Rollover",
        54 => "Orange Plan",
        55 => "Tiger Plan",
        _ => "Meal Plan",
    }
}
