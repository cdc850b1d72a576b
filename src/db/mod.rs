// SPDX-License-Identifier: MIT

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const USER_SETTINGS: &str = "user_settings";
    /// Stored credentials, one document per user
    pub const SESSIONS: &str = "sessions";
    pub const MEAL_PLANS: &str = "meal_plans";
    pub const PURCHASES: &str = "purchases";
}
