// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod plan;
pub mod purchase;
pub mod session;
pub mod user;

pub use plan::MealPlan;
pub use purchase::Purchase;
pub use session::SessionData;
pub use user::{UserInfo, UserSettings};
