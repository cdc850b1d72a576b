// SPDX-License-Identifier: MIT

//! TigerSync: background credential refresh and purchase synchronization
//! for TigerSpend dining accounts.
//!
//! This crate owns the sync core: revalidating stored access tokens ("skeys")
//! against the TigerSpend statement provider, re-fetching transaction data,
//! reconciling it against persisted purchase records, and dispatching receipt
//! notifications. The dashboard consumes whatever was last reconciled.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
