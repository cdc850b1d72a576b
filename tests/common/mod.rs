// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tigersync::db::FirestoreDb;
use tigersync::error::{AppError, Result};
use tigersync::services::notify::NotificationSink;
use tigersync::services::tigerspend::{RawRow, StatementProvider};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Scripted statement provider.
///
/// Tracks every upstream invocation plus a concurrency high-water mark so
/// tests can assert the scheduler's pool bound. Skeys that were never
/// scripted fail transiently: the emulator is shared across concurrently
/// running tests, and a transient failure is the only reply that is
/// guaranteed not to disturb anyone else's state.
#[allow(dead_code)]
pub struct ScriptedProvider {
    /// skey -> validity.
    pub validity: Mutex<HashMap<String, bool>>,
    /// (skey, plan_id) -> statement rows.
    pub statements: Mutex<HashMap<(String, u32), Vec<RawRow>>>,
    /// (skey, plan_id) pairs whose fetch fails transiently.
    pub failing_fetches: Mutex<HashSet<(String, u32)>>,
    /// Every skey that was probed for validity.
    pub probed: Mutex<Vec<String>>,
    /// Every (skey, plan_id) a statement fetch was attempted for.
    pub fetched: Mutex<Vec<(String, u32)>>,
    /// Total upstream calls (probes + fetches + plan listings).
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub high_water: AtomicUsize,
    /// Simulated upstream latency, so concurrency is observable.
    pub latency: Duration,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            validity: Mutex::new(HashMap::new()),
            statements: Mutex::new(HashMap::new()),
            failing_fetches: Mutex::new(HashSet::new()),
            probed: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            latency: Duration::from_millis(10),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    pub fn set_validity(&self, skey: &str, valid: bool) {
        self.validity.lock().unwrap().insert(skey.to_string(), valid);
    }

    pub fn set_statement(&self, skey: &str, plan_id: u32, rows: Vec<RawRow>) {
        self.statements
            .lock()
            .unwrap()
            .insert((skey.to_string(), plan_id), rows);
    }

    pub fn fail_fetch(&self, skey: &str, plan_id: u32) {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert((skey.to_string(), plan_id));
    }

    pub fn upstream_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probed_skeys(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    async fn track_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatementProvider for ScriptedProvider {
    async fn validate_credential(&self, skey: &str) -> Result<bool> {
        self.track_call().await;
        self.probed.lock().unwrap().push(skey.to_string());
        match self.validity.lock().unwrap().get(skey).copied() {
            Some(valid) => Ok(valid),
            None => Err(AppError::TransientUpstream(format!(
                "unscripted skey `{skey}`"
            ))),
        }
    }

    async fn fetch_statement(&self, skey: &str, plan_id: u32) -> Result<Vec<RawRow>> {
        self.track_call().await;
        let key = (skey.to_string(), plan_id);
        self.fetched.lock().unwrap().push(key.clone());
        if self.failing_fetches.lock().unwrap().contains(&key) {
            return Err(AppError::TransientUpstream("scripted failure".to_string()));
        }
        match self.statements.lock().unwrap().get(&key).cloned() {
            Some(rows) => Ok(rows),
            None => Err(AppError::TransientUpstream(format!(
                "unscripted statement for `{skey}` plan {plan_id}"
            ))),
        }
    }

    async fn list_plans(&self, skey: &str) -> Result<Vec<(u32, String)>> {
        self.track_call().await;
        if self.validity.lock().unwrap().get(skey).copied() != Some(true) {
            return Err(AppError::TransientUpstream(format!(
                "unscripted skey `{skey}`"
            )));
        }
        Ok(vec![(1, "TigerBucks".to_string())])
    }
}

/// Notification sink that records dispatches and can be told to fail.
#[allow(dead_code)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, username: &str, body: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::NotificationDispatch(
                "scripted dispatch failure".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((username.to_string(), body.to_string()));
        Ok(())
    }
}
