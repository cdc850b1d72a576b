// SPDX-License-Identifier: MIT

//! Credential refresh scheduler.
//!
//! An endless pass loop: every `update_rate_minutes` it snapshots all
//! stored credentials, filters to users with credential sync enabled, and
//! fans the per-credential work out across a bounded pool of workers. Each
//! unit of work revalidates one skey and, when it is still good, refreshes
//! every meal plan sequentially: fetch, normalize, reconcile, optionally
//! ping.
//!
//! Failure containment, from widest to narrowest scope:
//! - a rejected credential deletes the whole account (cascade)
//! - a transient probe failure changes nothing; the next pass retries
//! - a per-plan fetch/reconcile failure is logged and the remaining plans
//!   still run
//! - a notification failure never blocks the purchase replace

use crate::config::Config;
use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::{MealPlan, SessionData, UserSettings};
use crate::services::locations::to_purchase_records;
use crate::services::notify::NotificationSink;
use crate::services::policy::{format_receipt, receipt_notice};
use crate::services::tigerspend::StatementProvider;
use futures_util::{stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Concurrency cap for the settings join at the start of a pass.
const SETTINGS_JOIN_CONCURRENCY: usize = 16;

/// One credential plus the settings that made it eligible.
type RefreshUnit = (SessionData, UserSettings);

/// Outcome of one per-credential unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// Credential valid; plans refreshed (some may have failed individually).
    Updated {
        plans_synced: usize,
        plans_failed: usize,
    },
    /// Credential rejected upstream; the account was deleted.
    Removed,
    /// Upstream was unreachable; nothing changed.
    Unreachable,
}

/// Accounting for one full pass over the credential set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Credentials fanned out this pass.
    pub eligible: usize,
    /// Credentials skipped because sync is disabled or settings are absent.
    pub skipped: usize,
    pub updated: usize,
    pub removed: usize,
    pub unreachable: usize,
}

/// The background refresh scheduler.
pub struct RefreshScheduler {
    db: FirestoreDb,
    provider: Arc<dyn StatementProvider>,
    notifier: Arc<dyn NotificationSink>,
    update_rate_minutes: f64,
    num_workers: usize,
}

impl RefreshScheduler {
    pub fn new(
        db: FirestoreDb,
        provider: Arc<dyn StatementProvider>,
        notifier: Arc<dyn NotificationSink>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            provider,
            notifier,
            update_rate_minutes: config.update_rate_minutes,
            num_workers: config.num_workers,
        }
    }

    /// Run passes forever. There is no termination condition; the process
    /// is torn down externally.
    pub async fn run(&self) {
        let interval = Duration::from_secs_f64(self.update_rate_minutes * 60.0);
        loop {
            match self.run_pass().await {
                Ok(summary) => {
                    tracing::info!(
                        eligible = summary.eligible,
                        skipped = summary.skipped,
                        updated = summary.updated,
                        removed = summary.removed,
                        unreachable = summary.unreachable,
                        "Refresh pass complete"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Refresh pass aborted");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One full pass: snapshot, filter, bounded fan-out, wait for all
    /// workers to drain.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let sessions = self.db.list_credentialed_sessions().await?;
        tracing::debug!(count = sessions.len(), "Snapshotted credentialed sessions");

        // Join each session with its settings row.
        let joined: Vec<(SessionData, Option<UserSettings>)> = stream::iter(sessions)
            .map(|session| async move {
                let settings = match self.db.get_user_settings(&session.uid).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(uid = %session.uid, error = %e, "Settings lookup failed");
                        None
                    }
                };
                (session, settings)
            })
            .buffer_unordered(SETTINGS_JOIN_CONCURRENCY)
            .collect()
            .await;

        let (units, skipped) = eligible_units(joined);

        let eligible = units.len();
        let updated = AtomicUsize::new(0);
        let removed = AtomicUsize::new(0);
        let unreachable = AtomicUsize::new(0);

        fan_out(units, self.num_workers, |(session, settings)| {
            let updated = &updated;
            let removed = &removed;
            let unreachable = &unreachable;
            async move {
                match self.refresh_credential(&session, &settings).await {
                    Ok(CredentialOutcome::Updated {
                        plans_synced,
                        plans_failed,
                    }) => {
                        updated.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            uid = %session.uid,
                            plans_synced,
                            plans_failed,
                            "Updated credential"
                        );
                    }
                    Ok(CredentialOutcome::Removed) => {
                        removed.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(uid = %session.uid, "Removed account with dead credential");
                    }
                    Ok(CredentialOutcome::Unreachable) => {
                        unreachable.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(uid = %session.uid, "Upstream unreachable, no state change");
                    }
                    Err(e) => {
                        unreachable.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(uid = %session.uid, error = %e, "Unit of work failed");
                    }
                }
            }
        })
        .await;

        Ok(PassSummary {
            eligible,
            skipped,
            updated: updated.into_inner(),
            removed: removed.into_inner(),
            unreachable: unreachable.into_inner(),
        })
    }

    /// The per-credential state machine: VALIDATE, then REFRESH_PLANS.
    ///
    /// Only a validation rejection removes the account. Per-plan failures
    /// are contained here and never escalate to credential state.
    pub async fn refresh_credential(
        &self,
        session: &SessionData,
        settings: &UserSettings,
    ) -> Result<CredentialOutcome> {
        match self.provider.validate_credential(&session.skey).await {
            Ok(true) => {}
            Ok(false) => {
                self.db.delete_user_cascade(&session.uid).await?;
                return Ok(CredentialOutcome::Removed);
            }
            Err(e) if e.is_transient() => return Ok(CredentialOutcome::Unreachable),
            Err(e) => return Err(e),
        }

        let plans = self.db.get_meal_plans(&session.uid).await?;
        let mut plans_synced = 0;
        let mut plans_failed = 0;

        // Plans refresh sequentially; reconcile-then-notify ordering per
        // plan stays simple and cross-plan parallelism buys nothing.
        for plan in &plans {
            match self.refresh_plan(session, settings, plan).await {
                Ok(()) => plans_synced += 1,
                Err(e) => {
                    plans_failed += 1;
                    tracing::warn!(
                        uid = %session.uid,
                        plan_id = plan.plan_id,
                        error = %e,
                        "Plan refresh failed, continuing with remaining plans"
                    );
                }
            }
        }

        Ok(CredentialOutcome::Updated {
            plans_synced,
            plans_failed,
        })
    }

    /// Fetch, normalize, reconcile and optionally notify for one plan.
    async fn refresh_plan(
        &self,
        session: &SessionData,
        settings: &UserSettings,
        plan: &MealPlan,
    ) -> Result<()> {
        let rows = self
            .provider
            .fetch_statement(&session.skey, plan.plan_id)
            .await?;
        let records = to_purchase_records(&rows, &session.uid, plan.plan_id)?;

        // Compare against what is stored before overwriting.
        let previous_count = self.db.count_purchases(&session.uid, plan.plan_id).await?;

        if let Some(notice) = receipt_notice(previous_count, &records, settings) {
            if let Err(e) = self
                .notifier
                .send(&settings.email_address, &format_receipt(&notice))
                .await
            {
                // Never let a dispatch failure block the replace below.
                tracing::warn!(
                    uid = %session.uid,
                    plan_id = plan.plan_id,
                    error = %e,
                    "Receipt ping failed"
                );
            }
        }

        self.db
            .replace_purchases(&session.uid, plan.plan_id, &records)
            .await?;

        tracing::debug!(
            uid = %session.uid,
            plan_id = plan.plan_id,
            previous = previous_count,
            current = records.len(),
            "Plan reconciled"
        );
        Ok(())
    }
}

/// Filter the snapshot down to refreshable units. Users with sync disabled
/// or no settings row are skipped deterministically, before any fan-out.
fn eligible_units(
    joined: Vec<(SessionData, Option<UserSettings>)>,
) -> (Vec<RefreshUnit>, usize) {
    let total = joined.len();
    let units: Vec<RefreshUnit> = joined
        .into_iter()
        .filter_map(|(session, settings)| match settings {
            Some(s) if s.credential_sync => Some((session, s)),
            _ => None,
        })
        .collect();
    let skipped = total - units.len();
    (units, skipped)
}

/// Bounded fan-out: run `work` over `items` with at most `width` units in
/// flight. A finishing worker immediately pulls the next pending item
/// rather than waiting on siblings.
pub async fn fan_out<T, F, Fut>(items: Vec<T>, width: usize, work: F)
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    stream::iter(items)
        .for_each_concurrent(width.max(1), work)
        .await;
}
