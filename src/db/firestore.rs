// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and settings
//! - Sessions (stored skey credentials)
//! - Meal plans
//! - Purchases, including the transactional replace used by reconciliation
//!
//! Account deletion cascades through every collection here; Firestore has
//! no foreign keys, so the gateway owns the cascade.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{MealPlan, Purchase, SessionData, UserInfo, UserSettings};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

fn user_doc_id(uid: &str) -> String {
    urlencoding::encode(uid).into_owned()
}

fn plan_doc_id(uid: &str, plan_id: u32) -> String {
    format!("{}_{}", urlencoding::encode(uid), plan_id)
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // With the emulator use an unauthenticated connection to avoid
        // local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user profile by uid.
    pub async fn get_user(&self, uid: &str) -> Result<Option<UserInfo>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_doc_id(uid))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user profile.
    pub async fn upsert_user(&self, user: &UserInfo) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_doc_id(&user.uid))
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Settings Operations ─────────────────────────────────────

    pub async fn get_user_settings(&self, uid: &str) -> Result<Option<UserSettings>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USER_SETTINGS)
            .obj()
            .one(&user_doc_id(uid))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn set_user_settings(&self, settings: &UserSettings) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USER_SETTINGS)
            .document_id(user_doc_id(&settings.uid))
            .object(settings)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Get the stored credential for a user.
    pub async fn get_session_data(&self, uid: &str) -> Result<Option<SessionData>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SESSIONS)
            .obj()
            .one(&user_doc_id(uid))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a session credential for a user.
    pub async fn set_session_data(&self, session: &SessionData) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(user_doc_id(&session.uid))
            .object(session)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Replace the skey on an existing session, leaving other fields alone.
    pub async fn update_skey(&self, uid: &str, skey: &str) -> Result<(), AppError> {
        let mut session = self
            .get_session_data(uid)
            .await?
            .ok_or_else(|| AppError::Database(format!("No session for uid {}", uid)))?;
        session.skey = skey.to_string();
        self.set_session_data(&session).await
    }

    /// Every session holding a non-empty skey. This is the fan-out source
    /// for a refresh pass.
    pub async fn list_credentialed_sessions(&self) -> Result<Vec<SessionData>, AppError> {
        let sessions: Vec<SessionData> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(sessions.into_iter().filter(|s| s.has_credential()).collect())
    }

    // ─── Meal Plan Operations ────────────────────────────────────

    pub async fn get_meal_plans(&self, uid: &str) -> Result<Vec<MealPlan>, AppError> {
        let uid_filter = uid.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::MEAL_PLANS)
            .filter(move |q| q.for_all([q.field("uid").eq(uid_filter.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Transactionally replace the plan set for a user.
    pub async fn replace_meal_plans(&self, uid: &str, plans: &[MealPlan]) -> Result<(), AppError> {
        let existing = self.get_meal_plans(uid).await?;
        let delete_ids: Vec<String> = existing
            .iter()
            .map(|p| plan_doc_id(&p.uid, p.plan_id))
            .collect();

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for doc_id in &delete_ids {
            client
                .fluent()
                .delete()
                .from(collections::MEAL_PLANS)
                .document_id(doc_id)
                .add_to_transaction(&mut transaction)
                .map_err(|e| AppError::Database(format!("Failed to stage plan delete: {}", e)))?;
        }
        for plan in plans {
            client
                .fluent()
                .update()
                .in_col(collections::MEAL_PLANS)
                .document_id(plan_doc_id(&plan.uid, plan.plan_id))
                .object(plan)
                .add_to_transaction(&mut transaction)
                .map_err(|e| AppError::Database(format!("Failed to stage plan insert: {}", e)))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Plan replace commit failed: {}", e)))?;
        Ok(())
    }

    // ─── Purchase Operations ─────────────────────────────────────

    /// All persisted purchases for one (user, plan).
    pub async fn get_purchases(&self, uid: &str, plan_id: u32) -> Result<Vec<Purchase>, AppError> {
        let uid_filter = uid.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PURCHASES)
            .filter(move |q| {
                q.for_all([
                    q.field("uid").eq(uid_filter.clone()),
                    q.field("plan_id").eq(plan_id),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Number of persisted purchases for one (user, plan). Reconciliation
    /// compares this against the fresh fetch before overwriting.
    pub async fn count_purchases(&self, uid: &str, plan_id: u32) -> Result<usize, AppError> {
        Ok(self.get_purchases(uid, plan_id).await?.len())
    }

    /// Transactionally delete all purchases for (uid, plan) and insert
    /// `records`. Deterministic document ids make this idempotent: running
    /// the same replace twice leaves exactly `records.len()` rows.
    ///
    /// When the combined operation count fits in one Firestore transaction
    /// the replace is fully atomic. Larger statements fall back to chunked
    /// transactions; the delete set and insert set are still applied
    /// all-or-nothing per chunk.
    pub async fn replace_purchases(
        &self,
        uid: &str,
        plan_id: u32,
        records: &[Purchase],
    ) -> Result<(), AppError> {
        let existing = self.get_purchases(uid, plan_id).await?;
        // Replaced records with matching ids are overwritten by the insert,
        // so only stale ids need explicit deletes.
        let incoming: std::collections::HashSet<String> =
            records.iter().map(|r| r.doc_id()).collect();
        let delete_ids: Vec<String> = existing
            .iter()
            .map(|p| p.doc_id())
            .filter(|id| !incoming.contains(id))
            .collect();

        let client = self.get_client()?;
        let total_ops = delete_ids.len() + records.len();
        if total_ops > BATCH_SIZE {
            tracing::warn!(
                uid,
                plan_id,
                total_ops,
                "Purchase replace exceeds one transaction, chunking"
            );
        }

        enum Op<'a> {
            Delete(&'a str),
            Insert(&'a Purchase),
        }

        let ops: Vec<Op> = delete_ids
            .iter()
            .map(|id| Op::Delete(id.as_str()))
            .chain(records.iter().map(Op::Insert))
            .collect();

        for chunk in ops.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for op in chunk {
                match op {
                    Op::Delete(doc_id) => {
                        client
                            .fluent()
                            .delete()
                            .from(collections::PURCHASES)
                            .document_id(*doc_id)
                            .add_to_transaction(&mut transaction)
                            .map_err(|e| {
                                AppError::Database(format!(
                                    "Failed to stage purchase delete: {}",
                                    e
                                ))
                            })?;
                    }
                    Op::Insert(record) => {
                        client
                            .fluent()
                            .update()
                            .in_col(collections::PURCHASES)
                            .document_id(record.doc_id())
                            .object(*record)
                            .add_to_transaction(&mut transaction)
                            .map_err(|e| {
                                AppError::Database(format!(
                                    "Failed to stage purchase insert: {}",
                                    e
                                ))
                            })?;
                    }
                }
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Purchase replace commit failed: {}", e)))?;
        }

        tracing::debug!(
            uid,
            plan_id,
            deleted = delete_ids.len(),
            inserted = records.len(),
            "Purchases replaced"
        );
        Ok(())
    }

    // ─── Account Deletion (cascade) ──────────────────────────────

    /// Delete an entire account: purchases, meal plans, settings, session
    /// and user profile. Called when upstream confirms the credential is
    /// permanently invalid, and by the dashboard's delete-account flow.
    ///
    /// Returns the number of documents deleted.
    pub async fn delete_user_cascade(&self, uid: &str) -> Result<usize, AppError> {
        let mut deleted_count = 0;

        // 1. Purchases (query by uid, all plans)
        let uid_filter = uid.to_string();
        let purchases: Vec<Purchase> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PURCHASES)
            .filter(move |q| q.for_all([q.field("uid").eq(uid_filter.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = purchases.len();
        self.batch_delete(&purchases, collections::PURCHASES, |p: &Purchase| p.doc_id())
            .await?;
        deleted_count += count;
        tracing::debug!(uid, count, "Deleted purchases");

        // 2. Meal plans
        let plans = self.get_meal_plans(uid).await?;
        let count = plans.len();
        self.batch_delete(&plans, collections::MEAL_PLANS, |p: &MealPlan| {
            plan_doc_id(&p.uid, p.plan_id)
        })
        .await?;
        deleted_count += count;
        tracing::debug!(uid, count, "Deleted meal plans");

        // 3. Settings, session, profile (single documents each)
        for collection in [
            collections::USER_SETTINGS,
            collections::SESSIONS,
            collections::USERS,
        ] {
            self.get_client()?
                .fluent()
                .delete()
                .from(collection)
                .document_id(user_doc_id(uid))
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            deleted_count += 1;
        }

        tracing::info!(uid, deleted_count, "Account deletion complete");
        Ok(deleted_count)
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_doc_ids_are_stable() {
        assert_eq!(plan_doc_id("jsmith1234", 55), "jsmith1234_55");
    }

    #[test]
    fn user_doc_ids_encode_unsafe_chars() {
        assert_eq!(user_doc_id("a b/c"), "a%20b%2Fc");
    }

    #[tokio::test]
    async fn mock_db_rejects_operations() {
        let db = FirestoreDb::new_mock();
        let err = db.get_user("nobody").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
