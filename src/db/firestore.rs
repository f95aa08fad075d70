// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the storage traits for:
//! - Accounts (upload quota, mutated only in transactions)
//! - Prescriptions (owner-scoped records)
//! - Users (credentials keyed by email)

use crate::db::{
    collections, AccountStore, ConsumeOutcome, CreditOutcome, PrescriptionStore, UserStore,
};
use crate::error::AppError;
use crate::models::{PrescriptionRecord, RecordUpdate, User, UserAccount};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::Utc;
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::FutureExt;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // ExternalJwtFunctionSource provides a dummy token without a custom
        // TokenSource implementation struct.
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

        Ok(Self { client })
    }

    /// Helper to get the client.
    fn get_client(&self) -> &firestore::FirestoreDb {
        &self.client
    }
}

/// Map a transaction failure into the application error.
fn tx_error(context: &str, e: FirestoreError) -> AppError {
    AppError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl AccountStore for FirestoreDb {
    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>, AppError> {
        self.get_client()
            .fluent()
            .select()
            .by_id_in(collections::ACCOUNTS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Consume inside a transaction so concurrent requests for the same
    /// account are serialized by Firestore's optimistic concurrency; a
    /// conflicting commit reruns the closure against fresh data.
    async fn consume_upload(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<ConsumeOutcome, AppError> {
        let user_id = user_id.to_string();
        let email = email.map(str::to_string);

        self.get_client()
            .run_transaction(move |db, transaction| {
                let user_id = user_id.clone();
                let email = email.clone();

                async move {
                    let now = format_utc_rfc3339(Utc::now());
                    let current: Option<UserAccount> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ACCOUNTS)
                        .obj()
                        .one(&user_id)
                        .await?;

                    let mut account = current
                        .unwrap_or_else(|| UserAccount::new(&user_id, email.as_deref(), &now));
                    let used_free = account.try_consume(&now);

                    if used_free.is_some() {
                        db.fluent()
                            .update()
                            .in_col(collections::ACCOUNTS)
                            .document_id(&user_id)
                            .object(&account)
                            .add_to_transaction(transaction)?;
                    }

                    Ok::<_, BackoffError<FirestoreError>>(ConsumeOutcome { account, used_free })
                }
                .boxed()
            })
            .await
            .map_err(|e| tx_error("Quota consume transaction failed", e))
    }

    async fn credit_paid(
        &self,
        user_id: &str,
        email: Option<&str>,
        count: u32,
        event_id: Option<&str>,
    ) -> Result<CreditOutcome, AppError> {
        let user_id = user_id.to_string();
        let email = email.map(str::to_string);
        let event_id = event_id.map(str::to_string);

        self.get_client()
            .run_transaction(move |db, transaction| {
                let user_id = user_id.clone();
                let email = email.clone();
                let event_id = event_id.clone();

                async move {
                    let now = format_utc_rfc3339(Utc::now());
                    let current: Option<UserAccount> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ACCOUNTS)
                        .obj()
                        .one(&user_id)
                        .await?;

                    let mut account = current
                        .unwrap_or_else(|| UserAccount::new(&user_id, email.as_deref(), &now));
                    let applied = account.credit(count, event_id.as_deref(), &now);

                    if applied {
                        db.fluent()
                            .update()
                            .in_col(collections::ACCOUNTS)
                            .document_id(&user_id)
                            .object(&account)
                            .add_to_transaction(transaction)?;
                    }

                    Ok::<_, BackoffError<FirestoreError>>(CreditOutcome { account, applied })
                }
                .boxed()
            })
            .await
            .map_err(|e| tx_error("Quota credit transaction failed", e))
    }
}

#[async_trait]
impl PrescriptionStore for FirestoreDb {
    async fn insert_prescription(&self, record: &PrescriptionRecord) -> Result<(), AppError> {
        let _: PrescriptionRecord = self
            .get_client()
            .fluent()
            .insert()
            .into(collections::PRESCRIPTIONS)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_prescription(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<PrescriptionRecord>, AppError> {
        let record: Option<PrescriptionRecord> = self
            .get_client()
            .fluent()
            .select()
            .by_id_in(collections::PRESCRIPTIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(record.filter(|r| r.owner_id == owner_id))
    }

    async fn list_prescriptions(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PrescriptionRecord>, AppError> {
        let owner_id = owner_id.to_string();
        self.get_client()
            .fluent()
            .select()
            .from(collections::PRESCRIPTIONS)
            .filter(move |q| q.field("ownerId").eq(owner_id.clone()))
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_prescription(
        &self,
        owner_id: &str,
        id: &str,
        update: &RecordUpdate,
    ) -> Result<Option<PrescriptionRecord>, AppError> {
        let owner_id = owner_id.to_string();
        let id = id.to_string();
        let update = update.clone();

        self.get_client()
            .run_transaction(move |db, transaction| {
                let owner_id = owner_id.clone();
                let id = id.clone();
                let update = update.clone();

                async move {
                    let current: Option<PrescriptionRecord> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::PRESCRIPTIONS)
                        .obj()
                        .one(&id)
                        .await?;

                    // Ownership is re-checked inside the transaction
                    let Some(mut record) = current.filter(|r| r.owner_id == owner_id) else {
                        return Ok(None);
                    };

                    record.apply(&update, Utc::now());
                    db.fluent()
                        .update()
                        .in_col(collections::PRESCRIPTIONS)
                        .document_id(&id)
                        .object(&record)
                        .add_to_transaction(transaction)?;

                    Ok::<_, BackoffError<FirestoreError>>(Some(record))
                }
                .boxed()
            })
            .await
            .map_err(|e| tx_error("Prescription update transaction failed", e))
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn insert_user(&self, user: &User) -> Result<bool, AppError> {
        let result: Result<User, FirestoreError> = self
            .get_client()
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(User::key_for(&user.email))
            .object(user)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            // Create-only write: an existing document means the email is taken
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_client()
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&User::key_for(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
