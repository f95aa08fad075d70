// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Services depend on the storage traits below rather than a concrete
//! backend; `main` picks Firestore or the in-memory store from config.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{PrescriptionRecord, RecordUpdate, User, UserAccount};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// Upload quota accounts (keyed by user ID)
    pub const ACCOUNTS: &str = "accounts";
    pub const PRESCRIPTIONS: &str = "prescriptions";
    /// Registered users (keyed by lowercased email)
    pub const USERS: &str = "users";
}

/// Result of an atomic consume against an account.
#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    /// Account state after the operation
    pub account: UserAccount,
    /// `Some(used_free)` if a unit was taken, `None` if the balance was zero
    pub used_free: Option<bool>,
}

/// Result of an atomic credit against an account.
#[derive(Debug, Clone)]
pub struct CreditOutcome {
    pub account: UserAccount,
    /// `false` if the payment event had already been credited
    pub applied: bool,
}

/// Persistent upload quota accounts.
///
/// Both mutating operations lazily create the account and must be a
/// single atomic read-modify-write per user.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>, AppError>;

    /// Ensure the account exists, then take one upload (free first).
    async fn consume_upload(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<ConsumeOutcome, AppError>;

    /// Ensure the account exists, then add paid uploads unless `event_id`
    /// was already credited.
    async fn credit_paid(
        &self,
        user_id: &str,
        email: Option<&str>,
        count: u32,
        event_id: Option<&str>,
    ) -> Result<CreditOutcome, AppError>;
}

/// Persistent prescription records, always scoped by owner.
#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn insert_prescription(&self, record: &PrescriptionRecord) -> Result<(), AppError>;

    /// Fetch a record; `None` if absent or owned by someone else.
    async fn get_prescription(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<PrescriptionRecord>, AppError>;

    /// All records for an owner, newest first.
    async fn list_prescriptions(&self, owner_id: &str)
        -> Result<Vec<PrescriptionRecord>, AppError>;

    /// Apply `update` only if the record exists and belongs to `owner_id`.
    ///
    /// Returns the updated record, or `None` if nothing matched.
    async fn update_prescription(
        &self,
        owner_id: &str,
        id: &str,
        update: &RecordUpdate,
    ) -> Result<Option<PrescriptionRecord>, AppError>;
}

/// Registered user credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; returns `false` if the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<bool, AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}
