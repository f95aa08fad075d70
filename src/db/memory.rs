// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend for local development and tests.
//!
//! Each map entry is locked for the duration of a read-modify-write, which
//! gives the same per-document atomicity as a Firestore transaction.

use crate::db::{AccountStore, ConsumeOutcome, CreditOutcome, PrescriptionStore, UserStore};
use crate::error::AppError;
use crate::models::{PrescriptionRecord, RecordUpdate, User, UserAccount};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// DashMap-backed store implementing every storage trait.
#[derive(Default)]
pub struct MemoryDb {
    accounts: DashMap<String, UserAccount>,
    prescriptions: DashMap<String, PrescriptionRecord>,
    users: DashMap<String, User>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryDb {
    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>, AppError> {
        Ok(self.accounts.get(user_id).map(|a| a.value().clone()))
    }

    async fn consume_upload(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<ConsumeOutcome, AppError> {
        let now = format_utc_rfc3339(Utc::now());
        let mut account = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| UserAccount::new(user_id, email, &now));

        let used_free = account.try_consume(&now);
        Ok(ConsumeOutcome {
            account: account.value().clone(),
            used_free,
        })
    }

    async fn credit_paid(
        &self,
        user_id: &str,
        email: Option<&str>,
        count: u32,
        event_id: Option<&str>,
    ) -> Result<CreditOutcome, AppError> {
        let now = format_utc_rfc3339(Utc::now());
        let mut account = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| UserAccount::new(user_id, email, &now));

        let applied = account.credit(count, event_id, &now);
        Ok(CreditOutcome {
            account: account.value().clone(),
            applied,
        })
    }
}

#[async_trait]
impl PrescriptionStore for MemoryDb {
    async fn insert_prescription(&self, record: &PrescriptionRecord) -> Result<(), AppError> {
        match self.prescriptions.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Database(format!(
                "Prescription {} already exists",
                record.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get_prescription(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<PrescriptionRecord>, AppError> {
        Ok(self
            .prescriptions
            .get(id)
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.value().clone()))
    }

    async fn list_prescriptions(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PrescriptionRecord>, AppError> {
        let mut records: Vec<PrescriptionRecord> = self
            .prescriptions
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_prescription(
        &self,
        owner_id: &str,
        id: &str,
        update: &RecordUpdate,
    ) -> Result<Option<PrescriptionRecord>, AppError> {
        let Some(mut record) = self.prescriptions.get_mut(id) else {
            return Ok(None);
        };
        if record.owner_id != owner_id {
            return Ok(None);
        }

        record.apply(update, Utc::now());
        Ok(Some(record.value().clone()))
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn insert_user(&self, user: &User) -> Result<bool, AppError> {
        match self.users.entry(User::key_for(&user.email)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(true)
            }
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&User::key_for(email)).map(|u| u.value().clone()))
    }
}
