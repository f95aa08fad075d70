// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Quota ledger: free and paid upload balances per user.

use crate::db::AccountStore;
use crate::error::AppError;
use crate::models::{UserAccount, FREE_UPLOAD_ALLOWANCE};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Uploads granted per purchase when the caller does not say otherwise.
pub const DEFAULT_PAID_CREDITS: u32 = 20;

/// Current balance view returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub free_remaining: u32,
    pub paid_remaining: u32,
    pub total_remaining: u32,
    pub can_upload: bool,
}

impl QuotaStatus {
    fn from_account(account: &UserAccount) -> Self {
        Self::from_balances(account.free_uploads_remaining, account.paid_uploads_remaining)
    }

    fn from_balances(free: u32, paid: u32) -> Self {
        let total = free.saturating_add(paid);
        Self {
            free_remaining: free,
            paid_remaining: paid,
            total_remaining: total,
            can_upload: total > 0,
        }
    }
}

/// Outcome of a consume call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResult {
    pub success: bool,
    pub remaining_total: u32,
    /// Whether the unit came from the free allowance (false on failure)
    pub used_free: bool,
}

/// Outcome of a paid credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditResult {
    pub status: QuotaStatus,
    /// `true` if this event was already credited and nothing changed
    pub duplicate: bool,
}

/// Upload quota ledger over an account store.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn AccountStore>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Balance for a user. A missing account reports the default allowance
    /// without creating it.
    pub async fn get_status(&self, user_id: &str) -> Result<QuotaStatus, AppError> {
        let status = match self.store.get_account(user_id).await? {
            Some(account) => QuotaStatus::from_account(&account),
            None => QuotaStatus::from_balances(FREE_UPLOAD_ALLOWANCE, 0),
        };
        Ok(status)
    }

    /// Take one upload, free allowance first.
    ///
    /// The check and decrement happen in one atomic store operation, so
    /// concurrent calls never overdraw the balance.
    pub async fn consume(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<ConsumeResult, AppError> {
        let outcome = self.store.consume_upload(user_id, email).await?;
        let remaining_total = outcome.account.total_remaining();

        match outcome.used_free {
            Some(used_free) => {
                tracing::info!(user_id, used_free, remaining_total, "Upload quota consumed");
                Ok(ConsumeResult {
                    success: true,
                    remaining_total,
                    used_free,
                })
            }
            None => {
                tracing::info!(user_id, "Upload quota exhausted");
                Ok(ConsumeResult {
                    success: false,
                    remaining_total,
                    used_free: false,
                })
            }
        }
    }

    /// Add paid uploads.
    ///
    /// With an `event_id`, repeated deliveries of the same payment event
    /// credit only once.
    pub async fn add_paid(
        &self,
        user_id: &str,
        email: Option<&str>,
        count: u32,
        event_id: Option<&str>,
    ) -> Result<CreditResult, AppError> {
        let outcome = self
            .store
            .credit_paid(user_id, email, count, event_id)
            .await?;
        let status = QuotaStatus::from_account(&outcome.account);

        if outcome.applied {
            tracing::info!(
                user_id,
                count,
                event_id,
                paid_remaining = status.paid_remaining,
                "Paid uploads credited"
            );
        } else {
            tracing::info!(user_id, event_id, "Duplicate payment event ignored");
        }

        Ok(CreditResult {
            status,
            duplicate: !outcome.applied,
        })
    }
}
