// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user upload quota account.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Uploads granted to every new account.
pub const FREE_UPLOAD_ALLOWANCE: u32 = 2;

/// Upload quota account for a user.
///
/// Stored at: `accounts/{user_id}`
///
/// Mutated only inside transactions (or under a map entry lock for the
/// in-memory backend), so the counters never go negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    /// User ID (also used as document ID)
    pub user_id: String,
    /// Email at the time the account was created, informational only
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub free_uploads_remaining: u32,
    #[serde(default)]
    pub paid_uploads_remaining: u32,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Payment event IDs already credited (for duplicate webhook delivery)
    #[serde(default)]
    pub processed_payment_events: HashSet<String>,

    /// Creation timestamp (ISO 8601)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl UserAccount {
    /// Create a new account with the free allowance and no paid credits.
    pub fn new(user_id: &str, email: Option<&str>, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            free_uploads_remaining: FREE_UPLOAD_ALLOWANCE,
            paid_uploads_remaining: 0,
            processed_payment_events: HashSet::new(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    pub fn total_remaining(&self) -> u32 {
        self.free_uploads_remaining
            .saturating_add(self.paid_uploads_remaining)
    }

    /// Take one upload, drawing from the free allowance first.
    ///
    /// Returns `Some(used_free)` on success, `None` if nothing is left.
    pub fn try_consume(&mut self, now: &str) -> Option<bool> {
        let used_free = if self.free_uploads_remaining > 0 {
            self.free_uploads_remaining -= 1;
            true
        } else if self.paid_uploads_remaining > 0 {
            self.paid_uploads_remaining -= 1;
            false
        } else {
            return None;
        };

        self.updated_at = now.to_string();
        Some(used_free)
    }

    /// Add paid uploads.
    ///
    /// Returns `false` without changing anything if `event_id` was
    /// already credited.
    pub fn credit(&mut self, count: u32, event_id: Option<&str>, now: &str) -> bool {
        if let Some(event_id) = event_id {
            if !self.processed_payment_events.insert(event_id.to_string()) {
                return false;
            }
        }

        self.paid_uploads_remaining = self.paid_uploads_remaining.saturating_add(count);
        self.updated_at = now.to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-01-01T00:00:00.000Z";

    #[test]
    fn test_new_account_has_free_allowance() {
        let account = UserAccount::new("u1", Some("a@example.com"), NOW);
        assert_eq!(account.free_uploads_remaining, 2);
        assert_eq!(account.paid_uploads_remaining, 0);
        assert_eq!(account.total_remaining(), 2);
    }

    #[test]
    fn test_consume_prefers_free_then_paid() {
        let mut account = UserAccount::new("u1", None, NOW);
        account.paid_uploads_remaining = 1;

        assert_eq!(account.try_consume(NOW), Some(true));
        assert_eq!(account.try_consume(NOW), Some(true));
        assert_eq!(account.try_consume(NOW), Some(false));
        assert_eq!(account.try_consume(NOW), None);
        assert_eq!(account.total_remaining(), 0);
    }

    #[test]
    fn test_credit_is_idempotent_per_event() {
        let mut account = UserAccount::new("u1", None, NOW);

        assert!(account.credit(20, Some("evt_1"), NOW));
        assert!(!account.credit(20, Some("evt_1"), NOW));
        assert!(account.credit(5, None, NOW));
        assert_eq!(account.paid_uploads_remaining, 25);
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let account: UserAccount =
            serde_json::from_str(r#"{"user_id": "u1", "free_uploads_remaining": 1}"#).unwrap();
        assert_eq!(account.paid_uploads_remaining, 0);
        assert!(account.processed_payment_events.is_empty());
    }

    #[test]
    fn test_total_saturates_at_max() {
        let mut account = UserAccount::new("u1", None, NOW);
        assert!(account.credit(u32::MAX, None, NOW));
        assert_eq!(account.total_remaining(), u32::MAX);
    }
}
