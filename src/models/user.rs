// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User credential model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Registered user stored in Firestore.
///
/// Stored at: `users/{lowercased email}` so registration can use a
/// create-only write to reject duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user ID (UUID), used as the quota and record owner
    pub id: String,
    /// Email address as entered at registration
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// PBKDF2 password hash in `pbkdf2-sha256$iterations$salt$hash` form
    pub password_hash: String,
    /// When the user registered (ISO 8601)
    pub created_at: String,
}

impl User {
    /// Document key for an email address.
    pub fn key_for(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Public view of a user returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}
