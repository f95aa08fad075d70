// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod account;
pub mod prescription;
pub mod user;

pub use account::{UserAccount, FREE_UPLOAD_ALLOWANCE};
pub use prescription::{MedicationItem, PrescriptionRecord, RecordUpdate, RxStatus};
pub use user::{User, UserProfile};
