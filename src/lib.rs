// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rx-Reader: read prescription photos into structured medication lists
//!
//! This crate provides the backend API for uploading prescription images,
//! extracting medications with a vision model, linking them to e-pharmacy
//! searches, and metering uploads with a free/paid quota.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{AccountStore, PrescriptionStore, UserStore};
use services::{BlobStore, ExtractionGateway, PaymentProvider, PrescriptionProcessor, QuotaLedger};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub quota: QuotaLedger,
    pub users: Arc<dyn UserStore>,
    pub processor: PrescriptionProcessor,
    pub payments: Arc<dyn PaymentProvider>,
}

/// External collaborators injected into the application.
pub struct Backends {
    pub accounts: Arc<dyn AccountStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub users: Arc<dyn UserStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub gateway: Arc<dyn ExtractionGateway>,
    pub payments: Arc<dyn PaymentProvider>,
}

impl AppState {
    /// Wire services over the given backends.
    pub fn new(config: Config, backends: Backends) -> Self {
        let quota = QuotaLedger::new(backends.accounts);
        let processor = PrescriptionProcessor::new(
            quota.clone(),
            backends.prescriptions,
            backends.blobs,
            backends.gateway,
            config.primary_store,
            config.extraction_timeout,
        );

        Self {
            config,
            quota,
            users: backends.users,
            processor,
            payments: backends.payments,
        }
    }
}
