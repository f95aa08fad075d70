// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rx-Reader API Server
//!
//! Reads prescription photos into structured medication lists with
//! e-pharmacy search links, metered by a free/paid upload quota.

use rx_reader::{
    config::{Config, DatabaseBackend},
    db::{AccountStore, FirestoreDb, MemoryDb, PrescriptionStore, UserStore},
    services::{
        BlobStore, ExtractionGateway, HttpBlobStore, InMemoryBlobStore, SampleExtractionGateway,
        StripeCheckout, VisionLlmGateway,
    },
    AppState, Backends,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Rx-Reader API");

    // Storage backend
    let (accounts, prescriptions, users): (
        Arc<dyn AccountStore>,
        Arc<dyn PrescriptionStore>,
        Arc<dyn UserStore>,
    ) = match config.database {
        DatabaseBackend::Firestore => {
            let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
            (db.clone(), db.clone(), db)
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let db = Arc::new(MemoryDb::new());
            (db.clone(), db.clone(), db)
        }
    };

    // Extraction gateway
    let gateway: Arc<dyn ExtractionGateway> = match &config.openai_api_key {
        Some(key) => {
            tracing::info!(model = %config.openai_model, "Vision extraction enabled");
            Arc::new(VisionLlmGateway::new(
                &config.openai_base_url,
                key,
                &config.openai_model,
                config.extraction_timeout,
            ))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, using sample extraction");
            Arc::new(SampleExtractionGateway)
        }
    };

    // Blob store
    let blobs: Arc<dyn BlobStore> = match &config.blob_token {
        Some(token) => Arc::new(HttpBlobStore::new(&config.blob_base_url, token)),
        None => {
            tracing::warn!("BLOB_READ_WRITE_TOKEN not set, storing uploads in memory");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    let payments = Arc::new(StripeCheckout::new(&config));

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        Backends {
            accounts,
            prescriptions,
            users,
            blobs,
            gateway,
            payments,
        },
    ));

    // Build router
    let app = rx_reader::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["rx_reader=debug", "info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
