// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and held in memory for the lifetime
//! of the process.

use crate::services::catalog::Store;
use std::env;
use std::time::Duration;

/// Which storage backend holds accounts and prescription records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL (CORS origin and checkout redirect base)
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Storage backend selection
    pub database: DatabaseBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// OpenAI-compatible API base URL
    pub openai_base_url: String,
    /// Vision model name
    pub openai_model: String,
    /// Upper bound on a single extraction attempt
    pub extraction_timeout: Duration,
    /// Blob store API base URL
    pub blob_base_url: String,
    /// Uploads granted per purchased pack
    pub credit_pack_size: u32,
    /// Pack price in the smallest currency unit
    pub credit_pack_price: u64,
    /// Checkout currency (ISO 4217, lowercase)
    pub credit_pack_currency: String,
    /// Store whose search link is written to `buyUrl`
    pub primary_store: Store,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// PBKDF2 iterations for new password hashes
    pub password_hash_iterations: u32,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Vision model API key (sample extraction is used when absent)
    pub openai_api_key: Option<String>,
    /// Blob store read/write token (in-memory blobs are used when absent)
    pub blob_token: Option<String>,
    /// Stripe API secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            database: DatabaseBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            extraction_timeout: Duration::from_secs(60),
            blob_base_url: "https://blob.vercel-storage.com".to_string(),
            credit_pack_size: 20,
            credit_pack_price: 10_000,
            credit_pack_currency: "inr".to_string(),
            primary_store: Store::OneMg,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            // Cheap hashing keeps auth tests fast
            password_hash_iterations: 1_000,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            openai_api_key: None,
            blob_token: None,
            stripe_secret_key: "sk_test_secret".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let database = match env::var("DATABASE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => DatabaseBackend::Firestore,
            "memory" => DatabaseBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "DATABASE_BACKEND",
                    format!("unknown backend '{}'", other),
                ))
            }
        };

        let primary_store = match env::var("PRIMARY_STORE") {
            Ok(raw) => raw
                .parse::<Store>()
                .map_err(|e| ConfigError::Invalid("PRIMARY_STORE", e))?,
            Err(_) => Store::OneMg,
        };

        let config = Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: parse_or("PORT", 8080)?,
            database,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            extraction_timeout: Duration::from_secs(parse_or("EXTRACTION_TIMEOUT_SECS", 60)?),
            blob_base_url: env::var("BLOB_BASE_URL")
                .unwrap_or_else(|_| "https://blob.vercel-storage.com".to_string()),
            credit_pack_size: parse_or("CREDIT_PACK_SIZE", 20)?,
            credit_pack_price: parse_or("CREDIT_PACK_PRICE", 10_000)?,
            credit_pack_currency: env::var("CREDIT_PACK_CURRENCY")
                .unwrap_or_else(|_| "inr".to_string()),
            primary_store,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            password_hash_iterations: parse_or(
                "PASSWORD_HASH_ITERATIONS",
                crate::services::password::DEFAULT_ITERATIONS,
            )?,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            openai_api_key: optional_secret("OPENAI_API_KEY"),
            blob_token: optional_secret("BLOB_READ_WRITE_TOKEN"),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_SECRET_KEY"))?,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot work together.
    ///
    /// The vision model fetches images by URL, so real extraction needs a
    /// public blob store; in-memory blob URLs are unreachable from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai_api_key.is_some() && self.blob_token.is_none() {
            return Err(ConfigError::Invalid(
                "BLOB_READ_WRITE_TOKEN",
                "required when OPENAI_API_KEY is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

/// Read an optional secret, treating blank values as unset.
fn optional_secret(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("cannot parse '{}'", raw))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
