// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment provider: Stripe checkout sessions and webhook verification.

use crate::config::Config;
use crate::error::AppError;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook delivery.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Event type that grants credits.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Creates hosted checkout sessions for credit packs.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Start a checkout for `credits` uploads; returns the session ID.
    async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        credits: u32,
    ) -> Result<String, AppError>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

/// Stripe Checkout client.
#[derive(Clone)]
pub struct StripeCheckout {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    frontend_url: String,
    unit_amount: u64,
    currency: String,
}

impl StripeCheckout {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.stripe.com".to_string(),
            secret_key: config.stripe_secret_key.clone(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            unit_amount: config.credit_pack_price,
            currency: config.credit_pack_currency.clone(),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeCheckout {
    async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        credits: u32,
    ) -> Result<String, AppError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let credits = credits.to_string();
        let unit_amount = self.unit_amount.to_string();
        let description = format!("{} prescription uploads", credits);
        let success_url = format!("{}/dashboard?payment=success", self.frontend_url);
        let cancel_url = format!("{}/dashboard?payment=cancelled", self.frontend_url);

        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &self.currency),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            (
                "line_items[0][price_data][product_data][name]",
                "Upload Credits Pack",
            ),
            (
                "line_items[0][price_data][product_data][description]",
                &description,
            ),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("client_reference_id", user_id),
            ("metadata[userId]", user_id),
            ("metadata[email]", email),
            ("metadata[uploadCredits]", &credits),
        ];

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::PaymentProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PaymentProvider(format!("HTTP {}: {}", status, body)));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::PaymentProvider(format!("JSON parse error: {}", e)))?;

        tracing::info!(user_id, session_id = %session.id, "Checkout session created");
        Ok(session.id)
    }
}

/// Webhook signature failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no matching signature")]
    Mismatch,
}

fn compute_signature(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a `Stripe-Signature` header value for a payload.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let signature = compute_signature(payload, secret, timestamp)?;
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
///
/// Any `v1` entry may match; comparison is constant time.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?)
            }
            Some(("v1", value)) => signatures.push(value),
            Some(_) => {}
            None => return Err(SignatureError::Malformed),
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .any(|sig| bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Minimal webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Credit grant carried by a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub credits: u32,
}

impl WebhookEvent {
    /// Extract the credit grant if this is a completed checkout.
    pub fn completed_checkout(&self, default_credits: u32) -> Option<CompletedCheckout> {
        if self.event_type != CHECKOUT_COMPLETED {
            return None;
        }

        let metadata = self.data.object.get("metadata");
        let field = |name: &str| {
            metadata
                .and_then(|m| m.get(name))
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let credits = field("uploadCredits")
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or(default_credits);

        Some(CompletedCheckout {
            user_id: field("userId"),
            email: field("email"),
            credits,
        })
    }
}
