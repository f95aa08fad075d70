// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credit purchase routes: checkout session creation and the provider webhook.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::payments::{verify_webhook_signature, WebhookEvent};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook route (public; authenticated by signature).
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/payment", post(handle_webhook))
}

/// Checkout route (requires a session).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments/create-session", post(create_session))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
}

/// Start a checkout for one credit pack.
async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionResponse>> {
    let session_id = state
        .payments
        .create_session(&user.user_id, &user.email, state.config.credit_pack_size)
        .await?;

    Ok(Json(SessionResponse { session_id }))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// Handle a signed payment event.
///
/// The signature is checked against the raw body before anything is
/// parsed. Completed checkouts credit the buyer once per event ID.
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    verify_webhook_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| AppError::PaymentVerification(e.to_string()))?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {}", e)))?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Payment webhook received");

    let Some(checkout) = event.completed_checkout(state.config.credit_pack_size) else {
        return Ok(Json(WebhookResponse {
            received: true,
            duplicate: false,
        }));
    };

    let user_id = checkout.user_id.ok_or_else(|| {
        tracing::error!(event_id = %event.id, "Completed checkout has no userId metadata");
        AppError::BadRequest("No userId in session metadata".to_string())
    })?;

    let credit = state
        .quota
        .add_paid(
            &user_id,
            checkout.email.as_deref(),
            checkout.credits,
            Some(&event.id),
        )
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        duplicate: credit.duplicate,
    }))
}
