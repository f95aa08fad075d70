// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PrescriptionRecord, RecordUpdate};
use crate::services::{QuotaStatus, Upload};
use crate::AppState;
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(
                max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        )
        .route("/process/{id}", post(process))
        .route("/prescriptions", get(list_prescriptions))
        .route(
            "/prescriptions/{id}",
            get(get_prescription).patch(update_prescription),
        )
        .route("/quota", get(get_quota))
}

// ─── Upload ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub prescription_id: String,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("File too large".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Accept a prescription image (multipart field `file`).
async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });
        let bytes = field.bytes().await.map_err(multipart_error)?;

        file = Some(Upload {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = file.ok_or_else(|| AppError::BadRequest("No file received".to_string()))?;
    if upload.bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::BadRequest("File too large".to_string()));
    }

    let record = state
        .processor
        .create_from_upload(&user.user_id, Some(&user.email), upload)
        .await?;

    Ok(Json(UploadResponse {
        prescription_id: record.id,
    }))
}

// ─── Processing ──────────────────────────────────────────────

async fn process(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionRecord>> {
    let record = state.processor.process(&user.user_id, &id).await?;
    Ok(Json(record))
}

// ─── Records ─────────────────────────────────────────────────

/// Listing entry: the record plus its medicine count.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionSummary {
    #[serde(flatten)]
    pub record: PrescriptionRecord,
    pub medicine_count: usize,
}

async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PrescriptionSummary>>> {
    let records = state.processor.list(&user.user_id).await?;

    Ok(Json(
        records
            .into_iter()
            .map(|record| PrescriptionSummary {
                medicine_count: record.items.len(),
                record,
            })
            .collect(),
    ))
}

async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionRecord>> {
    let record = state.processor.get(&user.user_id, &id).await?;
    Ok(Json(record))
}

/// Manual edit by the owner.
async fn update_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<RecordUpdate>, JsonRejection>,
) -> Result<Json<PrescriptionRecord>> {
    let Json(update) = payload.map_err(|e| AppError::Validation(vec![e.body_text()]))?;
    let record = state.processor.edit(&user.user_id, &id, update).await?;
    Ok(Json(record))
}

// ─── Quota ───────────────────────────────────────────────────

async fn get_quota(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<QuotaStatus>> {
    let status = state.quota.get_status(&user.user_id).await?;
    Ok(Json(status))
}
