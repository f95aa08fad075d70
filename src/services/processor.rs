// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prescription processing service.
//!
//! Drives a record through its lifecycle:
//! 1. Upload: check and consume quota, store the image, create the record
//! 2. Process: extract items, attach buy links, settle on a terminal status
//! 3. Edit: owner replaces items after schema validation
//!
//! Quota is only touched by upload. Every record access is scoped by owner.

use crate::db::PrescriptionStore;
use crate::error::{AppError, Result};
use crate::models::{MedicationItem, PrescriptionRecord, RecordUpdate, RxStatus};
use crate::services::blob::{upload_path, BlobStore};
use crate::services::catalog::{self, Store};
use crate::services::extraction::{ExtractionError, ExtractionGateway, MAX_EXTRACTION_ATTEMPTS};
use crate::services::quota::QuotaLedger;
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Orchestrates quota, blob storage, extraction and record updates.
pub struct PrescriptionProcessor {
    quota: QuotaLedger,
    records: Arc<dyn PrescriptionStore>,
    blobs: Arc<dyn BlobStore>,
    gateway: Arc<dyn ExtractionGateway>,
    primary_store: Store,
    extraction_timeout: Duration,
}

impl PrescriptionProcessor {
    pub fn new(
        quota: QuotaLedger,
        records: Arc<dyn PrescriptionStore>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn ExtractionGateway>,
        primary_store: Store,
        extraction_timeout: Duration,
    ) -> Self {
        Self {
            quota,
            records,
            blobs,
            gateway,
            primary_store,
            extraction_timeout,
        }
    }

    /// Accept an upload and create an `UPLOADED` record.
    ///
    /// Fails with `QuotaExceeded` before any mutation if the user has no
    /// uploads left, or if a concurrent upload took the last unit.
    pub async fn create_from_upload(
        &self,
        owner_id: &str,
        email: Option<&str>,
        upload: Upload,
    ) -> Result<PrescriptionRecord> {
        if upload.bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        let status = self.quota.get_status(owner_id).await?;
        if !status.can_upload {
            return Err(AppError::QuotaExceeded(status));
        }

        let consumed = self.quota.consume(owner_id, email).await?;
        if !consumed.success {
            // Lost a race for the last unit
            let status = self.quota.get_status(owner_id).await?;
            return Err(AppError::QuotaExceeded(status));
        }

        let path = upload_path(&upload.filename, &upload.content_type);
        let size = upload.bytes.len();
        let file_url = self
            .blobs
            .put(&path, upload.bytes, &upload.content_type)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    user_id = owner_id,
                    error = %e,
                    "Blob upload failed after quota was consumed"
                );
            })?;

        let record = PrescriptionRecord::new(owner_id, &file_url, Utc::now());
        self.records.insert_prescription(&record).await?;

        tracing::info!(
            user_id = owner_id,
            prescription_id = %record.id,
            size,
            used_free = consumed.used_free,
            "Prescription uploaded"
        );

        Ok(record)
    }

    /// Run extraction for a record and store the outcome.
    ///
    /// A `READY` record is returned unchanged. Any other status (including
    /// a stale `PROCESSING`) re-enters processing without charging quota.
    pub async fn process(&self, owner_id: &str, id: &str) -> Result<PrescriptionRecord> {
        let record = self.get(owner_id, id).await?;

        if record.status == RxStatus::Ready {
            tracing::debug!(prescription_id = id, "Record already ready, skipping");
            return Ok(record);
        }

        if !is_image_url(&record.file_url) {
            return Err(AppError::BadRequest(
                "Only PNG, JPEG, GIF or WebP images can be processed".to_string(),
            ));
        }

        self.update(owner_id, id, &RecordUpdate::status(RxStatus::Processing))
            .await?;
        tracing::info!(
            user_id = owner_id,
            prescription_id = id,
            previous = %record.status,
            "Processing prescription"
        );

        // extraction_timeout is per model request; the gateway may retry once
        let budget = self.extraction_timeout * MAX_EXTRACTION_ATTEMPTS;
        let extraction = match tokio::time::timeout(budget, self.gateway.extract(&record.file_url))
            .await
        {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(e)) => return self.fail(owner_id, id, e).await,
            Err(_) => return self.fail(owner_id, id, ExtractionError::Timeout(budget)).await,
        };

        let items = join_all(extraction.items.into_iter().map(|item| self.attach_buy_url(item))).await;
        let status = if items.is_empty() {
            RxStatus::NeedsReview
        } else {
            RxStatus::Ready
        };
        let item_count = items.len();

        let updated = self
            .update(
                owner_id,
                id,
                &RecordUpdate {
                    items: Some(items),
                    status: Some(status),
                    overall_confidence: Some(extraction.overall_confidence),
                },
            )
            .await?;

        tracing::info!(
            user_id = owner_id,
            prescription_id = id,
            status = %status,
            item_count,
            "Prescription processed"
        );

        Ok(updated)
    }

    /// Replace items (and optionally status/confidence) after validation.
    pub async fn edit(
        &self,
        owner_id: &str,
        id: &str,
        update: RecordUpdate,
    ) -> Result<PrescriptionRecord> {
        let update = update.normalized();
        update.validate().map_err(AppError::Validation)?;

        let updated = self.update(owner_id, id, &update).await?;
        tracing::info!(
            user_id = owner_id,
            prescription_id = id,
            status = %updated.status,
            item_count = updated.items.len(),
            "Prescription edited"
        );
        Ok(updated)
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> Result<PrescriptionRecord> {
        self.records
            .get_prescription(owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prescription {}", id)))
    }

    /// All records for an owner, newest first.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<PrescriptionRecord>> {
        self.records.list_prescriptions(owner_id).await
    }

    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        update: &RecordUpdate,
    ) -> Result<PrescriptionRecord> {
        self.records
            .update_prescription(owner_id, id, update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prescription {}", id)))
    }

    /// Mark the attempt failed, keeping existing items, and surface the error.
    async fn fail(
        &self,
        owner_id: &str,
        id: &str,
        error: ExtractionError,
    ) -> Result<PrescriptionRecord> {
        tracing::warn!(
            user_id = owner_id,
            prescription_id = id,
            error = %error,
            "Extraction failed"
        );
        self.update(owner_id, id, &RecordUpdate::status(RxStatus::Failed))
            .await?;
        Err(AppError::Extraction(error))
    }

    /// Compute the primary store link for an item.
    ///
    /// Weak deterministic queries go through the gateway's query
    /// suggestion; if that yields nothing the item gets no link.
    async fn attach_buy_url(&self, mut item: MedicationItem) -> MedicationItem {
        let mut query = catalog::build_query(&item);

        if catalog::needs_fallback(&query) {
            query = match tokio::time::timeout(
                self.extraction_timeout,
                self.gateway.suggest_query(&item),
            )
            .await
            {
                Ok(Ok(Some(suggested))) => catalog::clean(&suggested),
                Ok(Ok(None)) => String::new(),
                Ok(Err(e)) => {
                    tracing::warn!(raw_name = %item.raw_name, error = %e, "Query suggestion failed");
                    String::new()
                }
                Err(_) => {
                    tracing::warn!(raw_name = %item.raw_name, "Query suggestion timed out");
                    String::new()
                }
            };
        }

        item.buy_url = if query.is_empty() {
            None
        } else {
            Some(catalog::build_buy_links(self.primary_store, &query).primary.url)
        };
        item
    }
}

/// Image formats the vision gateway accepts.
const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Whether a stored file URL points at an image the gateway can read.
fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| SUPPORTED_IMAGE_TYPES.contains(&mime.essence_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_url() {
        assert!(is_image_url("https://blob.example/rx/abc-scan.jpg"));
        assert!(is_image_url("https://blob.example/rx/abc-scan.PNG?download=1"));
        assert!(!is_image_url("https://blob.example/rx/abc-report.pdf"));
        assert!(!is_image_url("https://blob.example/rx/abc-noext"));
        assert!(is_image_url("memory://blob/rx/abc-scan.webp"));
        assert!(is_image_url("memory://blob/rx/abc-scan.gif"));
    }

    #[test]
    fn test_unreadable_image_formats_rejected() {
        for name in ["scan.svg", "scan.heic", "scan.tiff", "scan.bmp"] {
            let url = format!("https://blob.example/rx/abc-{}", name);
            assert!(!is_image_url(&url), "{}", name);
        }
    }
}
