// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prescription record and medication item models for storage and API.

use crate::error::collect_issues;
use crate::time_utils::rfc3339_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Processing state of a prescription record.
///
/// `Uploaded` and `Processing` are transient. `NeedsReview` and `Failed`
/// may re-enter `Processing` when the owner retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RxStatus {
    Uploaded,
    Processing,
    Ready,
    NeedsReview,
    Failed,
}

impl RxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RxStatus::Uploaded => "UPLOADED",
            RxStatus::Processing => "PROCESSING",
            RxStatus::Ready => "READY",
            RxStatus::NeedsReview => "NEEDS_REVIEW",
            RxStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One medication line extracted from (or typed onto) a prescription.
///
/// Only `raw_name` is required. Every other field is best-effort and
/// `None` means "unknown"; empty strings are normalized to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct MedicationItem {
    /// Closest transcription of what was written
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub raw_name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0, message = "must be between 0 and 1"))]
    pub confidence: Option<f64>,
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub buy_url: Option<String>,
}

impl MedicationItem {
    /// Create an item with only the raw transcription set.
    pub fn new(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            ..Default::default()
        }
    }

    /// Trim free-text fields and map blank values to `None`.
    pub fn normalized(self) -> Self {
        Self {
            raw_name: self.raw_name.trim().to_string(),
            generic_name: blank_to_none(self.generic_name),
            brand_name: blank_to_none(self.brand_name),
            strength: blank_to_none(self.strength),
            form: blank_to_none(self.form),
            route: blank_to_none(self.route),
            frequency: blank_to_none(self.frequency),
            duration: blank_to_none(self.duration),
            notes: blank_to_none(self.notes),
            confidence: self.confidence,
            buy_url: blank_to_none(self.buy_url),
        }
    }

    /// Validate against the item schema, reporting issues under `prefix`.
    pub fn issues(&self, prefix: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if let Err(errors) = self.validate() {
            collect_issues(prefix, &errors, &mut issues);
        }
        issues.sort();
        issues
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stored prescription record in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRecord {
    /// Record ID (also used as document ID)
    pub id: String,
    /// Owning user ID; every read and write is scoped by it
    pub owner_id: String,
    /// Public URL of the uploaded image
    pub file_url: String,
    pub status: RxStatus,
    #[serde(default)]
    pub items: Vec<MedicationItem>,
    #[serde(default)]
    pub overall_confidence: Option<f64>,
    #[serde(with = "rfc3339_millis")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(with = "rfc3339_millis")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

impl PrescriptionRecord {
    /// Create a freshly uploaded record with a new random ID.
    pub fn new(owner_id: &str, file_url: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            file_url: file_url.to_string(),
            status: RxStatus::Uploaded,
            items: Vec::new(),
            overall_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place and refresh `updated_at`.
    ///
    /// `id`, `owner_id`, `file_url` and `created_at` are never touched.
    pub fn apply(&mut self, update: &RecordUpdate, now: DateTime<Utc>) {
        if let Some(items) = &update.items {
            self.items = items.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(confidence) = update.overall_confidence {
            self.overall_confidence = confidence;
        }
        self.updated_at = now;
    }
}

/// Explicit partial update of a prescription record.
///
/// Each field is independently optional; `overall_confidence` distinguishes
/// "leave unchanged" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordUpdate {
    #[serde(default)]
    pub items: Option<Vec<MedicationItem>>,
    #[serde(default)]
    pub status: Option<RxStatus>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub overall_confidence: Option<Option<f64>>,
}

/// Map a present JSON field (including `null`) to `Some`.
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl RecordUpdate {
    /// Update that only changes the status.
    pub fn status(status: RxStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Normalize every item in the update.
    pub fn normalized(self) -> Self {
        Self {
            items: self
                .items
                .map(|items| items.into_iter().map(MedicationItem::normalized).collect()),
            ..self
        }
    }

    /// Validate all fields, returning every offending path.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if let Some(items) = &self.items {
            for (index, item) in items.iter().enumerate() {
                issues.extend(item.issues(&format!("items[{}].", index)));
            }
        }

        if let Some(Some(confidence)) = self.overall_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                issues.push("overallConfidence: must be between 0 and 1".to_string());
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_maps_blank_fields_to_none() {
        let item = MedicationItem {
            raw_name: "  Crocin 500 ".to_string(),
            generic_name: Some("".to_string()),
            strength: Some(" 500 mg ".to_string()),
            buy_url: Some("".to_string()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(item.raw_name, "Crocin 500");
        assert_eq!(item.generic_name, None);
        assert_eq!(item.strength.as_deref(), Some("500 mg"));
        assert_eq!(item.buy_url, None);
    }

    #[test]
    fn test_missing_raw_name_is_reported() {
        let update: RecordUpdate =
            serde_json::from_str(r#"{"items": [{"rawName": "Dolo"}, {"genericName": "Paracetamol"}]}"#)
                .unwrap();

        let issues = update.normalized().validate().unwrap_err();
        assert_eq!(issues, vec!["items[1].rawName: is required".to_string()]);
    }

    #[test]
    fn test_invalid_buy_url_and_confidence_are_reported() {
        let update: RecordUpdate = serde_json::from_str(
            r#"{"items": [{"rawName": "Dolo", "buyUrl": "not a url", "confidence": 1.5}],
                "overallConfidence": -0.1}"#,
        )
        .unwrap();

        let issues = update.normalized().validate().unwrap_err();
        assert!(issues.contains(&"items[0].buyUrl: must be a valid URL".to_string()));
        assert!(issues.contains(&"items[0].confidence: must be between 0 and 1".to_string()));
        assert!(issues.contains(&"overallConfidence: must be between 0 and 1".to_string()));
    }

    #[test]
    fn test_empty_buy_url_is_accepted_as_absent() {
        let update: RecordUpdate =
            serde_json::from_str(r#"{"items": [{"rawName": "Dolo", "buyUrl": ""}]}"#).unwrap();
        let update = update.normalized();

        assert!(update.validate().is_ok());
        assert_eq!(update.items.unwrap()[0].buy_url, None);
    }

    #[test]
    fn test_overall_confidence_null_vs_absent() {
        let cleared: RecordUpdate = serde_json::from_str(r#"{"overallConfidence": null}"#).unwrap();
        assert_eq!(cleared.overall_confidence, Some(None));

        let untouched: RecordUpdate = serde_json::from_str(r#"{"status": "READY"}"#).unwrap();
        assert_eq!(untouched.overall_confidence, None);
        assert_eq!(untouched.status, Some(RxStatus::Ready));
    }

    #[test]
    fn test_apply_keeps_identity_fields() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let mut record = PrescriptionRecord::new("user-a", "https://blob/rx/a.jpg", created);
        let original_id = record.id.clone();

        record.apply(
            &RecordUpdate {
                items: Some(vec![MedicationItem::new("Crocin")]),
                status: Some(RxStatus::Ready),
                overall_confidence: Some(Some(0.8)),
            },
            later,
        );

        assert_eq!(record.id, original_id);
        assert_eq!(record.owner_id, "user-a");
        assert_eq!(record.status, RxStatus::Ready);
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.overall_confidence, Some(0.8));
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&RxStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"NEEDS_REVIEW\"");
    }
}
