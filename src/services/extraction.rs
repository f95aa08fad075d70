// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Extraction gateway: prescription image to structured medication items.
//!
//! The production gateway calls an OpenAI-compatible vision model. A
//! sample gateway with canned output is used when no API key is set.

use crate::models::MedicationItem;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "\
You are an expert medical scribe trained to decipher messy handwritten prescriptions.
Extract and normalize every medicine, even if the handwriting is unclear.

Rules:
- Output only a JSON object of the form {\"items\": [...], \"overallConfidence\": number}.
- Each item has rawName (closest to the handwriting, required) and optional genericName, \
brandName, strength, form, route, frequency, duration, notes, confidence (0 to 1).
- Expand shorthand: tab=tablet, cap=capsule, syp=syrup, inj=injection, amp=ampoule, \
OD=once daily, BD=BID=twice daily, TID=3/day, QID=4/day, HS=at bedtime, SOS/PRN=as needed.
- Infer strength, form, frequency and duration when hinted.
- Use confidence 0.5 to 0.9 for guesses and above 0.9 only when certain.
- Prefer common India-available generics and brands.";

const FIRST_ATTEMPT_PROMPT: &str =
    "Return only JSON for this prescription. If uncertain, output your best safe guess.";

const RETRY_PROMPT: &str = "You must NOT return an empty items array. Output your BEST SAFE GUESS. \
Return only JSON with an items array and overallConfidence.";

const QUERY_SYSTEM_PROMPT: &str = "You create concise e-pharmacy search queries.";

/// Item confidence assumed when the model omits it.
const DEFAULT_ITEM_CONFIDENCE: f64 = 0.7;
/// Bounds for a derived overall confidence.
const DERIVED_CONFIDENCE_RANGE: (f64, f64) = (0.4, 0.95);

/// Model requests one `extract` call may make: the first attempt plus one retry.
pub const MAX_EXTRACTION_ATTEMPTS: u32 = 2;

/// Structured result of reading one prescription image.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub items: Vec<MedicationItem>,
    pub overall_confidence: Option<f64>,
}

/// Extraction failures, all fatal to the current processing attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction request failed: {0}")]
    Http(String),

    #[error("extraction service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed extraction response: {0}")]
    Malformed(String),
}

/// Reads prescription images and suggests catalog queries.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Extract medication items from a publicly fetchable image URL.
    ///
    /// Zero items is a valid result.
    async fn extract(&self, image_url: &str) -> Result<Extraction, ExtractionError>;

    /// Suggest a single-line shopping query for an item, if one can be found.
    async fn suggest_query(
        &self,
        item: &MedicationItem,
    ) -> Result<Option<String>, ExtractionError>;
}

/// Loose shape of the model's JSON output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    items: Vec<MedicationItem>,
    #[serde(default)]
    overall_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse and check model output.
///
/// Items are normalized, `buyUrl` from the model is discarded, and a
/// missing overall confidence is derived from the item confidences.
pub(crate) fn parse_extraction(content: &str) -> Result<Extraction, ExtractionError> {
    let raw: RawExtraction = serde_json::from_str(content)
        .map_err(|e| ExtractionError::Malformed(format!("invalid JSON: {}", e)))?;

    let items: Vec<MedicationItem> = raw
        .items
        .into_iter()
        .map(|item| MedicationItem {
            buy_url: None,
            ..item.normalized()
        })
        .collect();

    let issues: Vec<String> = items
        .iter()
        .enumerate()
        .flat_map(|(index, item)| item.issues(&format!("items[{}].", index)))
        .collect();
    if !issues.is_empty() {
        return Err(ExtractionError::Malformed(issues.join("; ")));
    }

    let overall_confidence = match raw.overall_confidence {
        Some(c) if !(0.0..=1.0).contains(&c) => {
            return Err(ExtractionError::Malformed(format!(
                "overallConfidence {} out of range",
                c
            )));
        }
        Some(c) => Some(c),
        None => derive_overall_confidence(&items),
    };

    Ok(Extraction {
        items,
        overall_confidence,
    })
}

/// Mean item confidence clamped to a conservative range; `None` with no items.
fn derive_overall_confidence(items: &[MedicationItem]) -> Option<f64> {
    if items.is_empty() {
        return None;
    }

    let sum: f64 = items
        .iter()
        .map(|i| i.confidence.unwrap_or(DEFAULT_ITEM_CONFIDENCE))
        .sum();
    let (low, high) = DERIVED_CONFIDENCE_RANGE;
    Some((sum / items.len() as f64).clamp(low, high))
}

/// OpenAI-compatible vision model client.
#[derive(Clone)]
pub struct VisionLlmGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    attempt_timeout: Duration,
}

impl VisionLlmGateway {
    /// `attempt_timeout` bounds each model request, so the retry gets a full budget.
    pub fn new(base_url: &str, api_key: &str, model: &str, attempt_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            attempt_timeout,
        }
    }

    fn request_error(&self, e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            ExtractionError::Timeout(self.attempt_timeout)
        } else {
            ExtractionError::Http(e.to_string())
        }
    }

    /// POST a chat completion and return the first choice's content.
    async fn complete(&self, body: serde_json::Value) -> Result<String, ExtractionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.attempt_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ExtractionError::Timeout(self.attempt_timeout)
            } else {
                ExtractionError::Malformed(format!("invalid completion body: {}", e))
            }
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn extract_attempt(
        &self,
        image_url: &str,
        instruction: &str,
    ) -> Result<Extraction, ExtractionError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": instruction },
                        { "type": "image_url", "image_url": { "url": image_url } }
                    ]
                }
            ]
        });

        let content = self.complete(body).await?;
        parse_extraction(&content)
    }
}

#[async_trait]
impl ExtractionGateway for VisionLlmGateway {
    /// One attempt, then a single retry with a more directive prompt if the
    /// output was malformed or had no items. Transport errors are not retried.
    async fn extract(&self, image_url: &str) -> Result<Extraction, ExtractionError> {
        match self.extract_attempt(image_url, FIRST_ATTEMPT_PROMPT).await {
            Ok(extraction) if !extraction.items.is_empty() => Ok(extraction),
            Ok(_) => {
                tracing::info!("Extraction returned no items, retrying with directive prompt");
                self.extract_attempt(image_url, RETRY_PROMPT).await
            }
            Err(ExtractionError::Malformed(reason)) => {
                tracing::warn!(reason = %reason, "Malformed extraction, retrying once");
                self.extract_attempt(image_url, RETRY_PROMPT).await
            }
            Err(e) => Err(e),
        }
    }

    async fn suggest_query(
        &self,
        item: &MedicationItem,
    ) -> Result<Option<String>, ExtractionError> {
        let item_json = json!({
            "rawName": item.raw_name,
            "genericName": item.generic_name,
            "brandName": item.brand_name,
            "strength": item.strength,
            "form": item.form,
        });

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": QUERY_SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Given this parsed medicine JSON, output a SINGLE short query for shopping \
                         (no quotes, no extra words). Prefer generic + strength + form; else best brand.\n{}",
                        item_json
                    )
                }
            ]
        });

        let content = self.complete(body).await?;
        let query = crate::services::catalog::clean(&content);
        Ok(if query.is_empty() { None } else { Some(query) })
    }
}

/// Deterministic gateway for development without a model API key.
#[derive(Debug, Clone, Default)]
pub struct SampleExtractionGateway;

impl SampleExtractionGateway {
    fn sample_items() -> Vec<MedicationItem> {
        vec![
            MedicationItem {
                raw_name: "Augmentin 625".to_string(),
                generic_name: Some("Amoxicillin + Clavulanate".to_string()),
                brand_name: Some("Augmentin".to_string()),
                strength: Some("625 mg".to_string()),
                form: Some("tablet".to_string()),
                route: Some("oral".to_string()),
                frequency: Some("BID".to_string()),
                duration: Some("5 days".to_string()),
                notes: Some("After food".to_string()),
                confidence: Some(0.86),
                buy_url: None,
            },
            MedicationItem {
                raw_name: "Crocin 500".to_string(),
                generic_name: Some("Paracetamol".to_string()),
                brand_name: Some("Crocin".to_string()),
                strength: Some("500 mg".to_string()),
                form: Some("tablet".to_string()),
                route: Some("oral".to_string()),
                frequency: Some("TID".to_string()),
                duration: Some("3 days".to_string()),
                notes: Some("If fever > 100°F".to_string()),
                confidence: Some(0.9),
                buy_url: None,
            },
        ]
    }
}

#[async_trait]
impl ExtractionGateway for SampleExtractionGateway {
    async fn extract(&self, image_url: &str) -> Result<Extraction, ExtractionError> {
        tracing::debug!(image_url, "Returning sample extraction");
        Ok(Extraction {
            items: Self::sample_items(),
            overall_confidence: Some(0.85),
        })
    }

    async fn suggest_query(
        &self,
        _item: &MedicationItem,
    ) -> Result<Option<String>, ExtractionError> {
        Ok(None)
    }
}
