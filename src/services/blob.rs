// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Blob storage for uploaded prescription images.

use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

/// Stores bytes and returns a publicly fetchable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, AppError>;
}

/// Build a unique storage path for an upload: `rx/{uuid}-{filename}`.
///
/// The filename is reduced to a safe character set. If it carries no
/// extension, one is derived from the content type so the stored URL
/// still identifies the format.
pub fn upload_path(filename: &str, content_type: &str) -> String {
    let mut name: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    name = name.trim_matches(|c| c == '.' || c == '-').to_string();
    if name.is_empty() {
        name = "upload".to_string();
    }

    let has_extension = std::path::Path::new(&name).extension().is_some();
    if !has_extension {
        if let Some(ext) = mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
        {
            name = format!("{}.{}", name, ext);
        }
    }

    format!("rx/{}-{}", uuid::Uuid::new_v4(), name)
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    url: String,
}

/// Vercel-Blob-style HTTP blob store.
#[derive(Clone)]
pub struct HttpBlobStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header("x-api-version", "7")
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!("HTTP {}: {}", status, body)));
        }

        let parsed: PutResponse = response
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("JSON parse error: {}", e)))?;

        tracing::debug!(path, url = %parsed.url, "Blob stored");
        Ok(parsed.url)
    }
}

/// Blob store kept in process memory (development and tests).
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, (Vec<u8>, String)>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type for a URL returned by `put`.
    pub fn get(&self, url: &str) -> Option<(Vec<u8>, String)> {
        self.blobs.get(url).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = format!("memory://blob/{}", path);
        self.blobs
            .insert(url.clone(), (bytes, content_type.to_string()));
        Ok(url)
    }
}
