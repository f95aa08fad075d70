// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rx_reader::config::Config;
use rx_reader::db::{FirestoreDb, MemoryDb};
use rx_reader::error::AppError;
use rx_reader::models::MedicationItem;
use rx_reader::routes::create_router;
use rx_reader::services::{
    Extraction, ExtractionError, ExtractionGateway, InMemoryBlobStore, PaymentProvider,
};
use rx_reader::{AppState, Backends};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique ID for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

// ─── Scripted collaborators ──────────────────────────────────

/// What the scripted gateway does on `extract`.
#[allow(dead_code)]
#[derive(Clone)]
pub enum GatewayBehavior {
    Items(Vec<MedicationItem>, Option<f64>),
    Fail(String),
    /// Never answers; the caller's timeout must fire
    Hang,
}

/// Extraction gateway with scripted responses and call counters.
pub struct ScriptedGateway {
    behavior: Mutex<GatewayBehavior>,
    suggestion: Mutex<Option<String>>,
    pub extract_calls: AtomicUsize,
    pub suggest_calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedGateway {
    pub fn new(behavior: GatewayBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            suggestion: Mutex::new(None),
            extract_calls: AtomicUsize::new(0),
            suggest_calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, behavior: GatewayBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_suggestion(&self, suggestion: Option<&str>) {
        *self.suggestion.lock().unwrap() = suggestion.map(str::to_string);
    }

    pub fn extract_count(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionGateway for ScriptedGateway {
    async fn extract(&self, _image_url: &str) -> Result<Extraction, ExtractionError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();

        match behavior {
            GatewayBehavior::Items(items, overall_confidence) => Ok(Extraction {
                items,
                overall_confidence,
            }),
            GatewayBehavior::Fail(msg) => Err(ExtractionError::Http(msg)),
            GatewayBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExtractionError::Http("unreachable".to_string()))
            }
        }
    }

    async fn suggest_query(
        &self,
        _item: &MedicationItem,
    ) -> Result<Option<String>, ExtractionError> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.suggestion.lock().unwrap().clone())
    }
}

/// Payment provider that records sessions instead of calling out.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakePayments {
    pub sessions: Mutex<Vec<(String, String, u32)>>,
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        credits: u32,
    ) -> Result<String, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push((user_id.to_string(), email.to_string(), credits));
        Ok(format!("cs_test_{}", sessions.len()))
    }
}

// ─── Test app ────────────────────────────────────────────────

/// Two well-formed items, as a vision model would return them.
#[allow(dead_code)]
pub fn sample_items() -> Vec<MedicationItem> {
    vec![
        MedicationItem {
            raw_name: "Crocin 500".to_string(),
            generic_name: Some("Paracetamol".to_string()),
            strength: Some("500 mg".to_string()),
            form: Some("tablet".to_string()),
            confidence: Some(0.9),
            ..Default::default()
        },
        MedicationItem {
            raw_name: "Augmentin 625".to_string(),
            brand_name: Some("Augmentin".to_string()),
            strength: Some("625 mg".to_string()),
            confidence: Some(0.8),
            ..Default::default()
        },
    ]
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub payments: Arc<FakePayments>,
}

/// Create a test app over in-memory stores and scripted collaborators.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let db = Arc::new(MemoryDb::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let gateway = Arc::new(ScriptedGateway::new(GatewayBehavior::Items(
        sample_items(),
        Some(0.85),
    )));
    let payments = Arc::new(FakePayments::default());

    let state = Arc::new(AppState::new(
        config,
        Backends {
            accounts: db.clone(),
            prescriptions: db.clone(),
            users: db.clone(),
            blobs: blobs.clone(),
            gateway: gateway.clone(),
            payments: payments.clone(),
        },
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        blobs,
        gateway,
        payments,
    }
}

// ─── Requests ────────────────────────────────────────────────

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        email: String,
        name: Option<String>,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        name: None,
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

impl TestApp {
    /// Session token for `user_id`.
    #[allow(dead_code)]
    pub fn token(&self, user_id: &str) -> String {
        create_test_jwt(user_id, &self.state.config.jwt_signing_key)
    }

    /// Send a request and decode the JSON body (Null when empty).
    #[allow(dead_code)]
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Authenticated JSON request as `user_id`.
    #[allow(dead_code)]
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user_id: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)));

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    /// Upload a file as `user_id`.
    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        user_id: &str,
        filename: &str,
        content_type: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = multipart_request(
            "/upload",
            Some(&self.token(user_id)),
            filename,
            content_type,
            b"\x89PNG fake image bytes",
        );
        self.send(request).await
    }

    /// Upload an image as `user_id` and return the new prescription ID.
    #[allow(dead_code)]
    pub async fn upload(&self, user_id: &str) -> String {
        let (status, body) = self.upload_file(user_id, "rx.jpg", "image/jpeg").await;
        assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
        body["prescriptionId"].as_str().unwrap().to_string()
    }
}

/// Build a multipart upload with a single `file` field.
#[allow(dead_code)]
pub fn multipart_request(
    uri: &str,
    token: Option<&str>,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let boundary = "rxreaderboundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}
