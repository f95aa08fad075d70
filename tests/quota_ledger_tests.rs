// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Quota ledger behavior under sequential and concurrent use.

mod common;

use axum::http::{Method, StatusCode};
use rx_reader::db::MemoryDb;
use rx_reader::services::QuotaLedger;
use std::sync::Arc;

fn ledger() -> QuotaLedger {
    QuotaLedger::new(Arc::new(MemoryDb::new()))
}

#[tokio::test]
async fn test_new_identity_gets_free_allowance() {
    let quota = ledger();
    let status = quota.get_status("new-user").await.unwrap();

    assert_eq!(status.free_remaining, 2);
    assert_eq!(status.paid_remaining, 0);
    assert_eq!(status.total_remaining, 2);
    assert!(status.can_upload);
}

#[tokio::test]
async fn test_free_allowance_drawn_before_paid() {
    let quota = ledger();
    quota.add_paid("u1", None, 5, None).await.unwrap();

    let first = quota.consume("u1", None).await.unwrap();
    assert!(first.success && first.used_free);
    let second = quota.consume("u1", None).await.unwrap();
    assert!(second.success && second.used_free);

    let status = quota.get_status("u1").await.unwrap();
    assert_eq!((status.free_remaining, status.paid_remaining), (0, 5));

    let third = quota.consume("u1", None).await.unwrap();
    assert!(third.success);
    assert!(!third.used_free);
    assert_eq!(third.remaining_total, 4);

    let status = quota.get_status("u1").await.unwrap();
    assert_eq!((status.free_remaining, status.paid_remaining), (0, 4));
}

#[tokio::test]
async fn test_consume_at_zero_fails_without_change() {
    let quota = ledger();
    quota.consume("u1", None).await.unwrap();
    quota.consume("u1", None).await.unwrap();

    let result = quota.consume("u1", None).await.unwrap();
    assert!(!result.success);
    assert!(!result.used_free);
    assert_eq!(result.remaining_total, 0);

    let status = quota.get_status("u1").await.unwrap();
    assert_eq!(status.total_remaining, 0);
    assert!(!status.can_upload);
}

#[tokio::test]
async fn test_add_paid_is_idempotent_per_event() {
    let quota = ledger();

    let first = quota.add_paid("u1", None, 20, Some("evt_1")).await.unwrap();
    assert!(!first.duplicate);
    assert_eq!(first.status.paid_remaining, 20);
    assert_eq!(first.status.total_remaining, 22);

    let replay = quota.add_paid("u1", None, 20, Some("evt_1")).await.unwrap();
    assert!(replay.duplicate);
    assert_eq!(replay.status.paid_remaining, 20);

    let second = quota.add_paid("u1", None, 20, Some("evt_2")).await.unwrap();
    assert!(!second.duplicate);
    assert_eq!(second.status.paid_remaining, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumes_never_overdraw() {
    let quota = ledger();
    quota.add_paid("u1", None, 3, None).await.unwrap();
    // 2 free + 3 paid
    let available = 5;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let quota = quota.clone();
            tokio::spawn(async move { quota.consume("u1", None).await.unwrap() })
        })
        .collect();

    let mut succeeded = 0;
    let mut used_free = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.success {
            succeeded += 1;
            if result.used_free {
                used_free += 1;
            }
        }
    }

    assert_eq!(succeeded, available);
    assert_eq!(used_free, 2);
    assert_eq!(quota.get_status("u1").await.unwrap().total_remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_create_one_record_per_unit() {
    let app = common::create_test_app();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let router = app.router.clone();
            let token = app.token("racer");
            tokio::spawn(async move {
                let request = common::multipart_request(
                    "/upload",
                    Some(&token),
                    "rx.jpg",
                    "image/jpeg",
                    b"image bytes",
                );
                tower::ServiceExt::oneshot(router, request)
                    .await
                    .unwrap()
                    .status()
            })
        })
        .collect();

    let mut ok = 0;
    let mut payment_required = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::PAYMENT_REQUIRED => payment_required += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(ok, 2);
    assert_eq!(payment_required, 4);

    let (_, list) = app.call(Method::GET, "/prescriptions", "racer", None).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(app.blobs.len(), 2);
}

#[tokio::test]
async fn test_quota_endpoint_reports_balance() {
    let app = common::create_test_app();
    app.upload("u1").await;

    let (status, body) = app.call(Method::GET, "/quota", "u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["freeRemaining"], 1);
    assert_eq!(body["paidRemaining"], 0);
    assert_eq!(body["totalRemaining"], 1);
    assert_eq!(body["canUpload"], true);
}
