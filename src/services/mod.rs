// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod blob;
pub mod catalog;
pub mod extraction;
pub mod password;
pub mod payments;
pub mod processor;
pub mod quota;

pub use blob::{BlobStore, HttpBlobStore, InMemoryBlobStore};
pub use extraction::{
    Extraction, ExtractionError, ExtractionGateway, SampleExtractionGateway, VisionLlmGateway,
};
pub use payments::{PaymentProvider, StripeCheckout};
pub use processor::{PrescriptionProcessor, Upload};
pub use quota::{QuotaLedger, QuotaStatus};
