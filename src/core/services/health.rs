// src/core/services/health.rs
use serde::Serialize;
use std::sync::Arc;

use crate::{
    core::ocr::OcrExtractor,
    storage::EncryptedStore,
    utils::metrics::{Metrics, MetricsSnapshot},
};

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub ocr_available: bool,
    pub storage_writable: bool,
    pub metrics: MetricsSnapshot,
}

pub struct HealthService {
    store: Arc<EncryptedStore>,
    extractor: Arc<dyn OcrExtractor>,
    metrics: Arc<Metrics>,
}

impl HealthService {
    pub fn new(
        store: Arc<EncryptedStore>,
        extractor: Arc<dyn OcrExtractor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            extractor,
            metrics,
        }
    }

    /// `degraded` when OCR is down; submissions still land as `OCR_FAILED`.
    pub async fn report(&self) -> HealthReport {
        let ocr_available = self.extractor.is_available().await;
        let storage_writable = self.store.is_writable();

        let status = match (storage_writable, ocr_available) {
            (false, _) => "unhealthy",
            (true, false) => "degraded",
            (true, true) => "ok",
        };

        HealthReport {
            status,
            ocr_available,
            storage_writable,
            metrics: self.metrics.snapshot(),
        }
    }
}
