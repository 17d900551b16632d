// src/utils/metrics.rs
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant};

use crate::core::verification::VerificationStatus;

/// Process-wide pipeline counters. Reset on restart.
pub struct Metrics {
    start_time: Instant,
    submissions: AtomicU64,
    approvals: AtomicU64,
    rejections: AtomicU64,
    manual_reviews: AtomicU64,
    ocr_failures: AtomicU64,
    matching_retries: AtomicU64,
    grants_expired: AtomicU64,
    pipeline_runs: AtomicU64,
    processing_time: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub submissions: u64,
    pub approvals: u64,
    pub rejections: u64,
    pub manual_reviews: u64,
    pub ocr_failures: u64,
    pub matching_retries: u64,
    pub grants_expired: u64,
    pub avg_pipeline_ms: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            submissions: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            manual_reviews: AtomicU64::new(0),
            ocr_failures: AtomicU64::new(0),
            matching_retries: AtomicU64::new(0),
            grants_expired: AtomicU64::new(0),
            pipeline_runs: AtomicU64::new(0),
            processing_time: AtomicU64::new(0),
        }
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a request reaching `status`. Non-terminal states are ignored.
    pub fn record_outcome(&self, status: VerificationStatus) {
        let counter = match status {
            VerificationStatus::Approved => &self.approvals,
            VerificationStatus::Rejected => &self.rejections,
            VerificationStatus::ManualReview => &self.manual_reviews,
            VerificationStatus::OcrFailed => &self.ocr_failures,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matching_retry(&self) {
        self.matching_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.grants_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_pipeline(&self, duration: Duration) {
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        self.processing_time
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let runs = self.pipeline_runs.load(Ordering::Relaxed);
        let total_ms = self.processing_time.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            submissions: self.submissions.load(Ordering::Relaxed),
            approvals: self.approvals.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            manual_reviews: self.manual_reviews.load(Ordering::Relaxed),
            ocr_failures: self.ocr_failures.load(Ordering::Relaxed),
            matching_retries: self.matching_retries.load(Ordering::Relaxed),
            grants_expired: self.grants_expired.load(Ordering::Relaxed),
            avg_pipeline_ms: if runs == 0 { 0 } else { total_ms / runs },
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
