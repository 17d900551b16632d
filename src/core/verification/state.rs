//! Verification request lifecycle.
//!
//! ```text
//! PENDING -> PROCESSING_OCR -> MATCHING -> APPROVED | REJECTED | MANUAL_REVIEW
//!                          \-> OCR_FAILED
//! MANUAL_REVIEW -> APPROVED | REJECTED      (reviewer only)
//! APPROVED -> EXPIRED                       (sweeper only)
//! REJECTED | OCR_FAILED | EXPIRED -> PENDING (resubmission)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    ProcessingOcr,
    Matching,
    Approved,
    Rejected,
    ManualReview,
    OcrFailed,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::ProcessingOcr => "PROCESSING_OCR",
            Self::Matching => "MATCHING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::OcrFailed => "OCR_FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// The automatic pipeline owns the request in these states.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::ProcessingOcr | Self::Matching)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }

    /// States from which a fresh submission may restart the cycle.
    pub fn allows_resubmission(&self) -> bool {
        matches!(self, Self::Rejected | Self::OcrFailed | Self::Expired)
    }

    /// Progress reported to polling clients for this stage.
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::ProcessingOcr => 25,
            Self::Matching => 75,
            _ => 100,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is driving a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Submission,
    Pipeline,
    Reviewer,
    Sweeper,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot move from {from} to {to} via {trigger:?}")]
pub struct InvalidTransition {
    pub from: VerificationStatus,
    pub to: VerificationStatus,
    pub trigger: TransitionTrigger,
}

pub fn can_transition(
    from: VerificationStatus,
    to: VerificationStatus,
    trigger: TransitionTrigger,
) -> bool {
    use TransitionTrigger as T;
    use VerificationStatus as S;

    match (from, to, trigger) {
        (S::Pending, S::ProcessingOcr, T::Pipeline) => true,
        (S::ProcessingOcr, S::Matching | S::OcrFailed, T::Pipeline) => true,
        (S::Matching, S::Approved | S::Rejected | S::ManualReview, T::Pipeline) => true,
        (S::ManualReview, S::Approved | S::Rejected, T::Reviewer) => true,
        (S::Approved, S::Expired, T::Sweeper) => true,
        (from, S::Pending, T::Submission) => from.allows_resubmission() || from == S::Approved,
        _ => false,
    }
}
