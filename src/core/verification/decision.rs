// src/core/verification/decision.rs
use serde::{Deserialize, Serialize};

use super::state::VerificationStatus;
use crate::core::matching::MatchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalMismatchPolicy {
    /// Send the request to a reviewer.
    Escalate,
    /// Reject outright.
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub approve_threshold: u8,
    pub reject_floor: u8,
    pub max_automatic_attempts: u32,
    pub critical_mismatch_policy: CriticalMismatchPolicy,
    pub matching_retry_limit: u32,
    pub grant_validity_days: i64,
    pub reverification_warning_days: i64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 85,
            reject_floor: 50,
            max_automatic_attempts: 3,
            critical_mismatch_policy: CriticalMismatchPolicy::Escalate,
            matching_retry_limit: 2,
            grant_validity_days: 365,
            reverification_warning_days: 30,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.approve_threshold > 100 {
            return Err("decision.approve_threshold must be at most 100".into());
        }
        if self.reject_floor > self.approve_threshold {
            return Err("decision.reject_floor must not exceed decision.approve_threshold".into());
        }
        if self.max_automatic_attempts == 0 {
            return Err("decision.max_automatic_attempts must be greater than 0".into());
        }
        if self.grant_validity_days <= 0 {
            return Err("decision.grant_validity_days must be greater than 0".into());
        }
        if self.reverification_warning_days < 0
            || self.reverification_warning_days >= self.grant_validity_days
        {
            return Err(
                "decision.reverification_warning_days must be within the grant validity".into(),
            );
        }
        Ok(())
    }
}

/// Why a request landed in manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    CriticalFieldMismatch,
    AttemptLimit,
    ResidualBand,
    MatchingFault,
}

impl EscalationReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CriticalFieldMismatch => "CRITICAL_FIELD_MISMATCH",
            Self::AttemptLimit => "ATTEMPT_LIMIT",
            Self::ResidualBand => "RESIDUAL_BAND",
            Self::MatchingFault => "MATCHING_FAULT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Escalate(EscalationReason),
}

impl Decision {
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::Approve => VerificationStatus::Approved,
            Self::Reject => VerificationStatus::Rejected,
            Self::Escalate(_) => VerificationStatus::ManualReview,
        }
    }

    pub fn escalation(&self) -> Option<EscalationReason> {
        match self {
            Self::Escalate(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Maps a match outcome onto a terminal decision.
///
/// A score at or above the approval threshold approves unless a name or
/// institution mismatch is present. Past the automatic attempt limit
/// anything short of approval goes to a reviewer.
pub fn decide(config: &DecisionConfig, outcome: &MatchOutcome, attempts: u32) -> Decision {
    let critical = outcome.has_critical_mismatch();

    if outcome.score >= config.approve_threshold && !critical {
        return Decision::Approve;
    }
    if attempts > config.max_automatic_attempts {
        return Decision::Escalate(EscalationReason::AttemptLimit);
    }
    if outcome.score < config.reject_floor {
        return Decision::Reject;
    }
    if critical {
        return match config.critical_mismatch_policy {
            CriticalMismatchPolicy::Reject => Decision::Reject,
            CriticalMismatchPolicy::Escalate => {
                Decision::Escalate(EscalationReason::CriticalFieldMismatch)
            }
        };
    }
    Decision::Escalate(EscalationReason::ResidualBand)
}
