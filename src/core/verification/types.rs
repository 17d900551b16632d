// src/core/verification/types.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::decision::EscalationReason;
use super::state::{can_transition, InvalidTransition, TransitionTrigger, VerificationStatus};
use crate::core::document::DocumentType;
use crate::core::identity::IdentityRecord;
use crate::core::matching::Mismatch;

/// Opaque reference to the subject, as resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::Approved => VerificationStatus::Approved,
            Self::Rejected => VerificationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub decision: ReviewDecision,
    pub notes: String,
    pub reviewer: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: VerificationStatus,
    pub to: VerificationStatus,
    pub trigger: TransitionTrigger,
    pub at: DateTime<Utc>,
}

/// A subject's verification request. One request per subject; resubmission
/// restarts the same request and bumps `total_attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub subject: SubjectId,
    pub claimed: IdentityRecord,
    pub status: VerificationStatus,
    pub total_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub extracted: Option<IdentityRecord>,
    pub document_type: Option<DocumentType>,
    pub document_confidence: Option<f64>,
    pub document_fingerprint: Option<String>,
    pub match_score: Option<u8>,
    pub mismatches: Option<Vec<Mismatch>>,
    pub error_message: Option<String>,
    pub escalation: Option<EscalationReason>,
    pub review: Option<ReviewRecord>,
    pub grant_id: Option<Uuid>,
    pub history: Vec<StatusChange>,
}

impl VerificationRequest {
    pub fn new(subject: SubjectId, claimed: IdentityRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            claimed,
            status: VerificationStatus::Pending,
            total_attempts: 1,
            created_at: now,
            updated_at: now,
            extracted: None,
            document_type: None,
            document_confidence: None,
            document_fingerprint: None,
            match_score: None,
            mismatches: None,
            error_message: None,
            escalation: None,
            review: None,
            grant_id: None,
            history: Vec::new(),
        }
    }

    pub fn transition(
        &mut self,
        to: VerificationStatus,
        trigger: TransitionTrigger,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !can_transition(self.status, to, trigger) {
            return Err(InvalidTransition {
                from: self.status,
                to,
                trigger,
            });
        }
        self.history.push(StatusChange {
            from: self.status,
            to,
            trigger,
            at: now,
        });
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Starts a new attempt on this request with fresh claims. Results of the
    /// previous attempt are cleared; history and the attempt counter are kept.
    pub fn restart(
        &mut self,
        claimed: IdentityRecord,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(VerificationStatus::Pending, TransitionTrigger::Submission, now)?;
        self.claimed = claimed;
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.extracted = None;
        self.document_type = None;
        self.document_confidence = None;
        self.document_fingerprint = None;
        self.match_score = None;
        self.mismatches = None;
        self.error_message = None;
        self.escalation = None;
        self.review = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeactivationReason {
    Expired,
    Superseded,
}

/// The durable, time-bounded outcome of an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVerificationGrant {
    pub id: Uuid,
    pub subject: SubjectId,
    pub institution: String,
    pub request_id: Uuid,
    pub verified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivation_reason: Option<DeactivationReason>,
}

impl UserVerificationGrant {
    pub fn new(
        request: &VerificationRequest,
        institution: String,
        verified_at: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: request.subject.clone(),
            institution,
            request_id: request.id,
            verified_at,
            expires_at: verified_at + validity,
            is_active: true,
            deactivated_at: None,
            deactivation_reason: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn deactivate(&mut self, reason: DeactivationReason, now: DateTime<Utc>) {
        self.is_active = false;
        self.deactivated_at = Some(now);
        self.deactivation_reason = Some(reason);
    }
}

/// Stage and completion reported to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: VerificationStatus,
    pub percentage: u8,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub request_id: Uuid,
    pub subject: SubjectId,
    pub progress: Progress,
}
