// src/core/verification/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::SubjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Approved,
    Rejected,
    ManualReviewQueued,
    OcrFailed,
    Expired,
    GrantSuperseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AuditActor {
    System,
    Reviewer(String),
    Sweeper,
}

/// Append-only record of a decision or lifecycle event. Never updated once
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub subject: SubjectId,
    pub grant_id: Option<Uuid>,
    pub actor: AuditActor,
    pub metadata: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(
        event_type: AuditEventType,
        request_id: Uuid,
        subject: SubjectId,
        actor: AuditActor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp,
            request_id,
            subject,
            grant_id: None,
            actor,
            metadata: None,
        }
    }

    pub fn with_grant(mut self, grant_id: Uuid) -> Self {
        self.grant_id = Some(grant_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
