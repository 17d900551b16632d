// src/api/types.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{
    identity::Claims,
    verification::{ReviewDecision, VerificationStatus},
};

/// An uploaded document, by the name the upload layer stored it under.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRef {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub claims: Claims,
    pub document: DocumentRef,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: Uuid,
    pub status: VerificationStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub request_id: Uuid,
    pub status: VerificationStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReverificationQuery {
    pub institution: String,
}

#[derive(Debug, Serialize)]
pub struct ReverificationResponse {
    pub institution: String,
    pub needs_reverification: bool,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub deactivated: usize,
}
