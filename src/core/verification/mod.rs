// src/core/verification/mod.rs
pub mod audit;
pub mod decision;
pub mod state;
pub mod types;

pub use audit::{AuditActor, AuditEventType, AuditRecord};
pub use decision::{decide, CriticalMismatchPolicy, Decision, DecisionConfig, EscalationReason};
pub use state::{can_transition, InvalidTransition, TransitionTrigger, VerificationStatus};
pub use types::{
    DeactivationReason, Progress, ProgressEvent, ReviewDecision, ReviewRecord, StatusChange,
    SubjectId, UserVerificationGrant, VerificationRequest,
};
