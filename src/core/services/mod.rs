// src/core/services/mod.rs
pub mod health;
pub mod sweeper;
pub mod verification;

pub use health::{HealthReport, HealthService};
pub use sweeper::ExpirySweeper;
pub use verification::{RequestStatus, ReviewQueueEntry, VerificationService};
