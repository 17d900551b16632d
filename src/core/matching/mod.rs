// src/core/matching/mod.rs
pub mod engine;

pub use engine::{
    FieldScore, FieldThresholds, FieldWeights, MatchOutcome, MatchingConfig, MatchingEngine,
    MatchingFault, Mismatch, MismatchReason,
};
