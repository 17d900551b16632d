// src/core/matching/engine.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::core::identity::{IdentityField, IdentityFieldKind, IdentityRecord};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchingFault {
    #[error("invalid matching weights: {0}")]
    InvalidWeights(String),

    #[error("non-finite similarity for {0}")]
    NonFiniteScore(IdentityFieldKind),

    #[error("matching task interrupted: {0}")]
    Interrupted(String),
}

/// Per-field contribution to the aggregate score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub name: f64,
    pub institution: f64,
    pub program: f64,
    pub start_year: f64,
    pub end_year: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: 0.35,
            institution: 0.25,
            program: 0.15,
            start_year: 0.125,
            end_year: 0.125,
        }
    }
}

impl FieldWeights {
    pub fn weight(&self, kind: IdentityFieldKind) -> f64 {
        match kind {
            IdentityFieldKind::FullName => self.name,
            IdentityFieldKind::Institution => self.institution,
            IdentityFieldKind::Program => self.program,
            IdentityFieldKind::StartYear => self.start_year,
            IdentityFieldKind::EndYear => self.end_year,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let weights = IdentityFieldKind::ALL.map(|kind| (kind, self.weight(kind)));
        for (kind, weight) in weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(format!("weight for {} must be within [0, 1]", kind));
            }
        }
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("weights must sum to 1.0, got {:.6}", sum));
        }
        Ok(())
    }
}

/// Minimum similarity below which a textual field is reported as a mismatch.
/// Years are compared exactly (within `year_tolerance`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldThresholds {
    pub name: f64,
    pub institution: f64,
    pub program: f64,
}

impl Default for FieldThresholds {
    fn default() -> Self {
        Self {
            name: 0.85,
            institution: 0.8,
            program: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub weights: FieldWeights,
    pub thresholds: FieldThresholds,
    pub year_tolerance: u16,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: FieldWeights::default(),
            thresholds: FieldThresholds::default(),
            year_tolerance: 0,
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.weights.validate()?;
        for (name, threshold) in [
            ("name", self.thresholds.name),
            ("institution", self.thresholds.institution),
            ("program", self.thresholds.program),
        ] {
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(format!("threshold for {} must be within [0, 1]", name));
            }
        }
        Ok(())
    }

    fn threshold(&self, kind: IdentityFieldKind) -> f64 {
        match kind {
            IdentityFieldKind::FullName => self.thresholds.name,
            IdentityFieldKind::Institution => self.thresholds.institution,
            IdentityFieldKind::Program => self.thresholds.program,
            IdentityFieldKind::StartYear | IdentityFieldKind::EndYear => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MismatchReason {
    NameMismatch,
    InstitutionMismatch,
    ProgramMismatch,
    YearOutOfRange,
    FieldNotFound,
}

impl MismatchReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NameMismatch => "NAME_MISMATCH",
            Self::InstitutionMismatch => "INSTITUTION_MISMATCH",
            Self::ProgramMismatch => "PROGRAM_MISMATCH",
            Self::YearOutOfRange => "YEAR_OUT_OF_RANGE",
            Self::FieldNotFound => "FIELD_NOT_FOUND",
        }
    }

    fn for_field(kind: IdentityFieldKind) -> Self {
        match kind {
            IdentityFieldKind::FullName => Self::NameMismatch,
            IdentityFieldKind::Institution => Self::InstitutionMismatch,
            IdentityFieldKind::Program => Self::ProgramMismatch,
            IdentityFieldKind::StartYear | IdentityFieldKind::EndYear => Self::YearOutOfRange,
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub field: IdentityFieldKind,
    pub user_value: Option<String>,
    pub ocr_value: Option<String>,
    pub reason: MismatchReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub field: IdentityFieldKind,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub score: u8,
    pub mismatches: Vec<Mismatch>,
    pub field_scores: Vec<FieldScore>,
}

impl MatchOutcome {
    pub fn has_critical_mismatch(&self) -> bool {
        self.mismatches.iter().any(|m| m.field.is_identity_critical())
    }
}

/// Compares a claimed record against an extracted one.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn match_records(
        &self,
        claimed: &IdentityRecord,
        extracted: &IdentityRecord,
    ) -> Result<MatchOutcome, MatchingFault> {
        self.config
            .weights
            .validate()
            .map_err(MatchingFault::InvalidWeights)?;

        let mut total = 0.0;
        let mut mismatches = Vec::new();
        let mut field_scores = Vec::with_capacity(IdentityFieldKind::ALL.len());

        for kind in IdentityFieldKind::ALL {
            let user = claimed.field(kind);
            let ocr = extracted.field(kind);
            let similarity = self.field_similarity(kind, user, ocr);
            if !similarity.is_finite() {
                return Err(MatchingFault::NonFiniteScore(kind));
            }

            total += self.config.weights.weight(kind) * similarity;
            field_scores.push(FieldScore { field: kind, similarity });

            if similarity < self.config.threshold(kind) {
                let reason = if ocr.is_present() {
                    MismatchReason::for_field(kind)
                } else {
                    MismatchReason::FieldNotFound
                };
                mismatches.push(Mismatch {
                    field: kind,
                    user_value: user.display_value(),
                    ocr_value: ocr.display_value(),
                    reason,
                });
            }
        }

        let score = (total * 100.0).round().clamp(0.0, 100.0) as u8;
        Ok(MatchOutcome {
            score,
            mismatches,
            field_scores,
        })
    }

    fn field_similarity(
        &self,
        kind: IdentityFieldKind,
        user: &IdentityField,
        ocr: &IdentityField,
    ) -> f64 {
        if kind.is_year() {
            return match (user.as_number(), ocr.as_number()) {
                (Some(a), Some(b)) if a.abs_diff(b) <= u64::from(self.config.year_tolerance) => 1.0,
                _ => 0.0,
            };
        }

        match (user.display_value(), ocr.display_value()) {
            (Some(a), Some(b)) => text_similarity(&normalize(&a), &normalize(&b)),
            _ => 0.0,
        }
    }
}

/// Case-folds, drops punctuation and collapses whitespace. Hyphens, slashes
/// and underscores separate words.
pub fn normalize(value: &str) -> String {
    let mapped: String = value
        .chars()
        .filter_map(|c| match c {
            '-' | '/' | '_' | '–' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two normalized strings in [0, 1]: the better of token-set
/// Dice overlap and character edit-distance ratio.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    token_dice(a, b).max(edit_ratio(a, b))
}

fn token_dice(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split(' ').collect();
    let right: BTreeSet<&str> = b.split(' ').collect();
    let shared = left.intersection(&right).count();
    (2 * shared) as f64 / (left.len() + right.len()) as f64
}

fn edit_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    1.0 - previous[b.len()] as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{Claims, ExtractedFields, FieldSource};

    fn claims() -> Claims {
        Claims {
            full_name: "Asha Rao".into(),
            institution: "IIT Delhi".into(),
            program: "B.Tech CSE".into(),
            start_year: 2018,
            end_year: 2022,
        }
    }

    fn extracted(name: &str, institution: &str, program: &str, start: i64, end: i64) -> IdentityRecord {
        IdentityRecord::from_extraction(
            &ExtractedFields {
                full_name: Some((name.into(), 90)),
                institution: Some((institution.into(), 90)),
                program: Some((program.into(), 90)),
                start_year: Some((start, 90)),
                end_year: Some((end, 90)),
            },
            FieldSource::Ocr,
        )
    }

    fn engine() -> MatchingEngine {
        MatchingEngine::new(MatchingConfig::default())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  B.Tech   CSE "), "btech cse");
        assert_eq!(normalize("IIT-Delhi"), "iit delhi");
        assert_eq!(normalize("ASHA  RAO."), "asha rao");
    }

    #[test]
    fn test_identical_values_score_full() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let outcome = engine()
            .match_records(&claimed, &extracted("ASHA RAO", "IIT Delhi", "B.Tech, CSE", 2018, 2022))
            .unwrap();
        assert_eq!(outcome.score, 100);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn test_institution_mismatch_is_critical() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let outcome = engine()
            .match_records(&claimed, &extracted("Asha Rao", "IIT Bombay", "B.Tech CSE", 2018, 2022))
            .unwrap();

        assert_eq!(outcome.mismatches.len(), 1);
        let mismatch = &outcome.mismatches[0];
        assert_eq!(mismatch.field, IdentityFieldKind::Institution);
        assert_eq!(mismatch.reason, MismatchReason::InstitutionMismatch);
        assert_eq!(mismatch.user_value.as_deref(), Some("IIT Delhi"));
        assert_eq!(mismatch.ocr_value.as_deref(), Some("IIT Bombay"));
        assert!(outcome.has_critical_mismatch());
        // 0.35 + 0.25 * 0.5 + 0.15 + 0.25
        assert_eq!(outcome.score, 88);
    }

    #[test]
    fn test_year_outside_tolerance() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let record = extracted("Asha Rao", "IIT Delhi", "B.Tech CSE", 2018, 2023);

        let strict = engine().match_records(&claimed, &record).unwrap();
        assert_eq!(strict.mismatches[0].reason, MismatchReason::YearOutOfRange);
        assert_eq!(strict.score, 88);
        assert!(!strict.has_critical_mismatch());

        let lenient = MatchingEngine::new(MatchingConfig {
            year_tolerance: 1,
            ..Default::default()
        })
        .match_records(&claimed, &record)
        .unwrap();
        assert!(lenient.mismatches.is_empty());
        assert_eq!(lenient.score, 100);
    }

    #[test]
    fn test_missing_fields_are_reported_as_not_found() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let empty = IdentityRecord::from_extraction(&ExtractedFields::default(), FieldSource::Ocr);
        let outcome = engine().match_records(&claimed, &empty).unwrap();

        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.mismatches.len(), 5);
        assert!(outcome
            .mismatches
            .iter()
            .all(|m| m.reason == MismatchReason::FieldNotFound && m.ocr_value.is_none()));
    }

    #[test]
    fn test_ocr_typo_gets_partial_credit() {
        let similarity = text_similarity(&normalize("Asha Rao"), &normalize("Asha Ra0"));
        assert!(similarity > 0.85 && similarity < 1.0);
        assert_eq!(text_similarity("rao asha", "asha rao"), 1.0);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let record = extracted("Asha R.", "IIT Dehli", "BTech Computer Science", 2018, 2021);
        let first = engine().match_records(&claimed, &record).unwrap();
        for _ in 0..20 {
            assert_eq!(engine().match_records(&claimed, &record).unwrap(), first);
        }
    }

    #[test]
    fn test_invalid_weights_fault() {
        let mut config = MatchingConfig::default();
        config.weights.program = 0.5;
        let claimed = IdentityRecord::from_user_claims(&claims());
        let result = MatchingEngine::new(config).match_records(&claimed, &claimed);
        assert!(matches!(result, Err(MatchingFault::InvalidWeights(_))));
    }
}
