//! Document type classification over extracted raw text.
//!
//! Pattern groups are checked in declaration order and the first group with
//! any matching pattern wins. The order is a priority: a text that looks like
//! both a degree certificate and a transcript is a degree certificate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    DegreeCertificate,
    Transcript,
    ProvisionalCertificate,
    Unknown,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DegreeCertificate => "DEGREE_CERTIFICATE",
            Self::Transcript => "TRANSCRIPT",
            Self::ProvisionalCertificate => "PROVISIONAL_CERTIFICATE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

struct PatternGroup {
    doc_type: DocumentType,
    patterns: Vec<Regex>,
}

impl PatternGroup {
    fn new(doc_type: DocumentType, patterns: &[&str]) -> Self {
        Self {
            doc_type,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("invalid document pattern"))
                .collect(),
        }
    }

    fn match_count(&self, text: &str) -> usize {
        self.patterns.iter().filter(|p| p.is_match(text)).count()
    }
}

static PATTERN_GROUPS: LazyLock<Vec<PatternGroup>> = LazyLock::new(|| {
    vec![
        PatternGroup::new(
            DocumentType::DegreeCertificate,
            &[
                r"(?i)degree\s+certificate",
                r"(?i)conferred\s+(upon|the\s+degree)",
                r"(?i)has\s+been\s+(awarded|admitted\s+to)\s+the\s+degree",
                r"(?i)in\s+testimony\s+whereof",
            ],
        ),
        PatternGroup::new(
            DocumentType::Transcript,
            &[
                r"(?i)\btranscript\b",
                r"(?i)(grade|mark|marks)\s+(card|sheet|statement)",
                r"(?i)\b[cs]?gpa\b",
                r"(?i)\bsemester\b",
            ],
        ),
        PatternGroup::new(
            DocumentType::ProvisionalCertificate,
            &[
                r"(?i)\bprovisional\b",
                r"(?i)provisional\s+(degree\s+)?certificate",
                r"(?i)(has\s+)?(passed|qualified|completed)\s+(the|all)\s+(examination|requirements)",
                r"(?i)(original\s+)?degree\s+(will|shall)\s+be\s+(awarded|issued|conferred)",
            ],
        ),
    ]
});

/// Stateless classifier; all methods are pure functions of the input text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentClassifier;

impl DocumentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, raw_text: &str) -> DocumentType {
        PATTERN_GROUPS
            .iter()
            .find(|group| group.patterns.iter().any(|p| p.is_match(raw_text)))
            .map(|group| group.doc_type)
            .unwrap_or(DocumentType::Unknown)
    }

    /// `0.1` for unknown documents, otherwise `min(0.9, 0.3 + 0.2 * matches)`
    /// where `matches` counts the patterns of `doc_type`'s group that hit.
    pub fn confidence(&self, raw_text: &str, doc_type: DocumentType) -> f64 {
        let group = match PATTERN_GROUPS.iter().find(|g| g.doc_type == doc_type) {
            Some(group) => group,
            None => return 0.1,
        };
        let matches = group.match_count(raw_text);
        (0.3 + 0.2 * matches as f64).min(0.9)
    }
}
