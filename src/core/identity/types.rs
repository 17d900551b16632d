// src/core/identity/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an identity field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldSource {
    User,
    Ocr,
    Digilocker,
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Ocr => write!(f, "OCR"),
            Self::Digilocker => write!(f, "DIGILOCKER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A single identity value with its provenance. A `USER` field always
/// carries confidence 100; construction and deserialization both enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredField")]
pub struct IdentityField {
    value: Option<FieldValue>,
    confidence: u8,
    source: FieldSource,
}

#[derive(Deserialize)]
struct StoredField {
    value: Option<FieldValue>,
    confidence: u8,
    source: FieldSource,
}

impl TryFrom<StoredField> for IdentityField {
    type Error = String;

    fn try_from(stored: StoredField) -> Result<Self, Self::Error> {
        if stored.confidence > 100 {
            return Err(format!("confidence {} exceeds 100", stored.confidence));
        }
        if stored.source == FieldSource::User && stored.confidence != 100 {
            return Err(format!(
                "USER field must have confidence 100, found {}",
                stored.confidence
            ));
        }
        Ok(Self {
            value: stored.value,
            confidence: stored.confidence,
            source: stored.source,
        })
    }
}

impl IdentityField {
    /// A claimed value. Claims are asserted at full confidence by their author.
    pub fn claimed(value: FieldValue) -> Self {
        Self {
            value: Some(value),
            confidence: 100,
            source: FieldSource::User,
        }
    }

    pub fn extracted(value: FieldValue, confidence: u8, source: FieldSource) -> Self {
        let confidence = if source == FieldSource::User {
            100
        } else {
            confidence.min(100)
        };
        Self {
            value: Some(value),
            confidence,
            source,
        }
    }

    /// A field the provider did not find.
    pub fn absent(source: FieldSource) -> Self {
        let confidence = if source == FieldSource::User { 100 } else { 0 };
        Self {
            value: None,
            confidence,
            source,
        }
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn source(&self) -> FieldSource {
        self.source
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; textual years such as "2018" are accepted.
    pub fn as_number(&self) -> Option<i64> {
        match &self.value {
            Some(FieldValue::Number(n)) => Some(*n),
            Some(FieldValue::Text(s)) => s.trim().parse().ok(),
            None => None,
        }
    }

    pub fn display_value(&self) -> Option<String> {
        self.value.as_ref().map(|v| v.to_string())
    }
}

/// The five verifiable identity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFieldKind {
    FullName,
    Institution,
    Program,
    StartYear,
    EndYear,
}

impl IdentityFieldKind {
    pub const ALL: [IdentityFieldKind; 5] = [
        Self::FullName,
        Self::Institution,
        Self::Program,
        Self::StartYear,
        Self::EndYear,
    ];

    pub fn is_year(&self) -> bool {
        matches!(self, Self::StartYear | Self::EndYear)
    }

    /// Name and institution decide whether a record can be auto-approved.
    pub fn is_identity_critical(&self) -> bool {
        matches!(self, Self::FullName | Self::Institution)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::Institution => "institution",
            Self::Program => "program",
            Self::StartYear => "start_year",
            Self::EndYear => "end_year",
        }
    }
}

impl fmt::Display for IdentityFieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_fields_are_always_full_confidence() {
        let extracted = IdentityField::extracted(FieldValue::Number(2018), 40, FieldSource::User);
        assert_eq!(extracted.confidence(), 100);
        assert_eq!(IdentityField::absent(FieldSource::User).confidence(), 100);
        assert_eq!(IdentityField::absent(FieldSource::Ocr).confidence(), 0);
    }

    #[test]
    fn test_stored_user_field_with_low_confidence_is_refused() {
        let stored = r#"{"value":"Asha Rao","confidence":40,"source":"USER"}"#;
        assert!(serde_json::from_str::<IdentityField>(stored).is_err());

        let stored = r#"{"value":"Asha Rao","confidence":140,"source":"OCR"}"#;
        assert!(serde_json::from_str::<IdentityField>(stored).is_err());

        let stored = r#"{"value":"Asha Rao","confidence":40,"source":"OCR"}"#;
        let field: IdentityField = serde_json::from_str(stored).unwrap();
        assert_eq!(field.confidence(), 40);
        assert_eq!(field.as_text(), Some("Asha Rao"));
    }
}
