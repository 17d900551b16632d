// src/core/identity/record.rs
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::types::{FieldSource, FieldValue, IdentityField, IdentityFieldKind};

/// Identity as asserted by the subject at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub full_name: String,
    pub institution: String,
    pub program: String,
    pub start_year: i32,
    pub end_year: i32,
}

impl Claims {
    /// Rejects incomplete or implausible claims before any record is built.
    pub fn validate(&self) -> Result<(), String> {
        let text_fields = [
            ("full_name", &self.full_name),
            ("institution", &self.institution),
            ("program", &self.program),
        ];
        for (name, value) in text_fields {
            if value.trim().is_empty() {
                return Err(format!("{} is required", name));
            }
            if value.chars().count() > 256 {
                return Err(format!("{} is too long", name));
            }
        }

        let latest = Utc::now().year() + 10;
        for (name, year) in [("start_year", self.start_year), ("end_year", self.end_year)] {
            if !(1900..=latest).contains(&year) {
                return Err(format!("{} must be between 1900 and {}", name, latest));
            }
        }
        if self.start_year > self.end_year {
            return Err("start_year must not be after end_year".to_string());
        }

        Ok(())
    }
}

/// Fields produced by the structured-field parser. `None` means the field was
/// not found in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub full_name: Option<(String, u8)>,
    pub institution: Option<(String, u8)>,
    pub program: Option<(String, u8)>,
    pub start_year: Option<(i64, u8)>,
    pub end_year: Option<(i64, u8)>,
}

impl ExtractedFields {
    pub fn found_count(&self) -> usize {
        [
            self.full_name.is_some(),
            self.institution.is_some(),
            self.program.is_some(),
            self.start_year.is_some(),
            self.end_year.is_some(),
        ]
        .iter()
        .filter(|found| **found)
        .count()
    }
}

/// Canonical identity value. Never mutated after construction; the claimed
/// and extracted views of a request are separate records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    full_name: IdentityField,
    institution: IdentityField,
    program: IdentityField,
    start_year: IdentityField,
    end_year: IdentityField,
}

impl IdentityRecord {
    pub fn from_user_claims(claims: &Claims) -> Self {
        Self {
            full_name: IdentityField::claimed(FieldValue::Text(claims.full_name.clone())),
            institution: IdentityField::claimed(FieldValue::Text(claims.institution.clone())),
            program: IdentityField::claimed(FieldValue::Text(claims.program.clone())),
            start_year: IdentityField::claimed(FieldValue::Number(claims.start_year.into())),
            end_year: IdentityField::claimed(FieldValue::Number(claims.end_year.into())),
        }
    }

    pub fn from_extraction(fields: &ExtractedFields, source: FieldSource) -> Self {
        let text = |found: &Option<(String, u8)>| match found {
            Some((value, confidence)) => {
                IdentityField::extracted(FieldValue::Text(value.clone()), *confidence, source)
            }
            None => IdentityField::absent(source),
        };
        let number = |found: &Option<(i64, u8)>| match found {
            Some((value, confidence)) => {
                IdentityField::extracted(FieldValue::Number(*value), *confidence, source)
            }
            None => IdentityField::absent(source),
        };

        Self {
            full_name: text(&fields.full_name),
            institution: text(&fields.institution),
            program: text(&fields.program),
            start_year: number(&fields.start_year),
            end_year: number(&fields.end_year),
        }
    }

    pub fn to_persisted(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_persisted(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn field(&self, kind: IdentityFieldKind) -> &IdentityField {
        match kind {
            IdentityFieldKind::FullName => &self.full_name,
            IdentityFieldKind::Institution => &self.institution,
            IdentityFieldKind::Program => &self.program,
            IdentityFieldKind::StartYear => &self.start_year,
            IdentityFieldKind::EndYear => &self.end_year,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (IdentityFieldKind, &IdentityField)> {
        IdentityFieldKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.field(kind)))
    }

    pub fn full_name(&self) -> &IdentityField {
        &self.full_name
    }

    pub fn institution(&self) -> &IdentityField {
        &self.institution
    }

    pub fn program(&self) -> &IdentityField {
        &self.program
    }

    pub fn start_year(&self) -> &IdentityField {
        &self.start_year
    }

    pub fn end_year(&self) -> &IdentityField {
        &self.end_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            full_name: "Asha Rao".into(),
            institution: "IIT Delhi".into(),
            program: "B.Tech CSE".into(),
            start_year: 2018,
            end_year: 2022,
        }
    }

    #[test]
    fn test_claims_are_full_confidence_user_fields() {
        let record = IdentityRecord::from_user_claims(&claims());
        for (_, field) in record.fields() {
            assert_eq!(field.confidence(), 100);
            assert_eq!(field.source(), FieldSource::User);
            assert!(field.is_present());
        }
        assert_eq!(record.start_year().as_number(), Some(2018));
        assert_eq!(record.institution().as_text(), Some("IIT Delhi"));
    }

    #[test]
    fn test_extraction_leaves_missing_fields_absent() {
        let fields = ExtractedFields {
            full_name: Some(("Asha Rao".into(), 91)),
            end_year: Some((2022, 80)),
            ..Default::default()
        };
        let record = IdentityRecord::from_extraction(&fields, FieldSource::Ocr);

        assert_eq!(record.full_name().confidence(), 91);
        assert_eq!(record.full_name().source(), FieldSource::Ocr);
        assert!(!record.institution().is_present());
        assert_eq!(record.institution().confidence(), 0);
        assert_eq!(record.end_year().as_number(), Some(2022));
        assert_eq!(fields.found_count(), 2);
    }

    #[test]
    fn test_persisted_round_trip_is_lossless() {
        let claimed = IdentityRecord::from_user_claims(&claims());
        let extracted = IdentityRecord::from_extraction(
            &ExtractedFields {
                full_name: Some(("ASHA RAO".into(), 77)),
                start_year: Some((2018, 64)),
                ..Default::default()
            },
            FieldSource::Ocr,
        );

        for record in [claimed, extracted] {
            let persisted = record.to_persisted().unwrap();
            let restored = IdentityRecord::from_persisted(&persisted).unwrap();
            assert_eq!(restored, record);
            assert_eq!(restored.to_persisted().unwrap(), persisted);
        }
    }

    #[test]
    fn test_persisted_user_field_below_full_confidence_is_refused() {
        let record = IdentityRecord::from_user_claims(&claims());
        let tampered = record
            .to_persisted()
            .unwrap()
            .replacen("\"confidence\":100", "\"confidence\":40", 1);
        assert!(IdentityRecord::from_persisted(&tampered).is_err());
    }

    #[test]
    fn test_numeric_looking_text_survives_round_trip_as_text() {
        let fields = ExtractedFields {
            program: Some(("2020".into(), 50)),
            ..Default::default()
        };
        let record = IdentityRecord::from_extraction(&fields, FieldSource::Ocr);
        let restored = IdentityRecord::from_persisted(&record.to_persisted().unwrap()).unwrap();
        assert_eq!(restored.program().as_text(), Some("2020"));
    }

    #[test]
    fn test_claim_validation() {
        assert!(claims().validate().is_ok());

        let mut blank = claims();
        blank.full_name = "   ".into();
        assert_eq!(blank.validate().unwrap_err(), "full_name is required");

        let mut inverted = claims();
        inverted.start_year = 2023;
        assert!(inverted.validate().is_err());

        let mut ancient = claims();
        ancient.start_year = 1800;
        assert!(ancient.validate().is_err());
    }
}
