// src/core/identity/mod.rs
pub mod record;
pub mod types;

pub use record::{Claims, ExtractedFields, IdentityRecord};
pub use types::{FieldSource, FieldValue, IdentityField, IdentityFieldKind};
