// src/core/ocr/mod.rs
//! Text extraction capability.
//!
//! The verification engine only sees [`OcrExtractor`]. Concrete providers are
//! wrapped in a [`ManagedExtractor`], which initializes the backend on first
//! use, bounds concurrent use, and tears it down on `release`.

mod provider;

pub use provider::{
    build_extractor, DigiLockerExtractor, ManagedExtractor, OcrBackend, PlainTextBackend,
    TesseractBackend,
};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::core::document::DocumentHandle;
use crate::core::identity::FieldSource;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extraction capability unavailable: {0}")]
    Unavailable(String),

    #[error("document unreadable: {0}")]
    Unreadable(String),

    #[error("extraction timed out after {0}s")]
    Timeout(u64),
}

impl ExtractionError {
    /// Message shown to the subject. Carries no paths or tool output.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => {
                "Document processing is temporarily unavailable. Please try again later."
            }
            Self::Unreadable(_) => "The document could not be read. Please upload a clearer copy.",
            Self::Timeout(_) => "Processing the document took too long. Please try again.",
        }
    }
}

/// Raw text pulled from a document plus the provider's overall confidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: u8,
    pub source: FieldSource,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OcrExtractor: Send + Sync {
    async fn extract_text(&self, document: &DocumentHandle)
        -> Result<ExtractedText, ExtractionError>;

    /// Health probe. Never fails; an unreachable backend reports `false`.
    async fn is_available(&self) -> bool;

    /// Tears down the backing capability. Later extractions fail as unavailable.
    async fn release(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrProviderKind {
    Tesseract,
    PlainText,
    Digilocker,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub provider: OcrProviderKind,
    pub binary: String,
    pub pdf_binary: String,
    /// Rasterizer used when a PDF has no text layer.
    pub raster_binary: String,
    pub language: String,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
    pub max_document_bytes: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: OcrProviderKind::Tesseract,
            binary: "tesseract".to_string(),
            pdf_binary: "pdftotext".to_string(),
            raster_binary: "pdftoppm".to_string(),
            language: "eng".to_string(),
            max_concurrency: 1,
            timeout_secs: 60,
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

impl OcrConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("ocr.max_concurrency must be greater than 0".into());
        }
        if self.timeout_secs == 0 {
            return Err("ocr.timeout_secs must be greater than 0".into());
        }
        if self.max_document_bytes == 0 {
            return Err("ocr.max_document_bytes must be greater than 0".into());
        }
        if self.provider == OcrProviderKind::Tesseract && self.binary.trim().is_empty() {
            return Err("ocr.binary must be set for the tesseract provider".into());
        }
        Ok(())
    }
}
