// src/core/ocr/provider.rs
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExtractedText, ExtractionError, OcrConfig, OcrExtractor, OcrProviderKind};
use crate::core::document::DocumentHandle;
use crate::core::identity::FieldSource;

/// Confidence reported for documents with an embedded text layer.
const TEXT_LAYER_CONFIDENCE: u8 = 95;

/// Resolution used when rasterizing scanned PDF pages.
const RASTER_DPI: &str = "300";

/// A concrete text-extraction library or tool.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time setup. Called lazily by [`ManagedExtractor`] on first use.
    async fn initialize(&self) -> Result<(), ExtractionError>;

    async fn recognize(&self, document: &DocumentHandle) -> Result<ExtractedText, ExtractionError>;

    async fn probe(&self) -> bool;

    async fn shutdown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendState {
    Uninitialized,
    Ready,
    Released,
}

/// Owns a backend for its whole lifetime: lazy initialization, a bounded
/// number of concurrent recognitions, per-call timeout, explicit release.
pub struct ManagedExtractor<B: OcrBackend> {
    backend: B,
    state: Mutex<BackendState>,
    permits: Semaphore,
    timeout: Duration,
}

impl<B: OcrBackend> ManagedExtractor<B> {
    pub fn new(backend: B, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            backend,
            state: Mutex::new(BackendState::Uninitialized),
            permits: Semaphore::new(max_concurrency.max(1)),
            timeout,
        }
    }

    async fn ensure_ready(&self) -> Result<(), ExtractionError> {
        let mut state = self.state.lock().await;
        match *state {
            BackendState::Ready => Ok(()),
            BackendState::Released => Err(ExtractionError::Unavailable(format!(
                "{} extractor has been released",
                self.backend.name()
            ))),
            BackendState::Uninitialized => {
                info!("Initializing {} extractor", self.backend.name());
                self.backend.initialize().await?;
                *state = BackendState::Ready;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<B: OcrBackend> OcrExtractor for ManagedExtractor<B> {
    async fn extract_text(
        &self,
        document: &DocumentHandle,
    ) -> Result<ExtractedText, ExtractionError> {
        self.ensure_ready().await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractionError::Unavailable("extractor is shutting down".into()))?;

        let extracted = tokio::time::timeout(self.timeout, self.backend.recognize(document))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))??;

        if extracted.text.trim().is_empty() {
            return Err(ExtractionError::Unreadable(
                "no text could be extracted from the document".into(),
            ));
        }

        debug!(
            backend = self.backend.name(),
            chars = extracted.text.len(),
            confidence = extracted.confidence,
            "Extracted document text"
        );
        Ok(extracted)
    }

    async fn is_available(&self) -> bool {
        if *self.state.lock().await == BackendState::Released {
            return false;
        }
        self.backend.probe().await
    }

    async fn release(&self) {
        let mut state = self.state.lock().await;
        if *state == BackendState::Ready {
            self.backend.shutdown().await;
            info!("Released {} extractor", self.backend.name());
        }
        self.permits.close();
        *state = BackendState::Released;
    }
}

/// Drives the `tesseract` CLI for images and `pdftotext` for PDF text layers.
/// Scanned PDFs without a text layer are rasterized with `pdftoppm` and
/// recognized page by page.
pub struct TesseractBackend {
    binary: String,
    pdf_binary: String,
    raster_binary: String,
    language: String,
}

impl TesseractBackend {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            pdf_binary: config.pdf_binary.clone(),
            raster_binary: config.raster_binary.clone(),
            language: config.language.clone(),
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ExtractionError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractionError::Unavailable(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Unreadable(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.lines().next().unwrap_or_default()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn recognize_image(&self, path: &str) -> Result<(String, u8), ExtractionError> {
        let tsv = self
            .run(
                &self.binary,
                &[path, "stdout", "-l", self.language.as_str(), "tsv"],
            )
            .await?;
        Ok(parse_tsv(&tsv))
    }

    async fn recognize_scanned_pdf(&self, path: &str) -> Result<ExtractedText, ExtractionError> {
        let pages_dir = std::env::temp_dir().join(format!("credential-engine-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&pages_dir)
            .await
            .map_err(|e| ExtractionError::Unavailable(format!("page directory: {}", e)))?;

        let result = self.recognize_pages(path, &pages_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&pages_dir).await {
            warn!(dir = ?pages_dir, error = %e, "Failed to remove rasterized pages");
        }
        result
    }

    async fn recognize_pages(
        &self,
        path: &str,
        pages_dir: &Path,
    ) -> Result<ExtractedText, ExtractionError> {
        let prefix = pages_dir.join("page").to_string_lossy().into_owned();
        self.run(
            &self.raster_binary,
            &["-r", RASTER_DPI, "-png", path, prefix.as_str()],
        )
        .await?;

        let unreadable = |e: std::io::Error| ExtractionError::Unreadable(e.to_string());
        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(pages_dir).await.map_err(unreadable)?;
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            pages.push(entry.path());
        }
        // pdftoppm zero-pads page numbers, so name order is page order.
        pages.sort();

        let mut texts = Vec::new();
        let mut total_confidence = 0_u32;
        for page in &pages {
            let (text, confidence) = self.recognize_image(&page.to_string_lossy()).await?;
            if text.is_empty() {
                continue;
            }
            texts.push(text);
            total_confidence += u32::from(confidence);
        }

        debug!(pages = pages.len(), recognized = texts.len(), "Recognized scanned PDF");
        let confidence = match texts.len() {
            0 => 0,
            n => (total_confidence / n as u32) as u8,
        };
        Ok(ExtractedText {
            text: texts.join("\n"),
            confidence,
            source: FieldSource::Ocr,
        })
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn initialize(&self) -> Result<(), ExtractionError> {
        let version = self.run(&self.binary, &["--version"]).await?;
        info!(
            version = version.lines().next().unwrap_or_default(),
            language = %self.language,
            "Tesseract available"
        );
        Ok(())
    }

    async fn recognize(&self, document: &DocumentHandle) -> Result<ExtractedText, ExtractionError> {
        let path = document.path.to_string_lossy().into_owned();

        if document.is_text() {
            return read_text_layer(document).await;
        }

        if document.content_type == "application/pdf" {
            let text = self
                .run(&self.pdf_binary, &["-layout", path.as_str(), "-"])
                .await?;
            if !text.trim().is_empty() {
                return Ok(ExtractedText {
                    text,
                    confidence: TEXT_LAYER_CONFIDENCE,
                    source: FieldSource::Ocr,
                });
            }
            debug!("PDF has no text layer, falling back to page OCR");
            return self.recognize_scanned_pdf(&path).await;
        }

        let (text, confidence) = self.recognize_image(&path).await?;
        Ok(ExtractedText {
            text,
            confidence,
            source: FieldSource::Ocr,
        })
    }

    async fn probe(&self) -> bool {
        self.run(&self.binary, &["--version"]).await.is_ok()
    }

    async fn shutdown(&self) {}
}

/// Reads documents that already carry their text (plain text uploads).
#[derive(Debug, Default)]
pub struct PlainTextBackend;

#[async_trait]
impl OcrBackend for PlainTextBackend {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    async fn initialize(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    async fn recognize(&self, document: &DocumentHandle) -> Result<ExtractedText, ExtractionError> {
        read_text_layer(document).await
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn shutdown(&self) {}
}

async fn read_text_layer(document: &DocumentHandle) -> Result<ExtractedText, ExtractionError> {
    let bytes = tokio::fs::read(&document.path)
        .await
        .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
    Ok(ExtractedText {
        text: String::from_utf8_lossy(&bytes).into_owned(),
        confidence: TEXT_LAYER_CONFIDENCE,
        source: FieldSource::Ocr,
    })
}

/// Rebuilds line text from tesseract TSV output and averages word confidences.
fn parse_tsv(tsv: &str) -> (String, u8) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(String, String, String)> = None;
    let mut total_confidence = 0.0_f64;
    let mut words = 0_u32;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let confidence: f64 = match cols[10].parse() {
            Ok(c) if c >= 0.0 => c,
            _ => continue,
        };
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = (cols[2].to_string(), cols[3].to_string(), cols[4].to_string());
        if current_key.as_ref() != Some(&key) {
            lines.push(String::new());
            current_key = Some(key);
        }
        if let Some(line) = lines.last_mut() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        total_confidence += confidence;
        words += 1;
    }

    let confidence = if words == 0 {
        0
    } else {
        (total_confidence / f64::from(words)).round().clamp(0.0, 100.0) as u8
    };
    (lines.join("\n"), confidence)
}

/// Government document locker integration. Not implemented yet; always
/// reports the capability as unavailable.
#[derive(Debug, Default)]
pub struct DigiLockerExtractor;

#[async_trait]
impl OcrExtractor for DigiLockerExtractor {
    async fn extract_text(
        &self,
        _document: &DocumentHandle,
    ) -> Result<ExtractedText, ExtractionError> {
        Err(ExtractionError::Unavailable(
            "DigiLocker integration is not implemented".into(),
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn release(&self) {}
}

pub fn build_extractor(config: &OcrConfig) -> Arc<dyn OcrExtractor> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider {
        OcrProviderKind::Tesseract => Arc::new(ManagedExtractor::new(
            TesseractBackend::new(config),
            config.max_concurrency,
            timeout,
        )),
        OcrProviderKind::PlainText => Arc::new(ManagedExtractor::new(
            PlainTextBackend,
            config.max_concurrency,
            timeout,
        )),
        OcrProviderKind::Digilocker => {
            warn!("DigiLocker provider selected; all extractions will fail as unavailable");
            Arc::new(DigiLockerExtractor)
        }
    }
}
