// src/core/document/storage.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Content types accepted for verification documents.
pub const ACCEPTED_CONTENT_TYPES: [&str; 4] =
    ["application/pdf", "image/png", "image/jpeg", "text/plain"];

/// A locally addressable uploaded document. The engine only holds it for the
/// duration of extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub path: PathBuf,
    pub content_type: String,
    pub size_bytes: u64,
}

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
            size_bytes,
        }
    }

    pub fn validate(&self, max_bytes: u64) -> Result<(), String> {
        if !ACCEPTED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(format!("unsupported document type: {}", self.content_type));
        }
        if self.size_bytes == 0 {
            return Err("document is empty".to_string());
        }
        if self.size_bytes > max_bytes {
            return Err(format!(
                "document exceeds the {} byte limit",
                max_bytes
            ));
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        self.content_type == "text/plain"
    }

    /// SHA3-256 of the document bytes, hex encoded. Kept on the request
    /// after the document itself is discarded.
    pub async fn fingerprint(&self) -> std::io::Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(hex::encode(Sha3_256::digest(&bytes)))
    }
}

/// The upload layer's side of the acquire-process-discard contract.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn discard(&self, handle: &DocumentHandle) -> std::io::Result<()>;
}

/// Documents stored as files on local disk.
#[derive(Debug, Default, Clone)]
pub struct LocalDocumentStorage;

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    async fn discard(&self, handle: &DocumentHandle) -> std::io::Result<()> {
        match tokio::fs::remove_file(&handle.path).await {
            Ok(()) => {
                debug!(path = %handle.path.display(), "Discarded document");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %handle.path.display(), "Document already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validation() {
        let max = 10 * 1024 * 1024;
        assert!(DocumentHandle::new("a.pdf", "application/pdf", 2048)
            .validate(max)
            .is_ok());
        assert!(DocumentHandle::new("a.exe", "application/x-msdownload", 10)
            .validate(max)
            .is_err());
        assert!(DocumentHandle::new("a.pdf", "application/pdf", max + 1)
            .validate(max)
            .is_err());
        assert!(DocumentHandle::new("a.pdf", "application/pdf", 0)
            .validate(max)
            .is_err());
    }

    #[tokio::test]
    async fn test_fingerprint_and_discard() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"Name: Asha Rao").unwrap();
        let handle = DocumentHandle::new(&path, "text/plain", 14);

        let fingerprint = handle.fingerprint().await.unwrap();
        assert_eq!(fingerprint.len(), 64);

        LocalDocumentStorage.discard(&handle).await.unwrap();
        assert!(!path.exists());
        // Discarding twice is not an error.
        LocalDocumentStorage.discard(&handle).await.unwrap();
    }
}
