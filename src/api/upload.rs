// src/api/upload.rs
use std::path::{Path, PathBuf};

use super::{error::ApiError, types::DocumentRef};
use crate::{core::document::DocumentHandle, utils::error::VerificationError};

/// Directory the upload layer writes documents into.
#[derive(Debug, Clone)]
pub struct UploadArea {
    root: PathBuf,
}

impl UploadArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turns a client reference into a handle. Only bare file names inside
    /// the upload area are accepted; the size comes from the file itself.
    pub async fn resolve(&self, document: &DocumentRef) -> Result<DocumentHandle, ApiError> {
        let name = document.file_name.as_str();
        let bare = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if name.is_empty() || !bare || name.starts_with('.') {
            return Err(ApiError::BadRequest("invalid document file name".into()));
        }

        let path = self.root.join(name);
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
            VerificationError::Validation(format!("document {} was not found", name))
        })?;
        if !metadata.is_file() {
            return Err(ApiError::BadRequest("invalid document file name".into()));
        }

        Ok(DocumentHandle::new(
            path,
            document.content_type.trim().to_ascii_lowercase(),
            metadata.len(),
        ))
    }
}
