// src/api/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::utils::error::VerificationError;

const INTERNAL_MESSAGE: &str = "an internal error occurred";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("missing or invalid subject credentials")]
    Unauthorized,

    #[error("reviewer role required")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
    correlation_id: Uuid,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Verification(e) => e.code(),
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Verification(VerificationError::Extraction(e)) => e.user_message().to_string(),
            Self::Verification(e) if !e.is_user_facing() => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.code() {
            "VALIDATION_ERROR" | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" | "INVALID_STATE" => StatusCode::CONFLICT,
            "OCR_FAILED" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let correlation_id = Uuid::new_v4();
        let status = self.status_code();

        if status.is_server_error() {
            error!(%correlation_id, code = self.code(), error = %self, "Request failed");
        } else {
            warn!(%correlation_id, code = self.code(), error = %self, "Request rejected");
        }

        HttpResponse::build(status).json(ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
                correlation_id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ocr::ExtractionError;
    use crate::storage::StorageError;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_internal_detail_is_hidden() {
        let err = ApiError::from(VerificationError::Storage(StorageError::DatabaseError(
            "IO error: /var/lib/rocks/LOCK".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"]["message"], INTERNAL_MESSAGE);
        assert!(json["error"]["correlation_id"].is_string());
    }

    #[actix_web::test]
    async fn test_conflict_is_user_facing() {
        let err = ApiError::from(VerificationError::Conflict("already in progress".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "already in progress");
    }

    #[actix_web::test]
    async fn test_extraction_failure_hides_tool_output() {
        let err = ApiError::from(VerificationError::Extraction(ExtractionError::Unavailable(
            "/opt/internal/ocr/bin/tesseract: No such file or directory (os error 2)".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let message = json["error"]["message"].as_str().unwrap();
        assert_eq!(json["error"]["code"], "OCR_FAILED");
        assert!(!message.contains("/opt/internal"));
        assert!(!message.contains("os error"));
    }
}
