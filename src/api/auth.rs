// src/api/auth.rs
use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use super::error::ApiError;
use crate::core::verification::SubjectId;

/// Set by the upstream auth layer once a bearer credential is resolved.
pub const SUBJECT_HEADER: &str = "X-Subject-Id";
pub const ROLE_HEADER: &str = "X-Subject-Role";

const REVIEWER_ROLE: &str = "reviewer";
const MAX_SUBJECT_LEN: usize = 128;

/// The caller as resolved by the auth collaborator. Credentials are never
/// inspected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    pub subject: SubjectId,
    pub role: Option<String>,
}

impl AuthenticatedSubject {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let subject = headers
            .get(SUBJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_SUBJECT_LEN)
            .ok_or(ApiError::Unauthorized)?;

        let role = headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase());

        Ok(Self {
            subject: SubjectId::new(subject),
            role,
        })
    }

    pub fn is_reviewer(&self) -> bool {
        self.role.as_deref() == Some(REVIEWER_ROLE)
    }
}

impl FromRequest for AuthenticatedSubject {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req.headers()))
    }
}

/// An authenticated caller holding the reviewer role.
#[derive(Debug, Clone)]
pub struct Reviewer(pub AuthenticatedSubject);

impl FromRequest for Reviewer {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            AuthenticatedSubject::from_headers(req.headers()).and_then(|caller| {
                if caller.is_reviewer() {
                    Ok(Reviewer(caller))
                } else {
                    Err(ApiError::Forbidden)
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_subject_required() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            AuthenticatedSubject::from_headers(req.headers()),
            Err(ApiError::Unauthorized)
        ));

        let req = TestRequest::default()
            .insert_header((SUBJECT_HEADER, "   "))
            .to_http_request();
        assert!(AuthenticatedSubject::from_headers(req.headers()).is_err());
    }

    #[test]
    fn test_role_is_case_insensitive() {
        let req = TestRequest::default()
            .insert_header((SUBJECT_HEADER, "rev-1"))
            .insert_header((ROLE_HEADER, "Reviewer"))
            .to_http_request();
        let caller = AuthenticatedSubject::from_headers(req.headers()).unwrap();
        assert_eq!(caller.subject.as_str(), "rev-1");
        assert!(caller.is_reviewer());
    }
}
