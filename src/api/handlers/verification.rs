// src/api/handlers/verification.rs
use actix_web::{
    web::{self, Data, Json, Path, Query},
    HttpResponse, Scope,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::{
        auth::{AuthenticatedSubject, Reviewer},
        error::ApiError,
        types::{
            ReverificationQuery, ReverificationResponse, ReviewRequest, ReviewResponse,
            SubmitRequest, SubmitResponse, SweepResponse,
        },
        upload::UploadArea,
    },
    core::{
        services::{ExpirySweeper, VerificationService},
        verification::VerificationStatus,
    },
};

pub fn scope() -> Scope {
    web::scope("/verification")
        .service(web::resource("").route(web::post().to(submit)))
        .service(web::resource("/status").route(web::get().to(get_status)))
        .service(web::resource("/reverification").route(web::get().to(needs_reverification)))
        .service(web::resource("/admin/pending").route(web::get().to(list_pending)))
        .service(web::resource("/admin/sweep").route(web::post().to(sweep)))
        .service(web::resource("/admin/{id}/review").route(web::post().to(review)))
}

async fn submit(
    service: Data<Arc<VerificationService>>,
    uploads: Data<UploadArea>,
    caller: AuthenticatedSubject,
    request: Json<SubmitRequest>,
) -> Result<HttpResponse, ApiError> {
    let SubmitRequest { claims, document } = request.into_inner();
    let handle = uploads.resolve(&document).await?;

    let request_id = service.submit(&caller.subject, claims, handle).await?;

    Ok(HttpResponse::Accepted().json(SubmitResponse {
        request_id,
        status: VerificationStatus::Pending,
    }))
}

async fn get_status(
    service: Data<Arc<VerificationService>>,
    caller: AuthenticatedSubject,
) -> Result<HttpResponse, ApiError> {
    let status = service.get_status(&caller.subject)?;
    Ok(HttpResponse::Ok().json(status))
}

async fn needs_reverification(
    sweeper: Data<Arc<ExpirySweeper>>,
    caller: AuthenticatedSubject,
    query: Query<ReverificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let institution = query.into_inner().institution;
    if institution.trim().is_empty() {
        return Err(ApiError::BadRequest("institution is required".into()));
    }

    let needs_reverification = sweeper.needs_reverification(&caller.subject, &institution)?;
    Ok(HttpResponse::Ok().json(ReverificationResponse {
        institution,
        needs_reverification,
    }))
}

async fn list_pending(
    service: Data<Arc<VerificationService>>,
    _reviewer: Reviewer,
) -> Result<HttpResponse, ApiError> {
    let queue = service.list_pending_manual_review()?;
    Ok(HttpResponse::Ok().json(queue))
}

async fn review(
    service: Data<Arc<VerificationService>>,
    reviewer: Reviewer,
    id: Path<Uuid>,
    request: Json<ReviewRequest>,
) -> Result<HttpResponse, ApiError> {
    let request_id = id.into_inner();
    let ReviewRequest { decision, notes } = request.into_inner();

    let reviewed = service
        .review(request_id, decision, notes, reviewer.0.subject.as_str())
        .await?;

    info!(
        request_id = %request_id,
        reviewer = %reviewer.0.subject,
        status = %reviewed.status,
        "Manual review recorded"
    );
    Ok(HttpResponse::Ok().json(ReviewResponse {
        request_id,
        status: reviewed.status,
    }))
}

async fn sweep(
    sweeper: Data<Arc<ExpirySweeper>>,
    _reviewer: Reviewer,
) -> Result<HttpResponse, ApiError> {
    let deactivated = sweeper.sweep().await?;
    Ok(HttpResponse::Ok().json(SweepResponse { deactivated }))
}
