// src/api/handlers/health.rs
use actix_web::{web::Data, HttpResponse};
use std::sync::Arc;

use crate::core::services::HealthService;

pub async fn health(service: Data<Arc<HealthService>>) -> HttpResponse {
    let report = service.report().await;
    if report.storage_writable {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}
