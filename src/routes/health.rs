use super::AppState;
use crate::models::HealthResponse;
use actix_web::{web, HttpResponse, Responder};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}

/// Health check endpoint
///
/// Reports "degraded" when any configured backend fails its health check.
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let pg_healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };
    let cache_healthy = match &state.cache {
        Some(cache) => cache.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if pg_healthy && cache_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
