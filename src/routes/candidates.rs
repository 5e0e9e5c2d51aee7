use super::{ApiError, AppState};
use crate::core::EngineError;
use crate::models::{FindCandidatesRequest, FindCandidatesResponse};
use actix_web::{web, HttpResponse};
use validator::Validate;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/candidates/find", web::post().to(find_candidates));
}

/// Find ranked candidates
///
/// POST /api/v1/candidates/find
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "limit": 20
/// }
/// ```
async fn find_candidates(
    state: web::Data<AppState>,
    req: web::Json<FindCandidatesRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let limit = state.matching.clamp_limit(req.limit);
    let seeker = state.require_profile(&req.user_id).await?;

    tracing::info!("Finding candidates for user: {}, limit: {}", seeker.user_id, limit);

    let pool = state.profiles.candidate_pool(&seeker).await.map_err(EngineError::from)?;
    let result = state.matcher.find_candidates(&seeker, pool, limit).await?;

    tracing::info!(
        "Returning {} candidates for user {} (from {} profiles)",
        result.candidates.len(),
        seeker.user_id,
        result.total_pool
    );

    Ok(HttpResponse::Ok().json(FindCandidatesResponse {
        candidates: result.candidates,
        total_pool: result.total_pool,
    }))
}
