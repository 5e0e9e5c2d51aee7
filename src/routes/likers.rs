use super::{ApiError, AppState};
use crate::models::{DailyLikeStatusResponse, PendingLikersResponse, UserQuery};
use actix_web::{web, HttpResponse};
use validator::Validate;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/likers", web::get().to(pending_likers))
        .route("/likes/status", web::get().to(daily_like_status));
}

/// Users who liked the caller and are still waiting on a response
///
/// GET /api/v1/likers?userId={userId}
async fn pending_likers(state: web::Data<AppState>, query: web::Query<UserQuery>) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    state.require_profile(&query.user_id).await?;
    let likers = state.ledger.pending_likers(&query.user_id).await?;

    Ok(HttpResponse::Ok().json(PendingLikersResponse { likers }))
}

/// GET /api/v1/likes/status?userId={userId}
async fn daily_like_status(
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let status = state.ledger.daily_like_status(&query.user_id).await?;

    Ok(HttpResponse::Ok().json(DailyLikeStatusResponse { status }))
}
