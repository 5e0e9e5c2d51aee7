use super::{ApiError, AppState};
use crate::models::{DailyPickQuery, DailyPickResponse, MarkViewedResponse, UserRequest};
use actix_web::{web, HttpResponse};
use validator::Validate;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/daily-pick", web::get().to(get_daily_pick))
        .route("/daily-pick/viewed", web::post().to(mark_viewed));
}

/// GET /api/v1/daily-pick?userId={userId}&date={YYYY-MM-DD}
///
/// `date` defaults to today in the configured offset.
async fn get_daily_pick(
    state: web::Data<AppState>,
    query: web::Query<DailyPickQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let seeker = state.require_profile(&query.user_id).await?;
    let date = query.date.unwrap_or_else(|| state.daily.today());
    let pick = state.daily.get_daily_pick(&seeker, date).await?;

    Ok(HttpResponse::Ok().json(DailyPickResponse { pick }))
}

/// Mark today's pick as viewed
///
/// POST /api/v1/daily-pick/viewed
async fn mark_viewed(state: web::Data<AppState>, req: web::Json<UserRequest>) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let updated = state.daily.mark_viewed(&req.user_id, state.daily.today()).await?;

    Ok(HttpResponse::Ok().json(MarkViewedResponse { success: true, updated }))
}
