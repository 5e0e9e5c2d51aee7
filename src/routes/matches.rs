use super::{ApiError, AppState};
use crate::models::{EndMatchRequest, EndReason, MatchesResponse, UserQuery, UserRequest};
use actix_web::{web, HttpResponse};
use validator::Validate;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/matches", web::get().to(list_matches))
        .route("/matches/{id}/unmatch", web::post().to(unmatch))
        .route("/matches/{id}/end", web::post().to(end_match));
}

/// Matches the user takes part in, in any state
///
/// GET /api/v1/matches?userId={userId}
async fn list_matches(state: web::Data<AppState>, query: web::Query<UserQuery>) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let matches = state.ledger.matches_for(&query.user_id).await?;
    Ok(HttpResponse::Ok().json(MatchesResponse { matches }))
}

/// POST /api/v1/matches/{id}/unmatch
async fn unmatch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<UserRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let updated = state.ledger.unmatch(&path, &req.user_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Move a match to friends, a graceful exit, an unmatch or a block
///
/// POST /api/v1/matches/{id}/end
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "reason": "friend_zone|graceful_exit|unmatch|block"
/// }
/// ```
async fn end_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<EndMatchRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let match_id = path.into_inner();
    let updated = match req.reason {
        EndReason::FriendZone => state.ledger.befriend(&match_id, &req.user_id).await?,
        EndReason::GracefulExit => state.ledger.graceful_exit(&match_id, &req.user_id).await?,
        EndReason::Unmatch => state.ledger.unmatch(&match_id, &req.user_id).await?,
        EndReason::Block => state.ledger.block(&match_id, &req.user_id).await?,
    };

    Ok(HttpResponse::Ok().json(updated))
}
