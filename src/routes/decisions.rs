use super::{ApiError, AppState};
use crate::models::{RecordDecisionRequest, RecordDecisionResponse, UndoResponse, UndoStatusResponse, UserQuery, UserRequest};
use actix_web::{web, HttpResponse};
use validator::Validate;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/decisions", web::post().to(record_decision))
        .route("/undo", web::post().to(undo))
        .route("/undo/status", web::get().to(undo_status));
}

/// Record a like or pass
///
/// POST /api/v1/decisions
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "targetUserId": "string",
///   "direction": "like|pass"
/// }
/// ```
async fn record_decision(
    state: web::Data<AppState>,
    req: web::Json<RecordDecisionRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let created = state
        .ledger
        .record_decision(&req.user_id, &req.target_user_id, req.direction)
        .await?;

    Ok(HttpResponse::Ok().json(RecordDecisionResponse {
        success: true,
        matched: created.is_some(),
        created_match: created,
    }))
}

/// Reverse the caller's most recent decision
///
/// POST /api/v1/undo
async fn undo(state: web::Data<AppState>, req: web::Json<UserRequest>) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let outcome = state.undo.undo(&req.user_id).await?;

    Ok(HttpResponse::Ok().json(UndoResponse {
        success: true,
        undone: outcome.decision,
        restored: outcome.restored,
        match_deleted: outcome.match_deleted,
        restored_match: outcome.restored_match,
    }))
}

/// GET /api/v1/undo/status?userId={userId}
async fn undo_status(state: web::Data<AppState>, query: web::Query<UserQuery>) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let can_undo = state.undo.can_undo(&query.user_id).await?;
    let seconds_remaining = state.undo.seconds_remaining(&query.user_id).await?;

    Ok(HttpResponse::Ok().json(UndoStatusResponse {
        can_undo,
        seconds_remaining,
    }))
}
