// Route exports
pub mod candidates;
pub mod daily;
pub mod decisions;
pub mod health;
pub mod likers;
pub mod matches;

use crate::config::MatchingSettings;
use crate::core::{DailyPickSelector, EngineError, InteractionLedger, Matcher, UndoController};
use crate::models::{ErrorResponse, MatchTransitionError, Profile};
use crate::services::{CacheManager, PostgresClient, ProfileSource};
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use std::fmt;
use std::sync::Arc;
use validator::ValidationErrors;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<dyn ProfileSource>,
    pub matcher: Arc<Matcher>,
    pub ledger: Arc<InteractionLedger>,
    pub undo: Arc<UndoController>,
    pub daily: Arc<DailyPickSelector>,
    pub matching: MatchingSettings,
    /// Backends checked by the health endpoint, when deployed with them
    pub postgres: Option<Arc<PostgresClient>>,
    pub cache: Option<Arc<CacheManager>>,
}

impl AppState {
    /// Look up a profile, turning absence into [`EngineError::ProfileNotFound`]
    pub async fn require_profile(&self, user_id: &str) -> Result<Profile, ApiError> {
        self.profiles
            .get_profile(user_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::ProfileNotFound(user_id.to_string()).into())
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure)
            .configure(candidates::configure)
            .configure(decisions::configure)
            .configure(daily::configure)
            .configure(likers::configure)
            .configure(matches::configure),
    );
}

/// Error returned by every handler, rendered as [`ErrorResponse`] JSON
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Engine(EngineError),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_failed",
            ApiError::Engine(err) => match err {
                EngineError::InvalidSeekerState { .. } => "invalid_seeker_state",
                EngineError::InvalidWeightConfiguration(_) => "invalid_weight_configuration",
                EngineError::SelfInteraction => "self_interaction",
                EngineError::UndoExpired => "undo_expired",
                EngineError::NothingToUndo => "nothing_to_undo",
                EngineError::DuplicateMatchAttempt(_) => "duplicate_match",
                EngineError::DuplicateDecision { .. } => "duplicate_decision",
                EngineError::MatchedDecision { .. } => "matched_decision",
                EngineError::DailyLimitReached { .. } => "daily_limit_reached",
                EngineError::ProfileNotFound(_) => "profile_not_found",
                EngineError::MatchNotFound(_) => "match_not_found",
                EngineError::Transition(MatchTransitionError::InvalidTransition { .. }) => "invalid_transition",
                EngineError::Transition(MatchTransitionError::NotParticipant(_)) => "not_participant",
                EngineError::Storage(_) => "storage_error",
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(message) => write!(f, "{}", message),
            ApiError::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(err) => match err {
                EngineError::SelfInteraction | EngineError::Transition(MatchTransitionError::NotParticipant(_)) => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::NothingToUndo | EngineError::ProfileNotFound(_) | EngineError::MatchNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::InvalidSeekerState { .. }
                | EngineError::DuplicateMatchAttempt(_)
                | EngineError::DuplicateDecision { .. }
                | EngineError::MatchedDecision { .. }
                | EngineError::Transition(MatchTransitionError::InvalidTransition { .. }) => StatusCode::CONFLICT,
                EngineError::UndoExpired => StatusCode::GONE,
                EngineError::DailyLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
                EngineError::InvalidWeightConfiguration(_) | EngineError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status.as_u16(), self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}
