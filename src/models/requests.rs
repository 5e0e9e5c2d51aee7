use crate::models::domain::{Direction, EndReason};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to find ranked candidates
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindCandidatesRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    /// Clamped to the configured maximum; defaults when absent
    #[serde(default)]
    #[validate(range(min = 1))]
    pub limit: Option<u16>,
}

/// Request to record a like or pass
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordDecisionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: String,
    pub direction: Direction,
}

/// Request addressed to a single user (undo, mark viewed)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
}

/// Query string for user-scoped GET endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserQuery {
    #[validate(length(min = 1))]
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Query string for the daily pick; `date` defaults to today in the configured offset
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DailyPickQuery {
    #[validate(length(min = 1))]
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Request to end or downgrade a match
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndMatchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    pub reason: EndReason,
}
