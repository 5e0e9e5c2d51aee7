use crate::models::domain::{DailyLikeStatus, DailyPick, Decision, Match, PendingLiker, ScoredCandidate};
use serde::{Deserialize, Serialize};

/// Response for the find candidates endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindCandidatesResponse {
    pub candidates: Vec<ScoredCandidate>,
    pub total_pool: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Result of recording a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDecisionResponse {
    pub success: bool,
    pub matched: bool,
    #[serde(rename = "match")]
    pub created_match: Option<Match>,
}

/// Result of a successful undo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoResponse {
    pub success: bool,
    pub undone: Decision,
    /// Earlier decision put back in place of the undone one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored: Option<Decision>,
    pub match_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_match: Option<Match>,
}

/// Whether an undo is currently available
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoStatusResponse {
    pub can_undo: bool,
    pub seconds_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPickResponse {
    pub pick: Option<DailyPick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesResponse {
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkViewedResponse {
    pub success: bool,
    pub updated: bool,
}

/// Users waiting on a response, newest like first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLikersResponse {
    pub likers: Vec<PendingLiker>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLikeStatusResponse {
    pub status: DailyLikeStatus,
}
