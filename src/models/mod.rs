// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    match_id, ActivityState, BoundingBox, CommunicationStyle, DailyPick, DailyPickEntry, Dealbreakers,
    DailyLikeStatus, Decision, DepthPreference, Direction, Drinking, Education, EndReason, Gender, Lifestyle, LookingFor,
    Match, MatchState, MatchTransitionError, MessagingFrequency, PacePreferences, PendingLiker, Profile, ScoreBreakdown,
    ScoredCandidate, ScoringWeights, Smoking, TimeToFirstDate, UndoSlot, UserId, WantsKids,
};
pub use requests::{DailyPickQuery, EndMatchRequest, FindCandidatesRequest, RecordDecisionRequest, UserQuery, UserRequest};
pub use responses::{
    DailyLikeStatusResponse, DailyPickResponse, ErrorResponse, FindCandidatesResponse, HealthResponse,
    MarkViewedResponse, MatchesResponse, PendingLikersResponse, RecordDecisionResponse, UndoResponse,
    UndoStatusResponse,
};
