// Core engine exports
pub mod clock;
pub mod daily;
pub mod distance;
pub mod error;
pub mod filters;
pub mod ledger;
pub mod matcher;
pub mod scoring;
pub mod undo;

pub use clock::{Clock, ManualClock, SystemClock};
pub use daily::DailyPickSelector;
pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box, profile_distance};
pub use error::EngineError;
pub use filters::{dealbreaker_failures, evaluate_stages, FilterStage};
pub use ledger::{DecisionPolicy, InteractionLedger};
pub use matcher::{explain_rejection, filter_candidates, MatchResult, Matcher};
pub use scoring::CompatibilityScorer;
pub use undo::{UndoController, UndoOutcome};
