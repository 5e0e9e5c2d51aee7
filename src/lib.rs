//! Lume Discovery - Matching & discovery engine for the Lume dating app
//!
//! This library filters candidate profiles through a multi-stage pipeline,
//! scores compatibility, records like/pass decisions with mutual-match
//! detection, offers a short undo window and picks one candidate per day.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    CompatibilityScorer, DailyPickSelector, EngineError, InteractionLedger, Matcher, UndoController,
    distance::{calculate_bounding_box, haversine_distance},
};
pub use models::{Decision, Direction, Match, Profile, ScoreBreakdown, ScoringWeights};
