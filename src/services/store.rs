//! Storage boundary of the engine.
//!
//! Every check-then-act sequence the engine needs is expressed here as a single
//! trait call (insert-if-absent, compare-and-create, compare-and-delete,
//! compare-and-swap) so that implementations can make it atomic in their backend.

use crate::models::{DailyPickEntry, Decision, Match, MatchState, Profile, UndoSlot, UserId};
use crate::services::{AppwriteError, CacheError, PostgresError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage collaborators
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Match already exists: {0}")]
    DuplicateMatch(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Postgres(#[from] PostgresError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Directory error: {0}")]
    Directory(#[from] AppwriteError),
}

impl StorageError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::Postgres(PostgresError::SqlxError(e)) => {
                matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
            }
            StorageError::Cache(CacheError::RedisError(e)) => e.is_io_error() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Cap on likes per actor over a window that started at `since`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeQuota {
    pub since: DateTime<Utc>,
    pub limit: u32,
}

/// How a decision is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Replace an existing decision for the pair instead of keeping it
    pub overwrite: bool,
    /// Checked for likes only; the decision being replaced does not count
    pub like_quota: Option<LikeQuota>,
}

impl SaveOptions {
    pub fn overwrite(overwrite: bool) -> Self {
        Self {
            overwrite,
            like_quota: None,
        }
    }
}

/// Outcome of persisting a decision
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// No decision existed for the pair
    Inserted,
    /// An earlier decision was overwritten; carries the previous value
    Replaced(Decision),
    /// A decision already existed and was kept; carries the existing value
    Rejected(Decision),
    /// The pair is matched, so its like was kept instead of becoming a pass
    Matched(Decision),
    /// The like quota was already spent; nothing was written
    QuotaExceeded { used: u32 },
}

/// What an undo removed besides the decision itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoRemoval {
    pub match_deleted: bool,
}

/// Decision and match records
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Persist a decision. Without `overwrite` this is an insert-if-absent on (actor, target).
    ///
    /// The quota check, the existing-decision check and the write happen atomically.
    async fn save_decision(&self, decision: &Decision, options: SaveOptions) -> Result<SaveOutcome, StorageError>;

    async fn get_decision(&self, actor: &str, target: &str) -> Result<Option<Decision>, StorageError>;

    async fn delete_decision(&self, decision_id: Uuid) -> Result<bool, StorageError>;

    /// True when both a->b and b->a are likes
    async fn mutual_like_exists(&self, a: &str, b: &str) -> Result<bool, StorageError>;

    /// Targets the actor has already liked or passed
    async fn decided_ids(&self, actor: &str) -> Result<HashSet<UserId>, StorageError>;

    /// Likes received by `target`, newest first
    async fn likers_of(&self, target: &str) -> Result<Vec<Decision>, StorageError>;

    /// Likes the actor has made at or after `since`
    async fn count_likes_since(&self, actor: &str, since: DateTime<Utc>) -> Result<u32, StorageError>;

    /// Compare-and-create. Fails with [`StorageError::DuplicateMatch`] when the id is taken.
    ///
    /// Returns `false` without writing when the pair is no longer a mutual like.
    async fn create_match(&self, new_match: &Match) -> Result<bool, StorageError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StorageError>;

    /// Compare-and-set on the lifecycle state.
    ///
    /// Writes `updated` only while the stored match is still in `expected`;
    /// returns `false` when it moved on or no longer exists.
    async fn update_match(&self, updated: &Match, expected: MatchState) -> Result<bool, StorageError>;

    async fn matches_for(&self, user_id: &str) -> Result<Vec<Match>, StorageError>;

    /// Atomically delete a decision, put back `restore` when given, and drop
    /// the match `match_id` if it exists.
    ///
    /// Returns `None` without touching anything if the decision no longer exists.
    async fn undo_decision(
        &self,
        decision_id: Uuid,
        match_id: Option<&str>,
        restore: Option<&Decision>,
    ) -> Result<Option<UndoRemoval>, StorageError>;
}

/// Single-slot undo records, one per actor
#[async_trait]
pub trait UndoStore: Send + Sync {
    /// Store the slot, replacing any earlier one for the same actor
    async fn put(&self, slot: &UndoSlot) -> Result<(), StorageError>;

    async fn get(&self, actor: &str) -> Result<Option<UndoSlot>, StorageError>;

    /// Compare-and-delete: remove the actor's slot only if it still refers to `decision_id`
    async fn take(&self, actor: &str, decision_id: Uuid) -> Result<Option<UndoSlot>, StorageError>;

    async fn delete(&self, actor: &str) -> Result<(), StorageError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Daily pick cache keyed by (seeker, date)
#[async_trait]
pub trait DailyPickCache: Send + Sync {
    async fn get(&self, seeker: &str, date: NaiveDate) -> Result<Option<DailyPickEntry>, StorageError>;

    /// Store `entry` unless a pick already exists; returns whichever entry is cached afterwards
    async fn put_if_absent(
        &self,
        seeker: &str,
        date: NaiveDate,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError>;

    /// Compare-and-swap on the cached candidate; returns whichever entry is cached afterwards
    async fn replace_if(
        &self,
        seeker: &str,
        date: NaiveDate,
        expected_candidate: &str,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError>;

    /// Flag the pick as viewed; false when there is no pick for that key
    async fn mark_viewed(&self, seeker: &str, date: NaiveDate) -> Result<bool, StorageError>;

    /// Drop entries for dates before `date`
    async fn purge_before(&self, date: NaiveDate) -> Result<u64, StorageError>;
}

/// Read access to the profile directory
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StorageError>;

    /// Bulk query of ACTIVE profiles
    async fn list_active(&self) -> Result<Vec<Profile>, StorageError>;

    /// Pool to run a seeker's search over.
    ///
    /// Sources may narrow it with a coarse prefilter; every pipeline stage
    /// still runs on the result.
    async fn candidate_pool(&self, _seeker: &Profile) -> Result<Vec<Profile>, StorageError> {
        self.list_active().await
    }
}

/// Block relationships owned by trust-and-safety
#[async_trait]
pub trait BlockList: Send + Sync {
    /// Users blocked by, or blocking, `user_id`
    async fn blocked_ids(&self, user_id: &str) -> Result<HashSet<UserId>, StorageError>;

    async fn is_blocked(&self, a: &str, b: &str) -> Result<bool, StorageError> {
        Ok(self.blocked_ids(a).await?.contains(b))
    }
}
