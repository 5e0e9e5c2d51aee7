use crate::core::{clock::Clock, error::EngineError, undo::UndoController};
use crate::models::{
    match_id, DailyLikeStatus, Decision, Direction, Match, MatchState, MatchTransitionError, PendingLiker, UserId,
};
use crate::services::{
    BlockList, InteractionStore, LikeQuota, ProfileSource, SaveOptions, SaveOutcome, StorageError,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at creating a match before giving up on a transient failure
pub const MAX_MATCH_ATTEMPTS: u32 = 3;

/// Compare-and-set rounds for a lifecycle transition that keeps losing to concurrent ones
const MAX_TRANSITION_ATTEMPTS: u32 = 5;

const RETRY_BACKOFF_MS: u64 = 25;

/// What happens when an actor decides on the same target twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Keep the first decision and report [`EngineError::DuplicateDecision`]
    #[default]
    Reject,
    /// Replace the earlier decision
    Overwrite,
}

/// Records like/pass decisions and owns the match lifecycle
#[derive(Clone)]
pub struct InteractionLedger {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileSource>,
    blocks: Arc<dyn BlockList>,
    undo: Arc<UndoController>,
    clock: Arc<dyn Clock>,
    policy: DecisionPolicy,
    daily_like_limit: Option<u32>,
    utc_offset: FixedOffset,
}

impl InteractionLedger {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileSource>,
        blocks: Arc<dyn BlockList>,
        undo: Arc<UndoController>,
        clock: Arc<dyn Clock>,
        policy: DecisionPolicy,
    ) -> Self {
        Self {
            interactions,
            profiles,
            blocks,
            undo,
            clock,
            policy,
            daily_like_limit: None,
            utc_offset: Utc.fix(),
        }
    }

    /// Cap likes per actor per local day; `None` leaves likes unlimited
    pub fn with_daily_like_limit(mut self, limit: Option<u32>, utc_offset: FixedOffset) -> Self {
        self.daily_like_limit = limit;
        self.utc_offset = utc_offset;
        self
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    pub fn daily_like_limit(&self) -> Option<u32> {
        self.daily_like_limit
    }

    /// Local calendar day containing `now` and the instant it started
    fn local_day(&self, now: DateTime<Utc>) -> (NaiveDate, DateTime<Utc>) {
        let date = now.with_timezone(&self.utc_offset).date_naive();
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = local_midnight - chrono::Duration::seconds(i64::from(self.utc_offset.local_minus_utc()));
        (date, Utc.from_utc_datetime(&start))
    }

    /// Record a decision and create the match when it completes a mutual like
    ///
    /// Returns the match if the pair is now matched. Two users liking each
    /// other at the same time both get the same match back.
    pub async fn record_decision(
        &self,
        actor: &str,
        target: &str,
        direction: Direction,
    ) -> Result<Option<Match>, EngineError> {
        if actor == target {
            return Err(EngineError::SelfInteraction);
        }

        let now = self.clock.now();
        let decision = Decision::new(actor, target, direction, now);

        let options = SaveOptions {
            overwrite: self.policy == DecisionPolicy::Overwrite,
            like_quota: self.daily_like_limit.map(|limit| LikeQuota {
                since: self.local_day(now).1,
                limit,
            }),
        };

        let previous = match self.interactions.save_decision(&decision, options).await? {
            SaveOutcome::Inserted => None,
            SaveOutcome::Replaced(previous) => {
                info!("{} changed decision on {} to {}", actor, target, direction.as_str());
                Some(previous)
            }
            SaveOutcome::Rejected(_) => {
                return Err(EngineError::DuplicateDecision {
                    actor: actor.to_string(),
                    target: target.to_string(),
                });
            }
            SaveOutcome::Matched(_) => {
                return Err(EngineError::MatchedDecision {
                    actor: actor.to_string(),
                    target: target.to_string(),
                });
            }
            SaveOutcome::QuotaExceeded { used } => {
                info!("{} hit the daily like limit ({} used)", actor, used);
                return Err(EngineError::DailyLimitReached {
                    limit: self.daily_like_limit.unwrap_or(used),
                });
            }
        };

        info!("Recorded {} from {} on {}", direction.as_str(), actor, target);

        let (matched, created) = match self.resolve_match(&decision, now).await {
            Ok(result) => result,
            Err(e) => {
                self.compensate(&decision, previous.as_ref()).await;
                return Err(e);
            }
        };

        let created_id = if created {
            matched.as_ref().map(|m| m.id.clone())
        } else {
            None
        };
        if let Err(e) = self.undo.register(&decision, previous, created_id).await {
            warn!("Could not register undo for {}: {}", actor, e);
        }

        Ok(matched)
    }

    /// For a like, check for the reciprocal like and compare-and-create the match
    async fn resolve_match(
        &self,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<(Option<Match>, bool), EngineError> {
        if !decision.is_like() {
            return Ok((None, false));
        }
        if !self
            .interactions
            .mutual_like_exists(&decision.actor, &decision.target)
            .await?
        {
            return Ok((None, false));
        }

        let candidate = Match::new_active(&decision.actor, &decision.target, now);
        let mut attempt = 0;

        loop {
            attempt += 1;

            // A retried call may have landed before the error came back
            if attempt > 1 {
                if let Some(existing) = self.interactions.get_match(&candidate.id).await? {
                    return Ok((Some(existing), false));
                }
            }

            match self.interactions.create_match(&candidate).await {
                Ok(true) => {
                    info!(
                        "Match {} created between {} and {}",
                        candidate.id, candidate.user_a, candidate.user_b
                    );
                    return Ok((Some(candidate), true));
                }
                Ok(false) => {
                    // The other like was withdrawn after the check
                    debug!("Mutual like for {} vanished before the match was created", candidate.id);
                    return Ok((None, false));
                }
                Err(StorageError::DuplicateMatch(id)) => {
                    // Lost the race; the other side created it
                    if let Some(existing) = self.interactions.get_match(&id).await? {
                        return Ok((Some(existing), false));
                    }
                    if attempt >= MAX_MATCH_ATTEMPTS {
                        return Err(EngineError::DuplicateMatchAttempt(id));
                    }
                }
                Err(e) if e.is_transient() && attempt < MAX_MATCH_ATTEMPTS => {
                    warn!(
                        "Transient error creating match {} (attempt {}): {}",
                        candidate.id, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Roll back a saved decision after the match step failed
    async fn compensate(&self, decision: &Decision, previous: Option<&Decision>) {
        if let Err(e) = self.interactions.undo_decision(decision.id, None, previous).await {
            warn!(
                "Failed to roll back decision {} from {}: {}",
                decision.id, decision.actor, e
            );
        }
    }

    /// The match between two users, if any; argument order does not matter
    pub async fn get_match(&self, a: &str, b: &str) -> Result<Option<Match>, EngineError> {
        Ok(self.interactions.get_match(&match_id(a, b)).await?)
    }

    pub async fn get_match_by_id(&self, id: &str) -> Result<Option<Match>, EngineError> {
        Ok(self.interactions.get_match(id).await?)
    }

    /// Every match the user is part of, newest first
    pub async fn matches_for(&self, user_id: &str) -> Result<Vec<Match>, EngineError> {
        Ok(self.interactions.matches_for(user_id).await?)
    }

    pub async fn active_matches_for(&self, user_id: &str) -> Result<Vec<Match>, EngineError> {
        let mut matches = self.matches_for(user_id).await?;
        matches.retain(Match::is_active);
        Ok(matches)
    }

    pub async fn get_decision(&self, actor: &str, target: &str) -> Result<Option<Decision>, EngineError> {
        Ok(self.interactions.get_decision(actor, target).await?)
    }

    /// Likes the actor has used today and what is left of the limit
    pub async fn daily_like_status(&self, actor: &str) -> Result<DailyLikeStatus, EngineError> {
        let (date, start) = self.local_day(self.clock.now());
        let likes_used = self.interactions.count_likes_since(actor, start).await?;

        Ok(DailyLikeStatus {
            likes_used,
            likes_remaining: self.daily_like_limit.map(|limit| limit.saturating_sub(likes_used)),
            date,
            resets_at: start + chrono::Duration::days(1),
        })
    }

    /// Active users who liked `user_id` and are still waiting on them, newest like first
    ///
    /// Skips anyone the user already decided on, anyone on either side of a
    /// block, and anyone the user is or was matched with.
    pub async fn pending_likers(&self, user_id: &str) -> Result<Vec<PendingLiker>, EngineError> {
        let decided = self.interactions.decided_ids(user_id).await?;
        let blocked = self.blocks.blocked_ids(user_id).await?;
        let matched: HashSet<UserId> = self
            .interactions
            .matches_for(user_id)
            .await?
            .iter()
            .filter_map(|m| m.other_user(user_id).map(str::to_string))
            .collect();

        let mut pending = Vec::new();
        for like in self.interactions.likers_of(user_id).await? {
            if decided.contains(&like.actor) || blocked.contains(&like.actor) || matched.contains(&like.actor) {
                continue;
            }
            match self.profiles.get_profile(&like.actor).await? {
                Some(profile) if profile.is_active() => pending.push(PendingLiker {
                    profile,
                    liked_at: like.decided_at,
                }),
                _ => {}
            }
        }

        pending.sort_by(|a, b| {
            b.liked_at
                .cmp(&a.liked_at)
                .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
        });
        Ok(pending)
    }

    pub async fn unmatch(&self, match_id: &str, user_id: &str) -> Result<Match, EngineError> {
        self.transition(match_id, user_id, MatchState::Unmatched).await
    }

    pub async fn block(&self, match_id: &str, user_id: &str) -> Result<Match, EngineError> {
        self.transition(match_id, user_id, MatchState::Blocked).await
    }

    pub async fn befriend(&self, match_id: &str, user_id: &str) -> Result<Match, EngineError> {
        self.transition(match_id, user_id, MatchState::Friends).await
    }

    pub async fn graceful_exit(&self, match_id: &str, user_id: &str) -> Result<Match, EngineError> {
        self.transition(match_id, user_id, MatchState::GracefulExit).await
    }

    /// Validate against the stored state and compare-and-set the result
    ///
    /// A concurrent transition that lands first makes the write miss; the
    /// match is then re-read and the move validated again from its new state.
    async fn transition(&self, id: &str, user_id: &str, to: MatchState) -> Result<Match, EngineError> {
        let mut last_seen = MatchState::Active;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let mut current = self
                .interactions
                .get_match(id)
                .await?
                .ok_or_else(|| EngineError::MatchNotFound(id.to_string()))?;

            let from = current.state;
            current.transition(to, user_id, self.clock.now())?;

            if self.interactions.update_match(&current, from).await? {
                info!("Match {} moved from {} to {} by {}", id, from.as_str(), to.as_str(), user_id);
                return Ok(current);
            }

            debug!("Match {} left {} before {} could apply; re-reading", id, from.as_str(), to.as_str());
            last_seen = from;
        }

        warn!("Giving up moving match {} to {} after repeated conflicts", id, to.as_str());
        Err(MatchTransitionError::InvalidTransition { from: last_seen, to }.into())
    }
}
