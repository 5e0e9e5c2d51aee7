//! In-process implementations of the storage traits.
//!
//! Each store keeps its state behind a single `RwLock`, so every trait call
//! is one critical section. Used by tests and by single-node deployments
//! that run without PostgreSQL or Redis.

use crate::models::{match_id, ActivityState, DailyPickEntry, Decision, Match, MatchState, Profile, UndoSlot, UserId};
use crate::services::store::{
    BlockList, DailyPickCache, InteractionStore, ProfileSource, SaveOptions, SaveOutcome, StorageError, UndoRemoval,
    UndoStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct InteractionState {
    decisions: HashMap<(UserId, UserId), Decision>,
    matches: HashMap<String, Match>,
}

impl InteractionState {
    fn remove_decision_by_id(&mut self, decision_id: Uuid) -> bool {
        let key = self
            .decisions
            .iter()
            .find(|(_, d)| d.id == decision_id)
            .map(|(k, _)| k.clone());

        match key {
            Some(key) => self.decisions.remove(&key).is_some(),
            None => false,
        }
    }

    fn liked(&self, actor: &str, target: &str) -> bool {
        self.decisions
            .get(&(actor.to_string(), target.to_string()))
            .is_some_and(Decision::is_like)
    }

    /// Likes by `actor` since `since`, not counting the one on `except`
    fn likes_since(&self, actor: &str, since: DateTime<Utc>, except: &str) -> u32 {
        let count = self
            .decisions
            .values()
            .filter(|d| d.actor == actor && d.target != except && d.is_like() && d.decided_at >= since)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// Decisions and matches held in memory
#[derive(Debug, Default)]
pub struct InMemoryInteractionStore {
    state: RwLock<InteractionState>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn decision_count(&self) -> usize {
        self.state.read().await.decisions.len()
    }

    pub async fn match_count(&self) -> usize {
        self.state.read().await.matches.len()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn save_decision(&self, decision: &Decision, options: SaveOptions) -> Result<SaveOutcome, StorageError> {
        let mut state = self.state.write().await;
        let key = (decision.actor.clone(), decision.target.clone());
        let existing = state.decisions.get(&key).cloned();

        if let Some(existing) = &existing {
            if !options.overwrite {
                return Ok(SaveOutcome::Rejected(existing.clone()));
            }
            if existing.is_like()
                && !decision.is_like()
                && state.matches.contains_key(&match_id(&decision.actor, &decision.target))
            {
                return Ok(SaveOutcome::Matched(existing.clone()));
            }
        }

        if let (true, Some(quota)) = (decision.is_like(), options.like_quota) {
            let used = state.likes_since(&decision.actor, quota.since, &decision.target);
            if used >= quota.limit {
                return Ok(SaveOutcome::QuotaExceeded { used });
            }
        }

        state.decisions.insert(key, decision.clone());
        Ok(existing.map_or(SaveOutcome::Inserted, SaveOutcome::Replaced))
    }

    async fn get_decision(&self, actor: &str, target: &str) -> Result<Option<Decision>, StorageError> {
        let state = self.state.read().await;
        Ok(state.decisions.get(&(actor.to_string(), target.to_string())).cloned())
    }

    async fn delete_decision(&self, decision_id: Uuid) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        Ok(state.remove_decision_by_id(decision_id))
    }

    async fn mutual_like_exists(&self, a: &str, b: &str) -> Result<bool, StorageError> {
        let state = self.state.read().await;
        Ok(state.liked(a, b) && state.liked(b, a))
    }

    async fn decided_ids(&self, actor: &str) -> Result<HashSet<UserId>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .decisions
            .keys()
            .filter(|(a, _)| a == actor)
            .map(|(_, target)| target.clone())
            .collect())
    }

    async fn likers_of(&self, target: &str) -> Result<Vec<Decision>, StorageError> {
        let state = self.state.read().await;
        let mut likes: Vec<Decision> = state
            .decisions
            .values()
            .filter(|d| d.target == target && d.is_like())
            .cloned()
            .collect();
        likes.sort_by(|a, b| b.decided_at.cmp(&a.decided_at).then_with(|| a.actor.cmp(&b.actor)));
        Ok(likes)
    }

    async fn count_likes_since(&self, actor: &str, since: DateTime<Utc>) -> Result<u32, StorageError> {
        Ok(self.state.read().await.likes_since(actor, since, ""))
    }

    async fn create_match(&self, new_match: &Match) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        if state.matches.contains_key(&new_match.id) {
            return Err(StorageError::DuplicateMatch(new_match.id.clone()));
        }
        if !(state.liked(&new_match.user_a, &new_match.user_b) && state.liked(&new_match.user_b, &new_match.user_a)) {
            return Ok(false);
        }
        state.matches.insert(new_match.id.clone(), new_match.clone());
        Ok(true)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StorageError> {
        Ok(self.state.read().await.matches.get(match_id).cloned())
    }

    async fn update_match(&self, updated: &Match, expected: MatchState) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        match state.matches.get_mut(&updated.id) {
            Some(existing) if existing.state == expected => {
                *existing = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn matches_for(&self, user_id: &str) -> Result<Vec<Match>, StorageError> {
        let state = self.state.read().await;
        let mut matches: Vec<Match> = state.matches.values().filter(|m| m.involves(user_id)).cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn undo_decision(
        &self,
        decision_id: Uuid,
        match_id: Option<&str>,
        restore: Option<&Decision>,
    ) -> Result<Option<UndoRemoval>, StorageError> {
        let mut state = self.state.write().await;
        if !state.remove_decision_by_id(decision_id) {
            return Ok(None);
        }
        if let Some(previous) = restore {
            state
                .decisions
                .insert((previous.actor.clone(), previous.target.clone()), previous.clone());
        }
        let match_deleted = match match_id {
            Some(id) => state.matches.remove(id).is_some(),
            None => false,
        };
        Ok(Some(UndoRemoval { match_deleted }))
    }
}

/// Undo slots held in memory
#[derive(Debug, Default)]
pub struct InMemoryUndoStore {
    slots: RwLock<HashMap<UserId, UndoSlot>>,
}

impl InMemoryUndoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

#[async_trait]
impl UndoStore for InMemoryUndoStore {
    async fn put(&self, slot: &UndoSlot) -> Result<(), StorageError> {
        self.slots.write().await.insert(slot.actor.clone(), slot.clone());
        Ok(())
    }

    async fn get(&self, actor: &str) -> Result<Option<UndoSlot>, StorageError> {
        Ok(self.slots.read().await.get(actor).cloned())
    }

    async fn take(&self, actor: &str, decision_id: Uuid) -> Result<Option<UndoSlot>, StorageError> {
        let mut slots = self.slots.write().await;
        match slots.get(actor) {
            Some(slot) if slot.decision.id == decision_id => Ok(slots.remove(actor)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, actor: &str) -> Result<(), StorageError> {
        self.slots.write().await.remove(actor);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now));
        Ok((before - slots.len()) as u64)
    }
}

/// Daily pick cache held in memory
#[derive(Debug, Default)]
pub struct InMemoryDailyPickCache {
    entries: RwLock<HashMap<(UserId, NaiveDate), DailyPickEntry>>,
}

impl InMemoryDailyPickCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DailyPickCache for InMemoryDailyPickCache {
    async fn get(&self, seeker: &str, date: NaiveDate) -> Result<Option<DailyPickEntry>, StorageError> {
        Ok(self.entries.read().await.get(&(seeker.to_string(), date)).cloned())
    }

    async fn put_if_absent(
        &self,
        seeker: &str,
        date: NaiveDate,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .entry((seeker.to_string(), date))
            .or_insert_with(|| entry.clone())
            .clone())
    }

    async fn replace_if(
        &self,
        seeker: &str,
        date: NaiveDate,
        expected_candidate: &str,
        entry: &DailyPickEntry,
    ) -> Result<DailyPickEntry, StorageError> {
        let mut entries = self.entries.write().await;
        let key = (seeker.to_string(), date);
        match entries.get_mut(&key) {
            Some(current) if current.candidate_id == expected_candidate => {
                *current = entry.clone();
                Ok(current.clone())
            }
            Some(current) => Ok(current.clone()),
            None => {
                entries.insert(key, entry.clone());
                Ok(entry.clone())
            }
        }
    }

    async fn mark_viewed(&self, seeker: &str, date: NaiveDate) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&(seeker.to_string(), date)) {
            Some(entry) => {
                entry.viewed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_before(&self, date: NaiveDate) -> Result<u64, StorageError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(_, d), _| *d >= date);
        Ok((before - entries.len()) as u64)
    }
}

/// Profile directory held in memory
#[derive(Debug, Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<UserId, Profile>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.user_id.clone(), profile);
    }

    /// Change a profile's activity state; false when the profile is unknown
    pub async fn set_state(&self, user_id: &str, state: ActivityState) -> bool {
        match self.profiles.write().await.get_mut(user_id) {
            Some(profile) => {
                profile.state = state;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, user_id: &str) -> Option<Profile> {
        self.profiles.write().await.remove(user_id)
    }
}

#[async_trait]
impl ProfileSource for InMemoryProfileDirectory {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StorageError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Profile>, StorageError> {
        let profiles = self.profiles.read().await;
        let mut active: Vec<Profile> = profiles.values().filter(|p| p.is_active()).cloned().collect();
        active.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(active)
    }
}

/// Directed block relationships held in memory
#[derive(Debug, Default)]
pub struct InMemoryBlockList {
    blocks: RwLock<HashSet<(UserId, UserId)>>,
}

impl InMemoryBlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, blocker: &str, blocked: &str) {
        self.blocks.write().await.insert((blocker.to_string(), blocked.to_string()));
    }

    pub async fn unblock(&self, blocker: &str, blocked: &str) -> bool {
        self.blocks.write().await.remove(&(blocker.to_string(), blocked.to_string()))
    }
}

#[async_trait]
impl BlockList for InMemoryBlockList {
    async fn blocked_ids(&self, user_id: &str) -> Result<HashSet<UserId>, StorageError> {
        let blocks = self.blocks.read().await;
        Ok(blocks
            .iter()
            .filter_map(|(blocker, blocked)| {
                if blocker == user_id {
                    Some(blocked.clone())
                } else if blocked == user_id {
                    Some(blocker.clone())
                } else {
                    None
                }
            })
            .collect())
    }
}
