use crate::core::{clock::Clock, error::EngineError};
use crate::models::{match_id, Decision, Match, UndoSlot};
use crate::services::{InteractionStore, StorageError, UndoStore};
use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

/// Default undo window in seconds
pub const DEFAULT_UNDO_WINDOW_SECS: i64 = 30;

/// What an undo changed
#[derive(Debug, Clone, PartialEq)]
pub struct UndoOutcome {
    pub decision: Decision,
    /// Decision put back in place of the undone one
    pub restored: Option<Decision>,
    pub match_deleted: bool,
    /// Match recreated because the restored decision completes a mutual like
    pub restored_match: Option<Match>,
}

/// Single-slot, time-windowed reversal of an actor's last decision
#[derive(Clone)]
pub struct UndoController {
    interactions: Arc<dyn InteractionStore>,
    store: Arc<dyn UndoStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl UndoController {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        store: Arc<dyn UndoStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            interactions,
            store,
            clock,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Make `decision` the actor's undoable decision, replacing any earlier one
    ///
    /// `previous` is the decision it overwrote, if any.
    pub async fn register(
        &self,
        decision: &Decision,
        previous: Option<Decision>,
        match_id: Option<String>,
    ) -> Result<(), EngineError> {
        let slot = UndoSlot {
            actor: decision.actor.clone(),
            decision: decision.clone(),
            previous,
            match_id,
            expires_at: decision.decided_at + self.window,
        };
        self.store.put(&slot).await?;
        Ok(())
    }

    /// True while the actor has an unexpired slot
    pub async fn can_undo(&self, actor: &str) -> Result<bool, EngineError> {
        let now = self.clock.now();
        Ok(self.store.get(actor).await?.is_some_and(|slot| !slot.is_expired(now)))
    }

    /// Whole seconds left in the window, 0 when nothing is undoable
    pub async fn seconds_remaining(&self, actor: &str) -> Result<i64, EngineError> {
        let now = self.clock.now();
        Ok(match self.store.get(actor).await? {
            Some(slot) if !slot.is_expired(now) => (slot.expires_at - now).num_seconds().max(0),
            _ => 0,
        })
    }

    /// Reverse the actor's last decision
    ///
    /// An overwritten decision is put back in the same storage call. Undoing
    /// a like removes the pair's match, since the like no longer stands.
    /// The slot is claimed with a compare-and-delete, so two concurrent undo
    /// calls cannot both succeed. When the storage write fails the slot is
    /// put back so the user can retry inside the window.
    pub async fn undo(&self, actor: &str) -> Result<UndoOutcome, EngineError> {
        let slot = self.store.get(actor).await?.ok_or(EngineError::NothingToUndo)?;

        if slot.is_expired(self.clock.now()) {
            self.store.take(actor, slot.decision.id).await?;
            return Err(EngineError::UndoExpired);
        }

        let slot = self
            .store
            .take(actor, slot.decision.id)
            .await?
            .ok_or(EngineError::NothingToUndo)?;

        let undone_like = slot.decision.is_like();
        let restores_like = slot.previous.as_ref().is_some_and(Decision::is_like);
        let pair_match = (undone_like && !restores_like).then(|| match_id(actor, &slot.decision.target));

        match self
            .interactions
            .undo_decision(slot.decision.id, pair_match.as_deref(), slot.previous.as_ref())
            .await
        {
            Ok(Some(removal)) => {
                let restored_match = if restores_like && !undone_like {
                    self.rematch(&slot.decision).await
                } else {
                    None
                };

                info!(
                    "Undid {} from {} on {}{}",
                    slot.decision.direction.as_str(),
                    actor,
                    slot.decision.target,
                    if removal.match_deleted { " and removed the match" } else { "" }
                );
                Ok(UndoOutcome {
                    decision: slot.decision,
                    restored: slot.previous,
                    match_deleted: removal.match_deleted,
                    restored_match,
                })
            }
            Ok(None) => Err(EngineError::NothingToUndo),
            Err(e) => {
                warn!("Undo for {} failed, restoring slot: {}", actor, e);
                if let Err(restore_err) = self.store.put(&slot).await {
                    warn!("Failed to restore undo slot for {}: {}", actor, restore_err);
                }
                Err(e.into())
            }
        }
    }

    /// A like came back; match the pair again if the other side still likes them
    async fn rematch(&self, undone: &Decision) -> Option<Match> {
        let candidate = Match::new_active(&undone.actor, &undone.target, self.clock.now());
        match self.interactions.create_match(&candidate).await {
            Ok(true) => {
                info!("Match {} restored by undo from {}", candidate.id, undone.actor);
                Some(candidate)
            }
            Ok(false) | Err(StorageError::DuplicateMatch(_)) => None,
            Err(e) => {
                warn!("Could not restore match {} after undo: {}", candidate.id, e);
                None
            }
        }
    }

    /// Drop the actor's slot, e.g. on logout
    pub async fn clear(&self, actor: &str) -> Result<(), EngineError> {
        self.store.delete(actor).await?;
        Ok(())
    }

    /// Remove every expired slot
    pub async fn purge_expired(&self) -> Result<u64, EngineError> {
        Ok(self.store.delete_expired(self.clock.now()).await?)
    }
}
