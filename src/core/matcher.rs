use crate::core::{
    distance::profile_distance,
    error::EngineError,
    filters::{evaluate_stages, FilterStage},
    scoring::CompatibilityScorer,
};
use crate::models::{Profile, ScoredCandidate, UserId};
use crate::services::{BlockList, InteractionStore};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Result of the candidate search
#[derive(Debug)]
pub struct MatchResult {
    pub candidates: Vec<ScoredCandidate>,
    pub total_pool: usize,
}

/// Candidate filter pipeline
///
/// # Pipeline Stages
/// 1. Not the seeker
/// 2. Candidate is ACTIVE
/// 3. Not already decided on, not blocked either way
/// 4. Mutual gender preference
/// 5. Mutual age preference
/// 6. Within the seeker's max distance
/// 7. Seeker's dealbreakers
///
/// Survivors are ranked by distance, scored and truncated.
#[derive(Clone)]
pub struct Matcher {
    scorer: CompatibilityScorer,
    interactions: Arc<dyn InteractionStore>,
    blocks: Arc<dyn BlockList>,
}

impl Matcher {
    pub fn new(
        scorer: CompatibilityScorer,
        interactions: Arc<dyn InteractionStore>,
        blocks: Arc<dyn BlockList>,
    ) -> Self {
        Self {
            scorer,
            interactions,
            blocks,
        }
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Find candidates for an ACTIVE seeker
    ///
    /// Exclusions (prior decisions and blocks) are read once per call.
    ///
    /// # Arguments
    /// * `seeker` - The browsing profile
    /// * `pool` - Candidate profiles to consider
    /// * `limit` - Maximum number of candidates to return
    pub async fn find_candidates(
        &self,
        seeker: &Profile,
        pool: Vec<Profile>,
        limit: usize,
    ) -> Result<MatchResult, EngineError> {
        if !seeker.is_active() {
            return Err(EngineError::InvalidSeekerState {
                user_id: seeker.user_id.clone(),
                state: seeker.state,
            });
        }

        let total_pool = pool.len();
        if pool.is_empty() {
            return Ok(MatchResult {
                candidates: Vec::new(),
                total_pool,
            });
        }

        let excluded = self.excluded_ids(&seeker.user_id).await?;
        let candidates = filter_candidates(&self.scorer, seeker, pool, &excluded, limit);

        debug!(
            "Seeker {} has {} candidates out of {} profiles",
            seeker.user_id,
            candidates.len(),
            total_pool
        );

        Ok(MatchResult {
            candidates,
            total_pool,
        })
    }

    /// Prior decisions plus blocks in either direction
    pub async fn excluded_ids(&self, user_id: &str) -> Result<HashSet<UserId>, EngineError> {
        let mut excluded = self.interactions.decided_ids(user_id).await?;
        excluded.extend(self.blocks.blocked_ids(user_id).await?);
        Ok(excluded)
    }
}

/// Run the full pipeline over an in-memory pool
pub fn filter_candidates(
    scorer: &CompatibilityScorer,
    seeker: &Profile,
    pool: Vec<Profile>,
    excluded: &HashSet<UserId>,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let mut survivors: Vec<(Profile, Option<f64>)> = pool
        .into_iter()
        .filter(|candidate| {
            match evaluate_stages(seeker, candidate, excluded, FilterStage::Dealbreakers) {
                Ok(()) => true,
                Err(stage) => {
                    debug!(
                        "Rejected {} for {}: {}",
                        candidate.user_id,
                        seeker.user_id,
                        stage.rejection_reason()
                    );
                    false
                }
            }
        })
        .map(|candidate| {
            let distance = profile_distance(seeker, &candidate);
            (candidate, distance)
        })
        .collect();

    // Sort by distance (ascending), unknown distance last, then by id
    survivors.sort_by(|(a, da), (b, db)| {
        let by_distance = match (da, db) {
            (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_distance.then_with(|| a.user_id.cmp(&b.user_id))
    });

    survivors.truncate(limit);

    survivors
        .into_iter()
        .map(|(profile, distance_km)| {
            let score = scorer.score(seeker, &profile);
            ScoredCandidate {
                profile,
                distance_km,
                score,
            }
        })
        .collect()
}

/// First stage that rejects `candidate`, or `None` when it would be shown
pub fn explain_rejection(seeker: &Profile, candidate: &Profile, excluded: &HashSet<UserId>) -> Option<FilterStage> {
    evaluate_stages(seeker, candidate, excluded, FilterStage::Dealbreakers).err()
}
