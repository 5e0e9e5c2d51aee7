use crate::core::{
    clock::Clock,
    distance::profile_distance,
    error::EngineError,
    filters::{evaluate_stages, FilterStage},
};
use crate::models::{DailyPick, DailyPickEntry, Profile, UserId};
use crate::services::{BlockList, DailyPickCache, InteractionStore, ProfileSource};
use chrono::{FixedOffset, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Reasons that fit any pick
const FALLBACK_REASONS: [&str; 5] = [
    "Our algorithm thinks you might click!",
    "Something different today!",
    "Expand your horizons!",
    "Why not give them a chance?",
    "Could be a pleasant surprise!",
];

/// Seed for a (seeker, date) pair
pub fn pick_seed(seeker_id: &str, date: NaiveDate) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seeker_id.as_bytes());
    hasher.update(b"|");
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    seed
}

/// Deterministic once-a-day recommendation outside ranked browsing
#[derive(Clone)]
pub struct DailyPickSelector {
    profiles: Arc<dyn ProfileSource>,
    interactions: Arc<dyn InteractionStore>,
    blocks: Arc<dyn BlockList>,
    cache: Arc<dyn DailyPickCache>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
}

impl DailyPickSelector {
    pub fn new(
        profiles: Arc<dyn ProfileSource>,
        interactions: Arc<dyn InteractionStore>,
        blocks: Arc<dyn BlockList>,
        cache: Arc<dyn DailyPickCache>,
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            profiles,
            interactions,
            blocks,
            cache,
            clock,
            utc_offset,
        }
    }

    /// Calendar date in the configured zone
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.utc_offset).date_naive()
    }

    /// Daily pick for `seeker` on `date`
    ///
    /// Repeated calls for the same key return the same candidate while it stays
    /// eligible. Once the seeker has decided on it there is no pick for the
    /// rest of that day. If it got blocked or deactivated a replacement is drawn.
    pub async fn get_daily_pick(&self, seeker: &Profile, date: NaiveDate) -> Result<Option<DailyPick>, EngineError> {
        if !seeker.is_active() {
            return Err(EngineError::InvalidSeekerState {
                user_id: seeker.user_id.clone(),
                state: seeker.state,
            });
        }

        let blocked = self.blocks.blocked_ids(&seeker.user_id).await?;

        let entry = match self.cache.get(&seeker.user_id, date).await? {
            Some(cached) => {
                if self
                    .interactions
                    .get_decision(&seeker.user_id, &cached.candidate_id)
                    .await?
                    .is_some()
                {
                    debug!("{} already decided on today's pick", seeker.user_id);
                    return Ok(None);
                }

                match self.profiles.get_profile(&cached.candidate_id).await? {
                    Some(profile) if is_eligible(seeker, &profile, &blocked) => {
                        return Ok(Some(self.build_pick(seeker, profile, date, cached.viewed)));
                    }
                    _ => {}
                }

                info!(
                    "Daily pick {} for {} is no longer eligible, drawing again",
                    cached.candidate_id, seeker.user_id
                );
                let Some(replacement) = self.draw(seeker, date, &blocked).await? else {
                    return Ok(None);
                };
                self.cache
                    .replace_if(&seeker.user_id, date, &cached.candidate_id, &replacement)
                    .await?
            }
            None => {
                let Some(drawn) = self.draw(seeker, date, &blocked).await? else {
                    return Ok(None);
                };
                self.cache.put_if_absent(&seeker.user_id, date, &drawn).await?
            }
        };

        // The stored entry may come from a concurrent caller
        match self.profiles.get_profile(&entry.candidate_id).await? {
            Some(profile) => Ok(Some(self.build_pick(seeker, profile, date, entry.viewed))),
            None => Ok(None),
        }
    }

    /// Record that the seeker has opened the pick
    pub async fn mark_viewed(&self, seeker_id: &str, date: NaiveDate) -> Result<bool, EngineError> {
        Ok(self.cache.mark_viewed(seeker_id, date).await?)
    }

    pub async fn has_viewed(&self, seeker_id: &str, date: NaiveDate) -> Result<bool, EngineError> {
        Ok(self.cache.get(seeker_id, date).await?.is_some_and(|e| e.viewed))
    }

    /// Drop cached picks older than `date`
    pub async fn purge_before(&self, date: NaiveDate) -> Result<u64, EngineError> {
        Ok(self.cache.purge_before(date).await?)
    }

    /// Draw from the eligible pool with the (seeker, date) seed
    async fn draw(
        &self,
        seeker: &Profile,
        date: NaiveDate,
        blocked: &HashSet<UserId>,
    ) -> Result<Option<DailyPickEntry>, EngineError> {
        let mut excluded = self.interactions.decided_ids(&seeker.user_id).await?;
        excluded.extend(blocked.iter().cloned());

        let mut pool: Vec<Profile> = self
            .profiles
            .list_active()
            .await?
            .into_iter()
            .filter(|candidate| is_eligible(seeker, candidate, &excluded))
            .collect();

        if pool.is_empty() {
            debug!("No daily pick candidates for {}", seeker.user_id);
            return Ok(None);
        }

        pool.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let picked = select_index(&seeker.user_id, date, pool.len());

        Ok(Some(DailyPickEntry {
            candidate_id: pool.swap_remove(picked).user_id,
            viewed: false,
        }))
    }

    fn build_pick(&self, seeker: &Profile, candidate: Profile, date: NaiveDate, viewed: bool) -> DailyPick {
        let reason = generate_reason(seeker, &candidate, date);
        DailyPick {
            candidate,
            date,
            reason,
            already_seen: viewed,
        }
    }
}

/// Stages 1-4 of the candidate pipeline
fn is_eligible(seeker: &Profile, candidate: &Profile, excluded: &HashSet<UserId>) -> bool {
    evaluate_stages(seeker, candidate, excluded, FilterStage::Gender).is_ok()
}

/// Index into a pool of `len` candidates sorted by id
pub fn select_index(seeker_id: &str, date: NaiveDate, len: usize) -> usize {
    let mut rng = StdRng::from_seed(pick_seed(seeker_id, date));
    rng.gen_range(0..len)
}

/// Explain the pick; deterministic for the (seeker, date, candidate) triple
pub fn generate_reason(seeker: &Profile, candidate: &Profile, date: NaiveDate) -> String {
    let mut reasons: Vec<&str> = Vec::new();

    match profile_distance(seeker, candidate) {
        Some(d) if d < 5.0 => reasons.push("Lives nearby!"),
        Some(d) if d < 10.0 => reasons.push("Close enough for coffee!"),
        _ => {}
    }

    match seeker.age.abs_diff(candidate.age) {
        0..=2 => reasons.push("Similar age"),
        3..=5 => reasons.push("Age-appropriate match"),
        _ => {}
    }

    let a = &seeker.lifestyle;
    let b = &candidate.lifestyle;
    if a.looking_for.is_some() && a.looking_for == b.looking_for {
        reasons.push("Looking for the same thing");
    }
    if a.wants_kids.is_some() && a.wants_kids == b.wants_kids {
        reasons.push("Same stance on kids");
    }
    if a.drinking.is_some() && a.drinking == b.drinking {
        reasons.push("Compatible drinking habits");
    }
    if a.smoking.is_some() && a.smoking == b.smoking {
        reasons.push("Compatible smoking habits");
    }

    match seeker.interests.intersection(&candidate.interests).count() {
        0 => {}
        1 | 2 => reasons.push("Some shared interests"),
        _ => reasons.push("Many shared interests!"),
    }

    reasons.extend(FALLBACK_REASONS);

    // Separate stream from the selection so reasons never shift the pick
    let mut seed = pick_seed(&seeker.user_id, date);
    for (byte, extra) in seed.iter_mut().zip(Sha256::digest(candidate.user_id.as_bytes())) {
        *byte ^= extra;
    }
    let mut rng = StdRng::from_seed(seed);
    reasons[rng.gen_range(0..reasons.len())].to_string()
}
