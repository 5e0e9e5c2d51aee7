use crate::core::distance::profile_distance;
use crate::models::{Dealbreakers, Profile, UserId};
use serde::Serialize;
use std::collections::HashSet;

/// Stages of the candidate filter pipeline, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    NotSelf,
    Active,
    NotInteracted,
    Gender,
    Age,
    Distance,
    Dealbreakers,
}

impl FilterStage {
    pub const ALL: [FilterStage; 7] = [
        FilterStage::NotSelf,
        FilterStage::Active,
        FilterStage::NotInteracted,
        FilterStage::Gender,
        FilterStage::Age,
        FilterStage::Distance,
        FilterStage::Dealbreakers,
    ];

    /// Human-readable rejection reason
    pub fn rejection_reason(self) -> &'static str {
        match self {
            FilterStage::NotSelf => "is self",
            FilterStage::Active => "not active",
            FilterStage::NotInteracted => "already interacted or blocked",
            FilterStage::Gender => "gender mismatch",
            FilterStage::Age => "age mismatch",
            FilterStage::Distance => "too far",
            FilterStage::Dealbreakers => "dealbreaker hit",
        }
    }
}

/// Run the stages in order up to and including `last`.
///
/// Short-circuits on the first failing stage and returns it.
pub fn evaluate_stages(
    seeker: &Profile,
    candidate: &Profile,
    excluded: &HashSet<UserId>,
    last: FilterStage,
) -> Result<(), FilterStage> {
    for stage in FilterStage::ALL.into_iter().take_while(|s| *s <= last) {
        let passed = match stage {
            FilterStage::NotSelf => candidate.user_id != seeker.user_id,
            FilterStage::Active => candidate.is_active(),
            FilterStage::NotInteracted => !excluded.contains(&candidate.user_id),
            FilterStage::Gender => matches_gender_preferences(seeker, candidate),
            FilterStage::Age => matches_age_preferences(seeker, candidate),
            FilterStage::Distance => is_within_distance(seeker, candidate),
            FilterStage::Dealbreakers => passes_dealbreakers(seeker, candidate),
        };
        if !passed {
            return Err(stage);
        }
    }
    Ok(())
}

/// Gender preferences must match both ways
#[inline]
pub fn matches_gender_preferences(seeker: &Profile, candidate: &Profile) -> bool {
    match (seeker.gender, candidate.gender) {
        (Some(seeker_gender), Some(candidate_gender)) => {
            seeker.interested_in.contains(&candidate_gender) && candidate.interested_in.contains(&seeker_gender)
        }
        _ => false,
    }
}

/// Each age must fall in the other's preferred range; bounds are inclusive
#[inline]
pub fn matches_age_preferences(seeker: &Profile, candidate: &Profile) -> bool {
    // Zero means the birth date is missing
    if seeker.age == 0 || candidate.age == 0 {
        return false;
    }

    let candidate_in_seeker_range = candidate.age >= seeker.min_age && candidate.age <= seeker.max_age;
    let seeker_in_candidate_range = seeker.age >= candidate.min_age && seeker.age <= candidate.max_age;

    candidate_in_seeker_range && seeker_in_candidate_range
}

/// Candidate lies within the seeker's max distance (inclusive).
///
/// When either side has no location the check is skipped.
#[inline]
pub fn is_within_distance(seeker: &Profile, candidate: &Profile) -> bool {
    match profile_distance(seeker, candidate) {
        Some(distance_km) => distance_km <= seeker.max_distance_km,
        None => true,
    }
}

/// Evaluate the seeker's dealbreakers against the candidate.
///
/// One-directional: the candidate's own dealbreakers are not consulted.
/// A missing lifestyle field fails a dealbreaker on that field, except height,
/// which is optional and passes when unset.
pub fn passes_dealbreakers(seeker: &Profile, candidate: &Profile) -> bool {
    let db = &seeker.dealbreakers;
    if !db.has_any() {
        return true;
    }
    dealbreaker_failures(db, seeker.age, candidate).is_empty()
}

/// List which of the seeker's dealbreakers the candidate fails
pub fn dealbreaker_failures(db: &Dealbreakers, seeker_age: u8, candidate: &Profile) -> Vec<String> {
    let mut failures = Vec::new();
    let lifestyle = &candidate.lifestyle;

    if !db.acceptable_smoking.is_empty() {
        match lifestyle.smoking {
            None => failures.push("Smoking status not specified".to_string()),
            Some(s) if !db.acceptable_smoking.contains(&s) => failures.push(format!("Smoking: {:?}", s)),
            _ => {}
        }
    }

    if !db.acceptable_drinking.is_empty() {
        match lifestyle.drinking {
            None => failures.push("Drinking status not specified".to_string()),
            Some(d) if !db.acceptable_drinking.contains(&d) => failures.push(format!("Drinking: {:?}", d)),
            _ => {}
        }
    }

    if !db.acceptable_kids_stance.is_empty() {
        match lifestyle.wants_kids {
            None => failures.push("Kids stance not specified".to_string()),
            Some(k) if !db.acceptable_kids_stance.contains(&k) => failures.push(format!("Kids: {:?}", k)),
            _ => {}
        }
    }

    if !db.acceptable_looking_for.is_empty() {
        match lifestyle.looking_for {
            None => failures.push("Relationship goal not specified".to_string()),
            Some(l) if !db.acceptable_looking_for.contains(&l) => {
                failures.push(format!("Looking for: {}", l.display_name()))
            }
            _ => {}
        }
    }

    if !db.acceptable_education.is_empty() {
        match lifestyle.education {
            None => failures.push("Education not specified".to_string()),
            Some(e) if !db.acceptable_education.contains(&e) => failures.push(format!("Education: {:?}", e)),
            _ => {}
        }
    }

    if let Some(height) = lifestyle.height_cm {
        if db.min_height_cm.is_some_and(|min| height < min) {
            failures.push(format!("Height too short: {} cm", height));
        }
        if db.max_height_cm.is_some_and(|max| height > max) {
            failures.push(format!("Height too tall: {} cm", height));
        }
    }

    if let Some(max_diff) = db.max_age_difference {
        if seeker_age > 0 && candidate.age > 0 {
            let diff = seeker_age.abs_diff(candidate.age);
            if diff > max_diff {
                failures.push(format!("Age difference: {} years (max: {})", diff, max_diff));
            }
        }
    }

    failures
}
