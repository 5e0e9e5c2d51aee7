use crate::core::distance::profile_distance;
use crate::core::error::EngineError;
use crate::models::{
    Drinking, LookingFor, PacePreferences, Profile, ScoreBreakdown, ScoringWeights, Smoking, WantsKids,
};

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// Default width of the age band that scores a perfect 1.0
pub const DEFAULT_AGE_TOLERANCE_YEARS: u8 = 2;

/// Minimum total for 5, 4, 3 and 2 stars
pub const STAR_THRESHOLDS: [f64; 4] = [90.0, 75.0, 60.0, 40.0];

pub const MAX_HIGHLIGHTS: usize = 5;

/// Sub-score used when a factor cannot be compared
const NEUTRAL_SCORE: f64 = 0.5;

/// Distances up to this many km score a full 1.0
const FULL_SCORE_DISTANCE_KM: f64 = 1.0;

const PACE_SAME: u32 = 25;
const PACE_ADJACENT: u32 = 15;
const PACE_FAR: u32 = 5;
const PACE_WILDCARD: u32 = 20;

/// Weighted five-factor compatibility scorer
#[derive(Debug, Clone)]
pub struct CompatibilityScorer {
    weights: ScoringWeights,
    age_tolerance_years: u8,
}

impl CompatibilityScorer {
    /// Create a scorer, rejecting weights that are negative, non-finite or don't sum to 1.0
    pub fn new(weights: ScoringWeights, age_tolerance_years: u8) -> Result<Self, EngineError> {
        validate_weights(&weights)?;
        Ok(Self {
            weights,
            age_tolerance_years,
        })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score how well `candidate` fits `seeker`
    pub fn score(&self, seeker: &Profile, candidate: &Profile) -> ScoreBreakdown {
        let distance_km = profile_distance(seeker, candidate);
        let distance_score = calculate_distance_score(distance_km, seeker.max_distance_km);

        let shared_interests: Vec<String> = seeker.interests.intersection(&candidate.interests).cloned().collect();
        let interest_score = calculate_interest_score(seeker, candidate, shared_interests.len());

        let lifestyle_score = calculate_lifestyle_score(seeker, candidate);
        let lifestyle_matches = find_lifestyle_matches(seeker, candidate);

        let age_score = calculate_age_score(seeker, candidate, self.age_tolerance_years);

        let pace_score = match (&seeker.pace, &candidate.pace) {
            (Some(a), Some(b)) => calculate_pace_score(a, b),
            _ => NEUTRAL_SCORE,
        };
        let pace_known = seeker.pace.is_some() && candidate.pace.is_some();

        let w = &self.weights;
        let total = ((distance_score * w.distance
            + interest_score * w.interest
            + lifestyle_score * w.lifestyle
            + age_score * w.age
            + pace_score * w.pace)
            * 100.0)
            .clamp(0.0, 100.0);

        let star_rating = star_rating(total);
        let highlights = generate_highlights(
            seeker,
            candidate,
            distance_km,
            &shared_interests,
            &lifestyle_matches,
            pace_known.then_some(pace_score),
        );

        ScoreBreakdown {
            distance_km,
            distance_score,
            interest_score,
            lifestyle_score,
            age_score,
            pace_score,
            total,
            star_rating,
            label: compatibility_label(star_rating).to_string(),
            shared_interests,
            lifestyle_matches,
            pace_sync_level: if pace_known {
                pace_sync_level(pace_score).to_string()
            } else {
                "Unknown".to_string()
            },
            highlights,
        }
    }
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            age_tolerance_years: DEFAULT_AGE_TOLERANCE_YEARS,
        }
    }
}

/// Check that weights are finite, non-negative and sum to 1.0
pub fn validate_weights(weights: &ScoringWeights) -> Result<(), EngineError> {
    let all = [
        ("distance", weights.distance),
        ("interest", weights.interest),
        ("lifestyle", weights.lifestyle),
        ("age", weights.age),
        ("pace", weights.pace),
    ];

    for (name, value) in all {
        if !value.is_finite() {
            return Err(EngineError::InvalidWeightConfiguration(format!(
                "{} weight is not a finite number",
                name
            )));
        }
        if value < 0.0 {
            return Err(EngineError::InvalidWeightConfiguration(format!(
                "{} weight is negative: {}",
                name, value
            )));
        }
    }

    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::InvalidWeightConfiguration(format!(
            "weights must sum to 1.0, got {:.4}",
            sum
        )));
    }

    Ok(())
}

/// Calculate distance score (0-1)
/// Full marks up to 1km, zero at the seeker's max distance, linear in between
#[inline]
fn calculate_distance_score(distance_km: Option<f64>, max_distance_km: f64) -> f64 {
    let Some(distance) = distance_km else {
        return NEUTRAL_SCORE;
    };

    if distance <= FULL_SCORE_DISTANCE_KM {
        return 1.0;
    }
    if distance >= max_distance_km {
        return 0.0;
    }

    let span = max_distance_km - FULL_SCORE_DISTANCE_KM;
    (1.0 - (distance - FULL_SCORE_DISTANCE_KM) / span).clamp(0.0, 1.0)
}

/// Jaccard similarity of the interest sets
#[inline]
fn calculate_interest_score(seeker: &Profile, candidate: &Profile, shared: usize) -> f64 {
    if seeker.interests.is_empty() || candidate.interests.is_empty() {
        return 0.0;
    }
    let union = seeker.interests.len() + candidate.interests.len() - shared;
    shared as f64 / union as f64
}

/// Average agreement over the lifestyle attributes both sides have set
fn calculate_lifestyle_score(seeker: &Profile, candidate: &Profile) -> f64 {
    let a = &seeker.lifestyle;
    let b = &candidate.lifestyle;

    let factors: Vec<f64> = [
        a.smoking.zip(b.smoking).map(|(x, y)| smoking_agreement(x, y)),
        a.drinking.zip(b.drinking).map(|(x, y)| drinking_agreement(x, y)),
        a.wants_kids.zip(b.wants_kids).map(|(x, y)| kids_agreement(x, y)),
        a.looking_for.zip(b.looking_for).map(|(x, y)| looking_for_agreement(x, y)),
    ]
    .into_iter()
    .flatten()
    .collect();

    if factors.is_empty() {
        return NEUTRAL_SCORE;
    }
    factors.iter().sum::<f64>() / factors.len() as f64
}

fn ordinal_agreement(a: i32, b: i32) -> f64 {
    match (a - b).abs() {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

fn smoking_agreement(a: Smoking, b: Smoking) -> f64 {
    ordinal_agreement(a as i32, b as i32)
}

fn drinking_agreement(a: Drinking, b: Drinking) -> f64 {
    ordinal_agreement(a as i32, b as i32)
}

fn kids_agreement(a: WantsKids, b: WantsKids) -> f64 {
    if a == b {
        1.0
    } else if a.is_compatible_with(b) {
        0.75
    } else {
        0.0
    }
}

fn looking_for_agreement(a: LookingFor, b: LookingFor) -> f64 {
    if a == b {
        return 1.0;
    }
    match (a, b) {
        (LookingFor::LongTerm, LookingFor::Marriage) | (LookingFor::Marriage, LookingFor::LongTerm) => 0.5,
        _ => 0.0,
    }
}

/// Human-readable lifestyle agreements, used for highlights
fn find_lifestyle_matches(seeker: &Profile, candidate: &Profile) -> Vec<String> {
    let a = &seeker.lifestyle;
    let b = &candidate.lifestyle;
    let mut matches = Vec::new();

    match (a.smoking, b.smoking) {
        (Some(Smoking::Never), Some(Smoking::Never)) => matches.push("Both non-smokers".to_string()),
        (Some(Smoking::Sometimes), Some(Smoking::Sometimes)) => {
            matches.push("Both occasional smokers".to_string())
        }
        _ => {}
    }

    match (a.drinking, b.drinking) {
        (Some(Drinking::Never), Some(Drinking::Never)) => matches.push("Neither drinks".to_string()),
        (Some(Drinking::Socially), Some(Drinking::Socially)) => {
            matches.push("Both social drinkers".to_string())
        }
        _ => {}
    }

    if let (Some(x), Some(y)) = (a.wants_kids, b.wants_kids) {
        if x == y {
            matches.push("Same stance on kids".to_string());
        } else if x.is_compatible_with(y) {
            matches.push("Compatible on kids".to_string());
        }
    }

    if let (Some(x), Some(y)) = (a.looking_for, b.looking_for) {
        if x == y {
            matches.push(format!("Both looking for {}", x.display_name()));
        }
    }

    matches
}

/// Calculate age score (0-1)
/// Perfect inside the tolerance band, then decays over the average preferred range width
#[inline]
fn calculate_age_score(seeker: &Profile, candidate: &Profile, tolerance: u8) -> f64 {
    let diff = seeker.age.abs_diff(candidate.age);
    if diff <= tolerance {
        return 1.0;
    }

    let seeker_width = seeker.max_age.saturating_sub(seeker.min_age) as f64;
    let candidate_width = candidate.max_age.saturating_sub(candidate.min_age) as f64;
    let avg_width = ((seeker_width + candidate_width) / 2.0).max(1.0);

    (1.0 - (diff - tolerance) as f64 / avg_width).clamp(0.0, 1.0)
}

/// Points for one pace dimension
fn dimension_points(a: i32, b: i32, wildcard: bool) -> u32 {
    if wildcard {
        return PACE_WILDCARD;
    }
    match (a - b).abs() {
        0 => PACE_SAME,
        1 => PACE_ADJACENT,
        _ => PACE_FAR,
    }
}

/// Pace compatibility (0-1) over the four dimensions
fn calculate_pace_score(a: &PacePreferences, b: &PacePreferences) -> f64 {
    use crate::models::{CommunicationStyle, DepthPreference, MessagingFrequency, TimeToFirstDate};

    let points = dimension_points(
        a.messaging_frequency as i32,
        b.messaging_frequency as i32,
        a.messaging_frequency == MessagingFrequency::NoPreference
            || b.messaging_frequency == MessagingFrequency::NoPreference,
    ) + dimension_points(
        a.time_to_first_date as i32,
        b.time_to_first_date as i32,
        a.time_to_first_date == TimeToFirstDate::NoPreference || b.time_to_first_date == TimeToFirstDate::NoPreference,
    ) + dimension_points(
        a.communication_style as i32,
        b.communication_style as i32,
        a.communication_style == CommunicationStyle::MixOfEverything
            || b.communication_style == CommunicationStyle::MixOfEverything,
    ) + dimension_points(
        a.depth_preference as i32,
        b.depth_preference as i32,
        a.depth_preference == DepthPreference::DependsOnVibe || b.depth_preference == DepthPreference::DependsOnVibe,
    );

    points as f64 / 100.0
}

pub fn pace_sync_level(score: f64) -> &'static str {
    if score >= 0.95 {
        "Perfect Sync"
    } else if score >= 0.8 {
        "Good Sync"
    } else if score >= 0.6 {
        "Fair Sync"
    } else if score >= 0.4 {
        "Pace Lag"
    } else {
        "Mismatched Pace"
    }
}

pub fn star_rating(total: f64) -> u8 {
    let above = STAR_THRESHOLDS.iter().filter(|&&t| total >= t).count();
    1 + above as u8
}

pub fn compatibility_label(stars: u8) -> &'static str {
    match stars {
        5 => "Excellent Match",
        4 => "Great Match",
        3 => "Good Match",
        2 => "Fair Match",
        _ => "Low Compatibility",
    }
}

fn generate_highlights(
    seeker: &Profile,
    candidate: &Profile,
    distance_km: Option<f64>,
    shared_interests: &[String],
    lifestyle_matches: &[String],
    pace_score: Option<f64>,
) -> Vec<String> {
    let mut highlights = Vec::new();

    match distance_km {
        Some(d) if d < 5.0 => highlights.push(format!("Lives nearby ({:.1} km away)", d)),
        Some(d) if d < 15.0 => highlights.push(format!("{:.0} km away", d)),
        _ => {}
    }

    match shared_interests {
        [] => {}
        [only] => highlights.push(format!("You both enjoy {}", only)),
        many => highlights.push(format!(
            "You share {} interests: {}",
            many.len(),
            many.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        )),
    }

    highlights.extend(lifestyle_matches.iter().cloned());

    match pace_score {
        Some(p) if p >= 0.95 => highlights.push("Total pace sync".to_string()),
        Some(p) if p >= 0.8 => highlights.push("Great communication sync".to_string()),
        _ => {}
    }

    if seeker.age > 0 && candidate.age > 0 && seeker.age.abs_diff(candidate.age) <= 2 {
        highlights.push("Similar age".to_string());
    }

    highlights.truncate(MAX_HIGHLIGHTS);
    highlights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityState, CommunicationStyle, Dealbreakers, DepthPreference, Gender, Lifestyle, MessagingFrequency,
        TimeToFirstDate,
    };
    use std::collections::BTreeSet;

    fn create_test_profile(id: &str, age: u8, lat: f64, lon: f64) -> Profile {
        Profile {
            user_id: id.to_string(),
            name: format!("User {}", id),
            state: ActivityState::Active,
            gender: Some(Gender::Female),
            interested_in: BTreeSet::from([Gender::Male]),
            age,
            min_age: 20,
            max_age: 40,
            latitude: Some(lat),
            longitude: Some(lon),
            max_distance_km: 50.0,
            lifestyle: Lifestyle::default(),
            interests: BTreeSet::new(),
            pace: None,
            dealbreakers: Dealbreakers::none(),
        }
    }

    fn interests(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let weights = ScoringWeights {
            distance: 0.5,
            interest: 0.5,
            lifestyle: 0.5,
            age: 0.0,
            pace: 0.0,
        };
        assert!(matches!(
            CompatibilityScorer::new(weights, 2),
            Err(EngineError::InvalidWeightConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_negative_and_nan_weights() {
        let mut weights = ScoringWeights::default();
        weights.distance = -0.15;
        weights.interest = 0.60;
        assert!(CompatibilityScorer::new(weights, 2).is_err());

        let mut weights = ScoringWeights::default();
        weights.pace = f64::NAN;
        assert!(CompatibilityScorer::new(weights, 2).is_err());
    }

    #[test]
    fn test_accepts_sum_within_tolerance() {
        let mut weights = ScoringWeights::default();
        weights.pace += 0.0005;
        assert!(CompatibilityScorer::new(weights, 2).is_ok());
    }

    #[test]
    fn test_distance_score() {
        assert_eq!(calculate_distance_score(Some(0.5), 50.0), 1.0);
        assert_eq!(calculate_distance_score(Some(50.0), 50.0), 0.0);
        assert_eq!(calculate_distance_score(None, 50.0), NEUTRAL_SCORE);

        let half = calculate_distance_score(Some(25.5), 50.0);
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_distance_score_non_increasing() {
        let mut previous = 1.0;
        for km in 0..60 {
            let score = calculate_distance_score(Some(km as f64), 50.0);
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn test_interest_jaccard() {
        let mut a = create_test_profile("a", 28, 0.0, 0.0);
        let mut b = create_test_profile("b", 28, 0.0, 0.0);
        a.interests = interests(&["hiking", "coffee", "jazz"]);
        b.interests = interests(&["hiking", "coffee", "chess"]);

        let score = CompatibilityScorer::default().score(&a, &b);
        assert!((score.interest_score - 0.5).abs() < 1e-9);
        assert_eq!(score.shared_interests, vec!["coffee", "hiking"]);

        b.interests.clear();
        let score = CompatibilityScorer::default().score(&a, &b);
        assert_eq!(score.interest_score, 0.0);
    }

    #[test]
    fn test_lifestyle_partial_credit() {
        let mut a = create_test_profile("a", 28, 0.0, 0.0);
        let mut b = create_test_profile("b", 28, 0.0, 0.0);

        assert_eq!(calculate_lifestyle_score(&a, &b), NEUTRAL_SCORE);

        a.lifestyle.smoking = Some(Smoking::Never);
        b.lifestyle.smoking = Some(Smoking::Sometimes);
        a.lifestyle.looking_for = Some(LookingFor::LongTerm);
        b.lifestyle.looking_for = Some(LookingFor::LongTerm);

        assert!((calculate_lifestyle_score(&a, &b) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_age_score_tolerance_band() {
        let a = create_test_profile("a", 28, 0.0, 0.0);
        let b = create_test_profile("b", 30, 0.0, 0.0);
        let c = create_test_profile("c", 38, 0.0, 0.0);

        assert_eq!(calculate_age_score(&a, &b, 2), 1.0);
        // 10 years apart, 8 past the band, over a 20 year average width
        assert!((calculate_age_score(&a, &c, 2) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_pace_wildcards_and_distance() {
        let a = PacePreferences {
            messaging_frequency: MessagingFrequency::Often,
            time_to_first_date: TimeToFirstDate::FewDays,
            communication_style: CommunicationStyle::TextOnly,
            depth_preference: DepthPreference::DeepChat,
        };
        assert!((calculate_pace_score(&a, &a) - 1.0).abs() < 1e-9);

        let b = PacePreferences {
            messaging_frequency: MessagingFrequency::NoPreference,
            time_to_first_date: TimeToFirstDate::Weeks,
            communication_style: CommunicationStyle::InPersonOnly,
            depth_preference: DepthPreference::DeepChat,
        };
        // 20 (wildcard) + 15 (adjacent) + 5 (far) + 25 (same)
        assert!((calculate_pace_score(&a, &b) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds_and_rating() {
        let mut a = create_test_profile("a", 28, 40.7128, -74.0060);
        let mut b = create_test_profile("b", 29, 40.7130, -74.0062);
        a.interests = interests(&["hiking"]);
        b.interests = interests(&["hiking"]);
        a.lifestyle.smoking = Some(Smoking::Never);
        b.lifestyle.smoking = Some(Smoking::Never);

        let score = CompatibilityScorer::default().score(&a, &b);
        assert!(score.total >= 0.0 && score.total <= 100.0);
        assert!((1..=5).contains(&score.star_rating));
        assert_eq!(compatibility_label(score.star_rating), score.label);
        assert!(score.highlights.len() <= MAX_HIGHLIGHTS);
        assert!(score.highlights.iter().any(|h| h.contains("km away")));
        assert!(score.highlights.iter().any(|h| h == "Similar age"));
    }

    #[test]
    fn test_star_thresholds() {
        assert_eq!(star_rating(100.0), 5);
        assert_eq!(star_rating(90.0), 5);
        assert_eq!(star_rating(89.9), 4);
        assert_eq!(star_rating(60.0), 3);
        assert_eq!(star_rating(40.0), 2);
        assert_eq!(star_rating(0.0), 1);
    }

    #[test]
    fn test_closer_candidate_never_scores_lower_on_distance() {
        let seeker = create_test_profile("s", 28, 40.0, -74.0);
        let near = create_test_profile("n", 28, 40.05, -74.0);
        let far = create_test_profile("f", 28, 40.3, -74.0);

        let scorer = CompatibilityScorer::default();
        assert!(scorer.score(&seeker, &near).distance_score >= scorer.score(&seeker, &far).distance_score);
    }
}
