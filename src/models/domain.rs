use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// Identity of a profile as issued by the profile directory
pub type UserId = String;

/// Activity state of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Incomplete,
    Active,
    Paused,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoking {
    Never,
    Sometimes,
    Regularly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Drinking {
    Never,
    Socially,
    Regularly,
}

/// Stance on having children
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WantsKids {
    No,
    Open,
    Someday,
    HasKids,
}

impl WantsKids {
    /// OPEN is compatible with every stance, SOMEDAY pairs with HAS_KIDS
    pub fn is_compatible_with(self, other: WantsKids) -> bool {
        if self == other || self == WantsKids::Open || other == WantsKids::Open {
            return true;
        }
        matches!(
            (self, other),
            (WantsKids::Someday, WantsKids::HasKids) | (WantsKids::HasKids, WantsKids::Someday)
        )
    }
}

/// Relationship goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookingFor {
    Casual,
    ShortTerm,
    LongTerm,
    Marriage,
    Unsure,
}

impl LookingFor {
    pub fn display_name(self) -> &'static str {
        match self {
            LookingFor::Casual => "something casual",
            LookingFor::ShortTerm => "short-term dating",
            LookingFor::LongTerm => "a long-term relationship",
            LookingFor::Marriage => "marriage",
            LookingFor::Unsure => "whatever comes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Education {
    HighSchool,
    SomeCollege,
    Bachelors,
    Masters,
    Phd,
    TradeSchool,
    Other,
}

/// Lifestyle attributes; every field is optional on a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lifestyle {
    pub smoking: Option<Smoking>,
    pub drinking: Option<Drinking>,
    pub wants_kids: Option<WantsKids>,
    pub looking_for: Option<LookingFor>,
    pub education: Option<Education>,
    pub height_cm: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingFrequency {
    Rarely,
    Often,
    Constantly,
    NoPreference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeToFirstDate {
    Quickly,
    FewDays,
    Weeks,
    Months,
    NoPreference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    TextOnly,
    VoiceNotes,
    VideoCalls,
    InPersonOnly,
    MixOfEverything,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPreference {
    SmallTalk,
    DeepChat,
    Existential,
    DependsOnVibe,
}

/// Communication and dating pace preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacePreferences {
    pub messaging_frequency: MessagingFrequency,
    pub time_to_first_date: TimeToFirstDate,
    pub communication_style: CommunicationStyle,
    pub depth_preference: DepthPreference,
}

/// A seeker's hard filters. Empty sets and `None` bounds mean "no preference".
///
/// Dealbreakers are one-way: a seeker who rejects smokers never sees them,
/// while smokers can still see the seeker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dealbreakers {
    pub acceptable_smoking: BTreeSet<Smoking>,
    pub acceptable_drinking: BTreeSet<Drinking>,
    pub acceptable_kids_stance: BTreeSet<WantsKids>,
    pub acceptable_looking_for: BTreeSet<LookingFor>,
    pub acceptable_education: BTreeSet<Education>,
    pub min_height_cm: Option<u16>,
    pub max_height_cm: Option<u16>,
    pub max_age_difference: Option<u8>,
}

impl Dealbreakers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_height_dealbreaker(&self) -> bool {
        self.min_height_cm.is_some() || self.max_height_cm.is_some()
    }

    pub fn has_any(&self) -> bool {
        !self.acceptable_smoking.is_empty()
            || !self.acceptable_drinking.is_empty()
            || !self.acceptable_kids_stance.is_empty()
            || !self.acceptable_looking_for.is_empty()
            || !self.acceptable_education.is_empty()
            || self.has_height_dealbreaker()
            || self.max_age_difference.is_some()
    }

    /// Check the height bounds the profile collaborator is expected to enforce
    pub fn validate(&self) -> Result<(), String> {
        if let Some(min) = self.min_height_cm {
            if min < 100 {
                return Err(format!("minHeightCm too low: {}", min));
            }
        }
        if let Some(max) = self.max_height_cm {
            if max > 250 {
                return Err(format!("maxHeightCm too high: {}", max));
            }
        }
        if let (Some(min), Some(max)) = (self.min_height_cm, self.max_height_cm) {
            if min > max {
                return Err("minHeightCm > maxHeightCm".to_string());
            }
        }
        Ok(())
    }
}

fn default_max_distance() -> f64 {
    50.0
}

/// User profile as read from the profile directory. The engine never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub state: ActivityState,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub interested_in: BTreeSet<Gender>,
    pub age: u8,
    pub min_age: u8,
    pub max_age: u8,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "default_max_distance")]
    pub max_distance_km: f64,
    #[serde(default)]
    pub lifestyle: Lifestyle,
    #[serde(default)]
    pub interests: BTreeSet<String>,
    #[serde(default)]
    pub pace: Option<PacePreferences>,
    #[serde(default)]
    pub dealbreakers: Dealbreakers,
}

impl Profile {
    pub fn is_active(&self) -> bool {
        self.state == ActivityState::Active
    }

    /// Coordinates when both latitude and longitude are set
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Direction of a swipe decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Like,
    Pass,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Like => "like",
            Direction::Pass => "pass",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "like" => Some(Direction::Like),
            "pass" => Some(Direction::Pass),
            _ => None,
        }
    }
}

/// A like or pass recorded by `actor` about `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: Uuid,
    pub actor: UserId,
    pub target: UserId,
    pub direction: Direction,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(actor: &str, target: &str, direction: Direction, decided_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            target: target.to_string(),
            direction,
            decided_at,
        }
    }

    pub fn is_like(&self) -> bool {
        self.direction == Direction::Like
    }
}

/// Lifecycle state of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Active,
    Friends,
    Unmatched,
    GracefulExit,
    Blocked,
}

impl MatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchState::Active => "active",
            MatchState::Friends => "friends",
            MatchState::Unmatched => "unmatched",
            MatchState::GracefulExit => "graceful_exit",
            MatchState::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(MatchState::Active),
            "friends" => Some(MatchState::Friends),
            "unmatched" => Some(MatchState::Unmatched),
            "graceful_exit" => Some(MatchState::GracefulExit),
            "blocked" => Some(MatchState::Blocked),
            _ => None,
        }
    }

    /// Whether `self -> to` is an allowed edge. BLOCKED is reachable from anywhere.
    pub fn can_transition_to(self, to: MatchState) -> bool {
        if to == MatchState::Blocked {
            return true;
        }
        match self {
            MatchState::Active => matches!(
                to,
                MatchState::Friends | MatchState::Unmatched | MatchState::GracefulExit
            ),
            MatchState::Friends => matches!(to, MatchState::Unmatched | MatchState::GracefulExit),
            MatchState::Unmatched | MatchState::GracefulExit | MatchState::Blocked => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    FriendZone,
    GracefulExit,
    Unmatch,
    Block,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::FriendZone => "friend_zone",
            EndReason::GracefulExit => "graceful_exit",
            EndReason::Unmatch => "unmatch",
            EndReason::Block => "block",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "friend_zone" => Some(EndReason::FriendZone),
            "graceful_exit" => Some(EndReason::GracefulExit),
            "unmatch" => Some(EndReason::Unmatch),
            "block" => Some(EndReason::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchTransitionError {
    #[error("cannot move match from {from:?} to {to:?}")]
    InvalidTransition { from: MatchState, to: MatchState },

    #[error("user {0} is not part of this match")]
    NotParticipant(UserId),
}

/// Derive the match identity for an unordered pair of users.
///
/// The pair is sorted before hashing so both participants derive the same id.
/// Lengths are prefixed so that ids containing the separator cannot collide.
pub fn match_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}|{}:{}", first.len(), first, second.len(), second));
    let digest = hasher.finalize();

    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    format!("m_{}", hex)
}

/// Mutual match between two users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
    pub state: MatchState,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<UserId>,
    pub end_reason: Option<EndReason>,
}

impl Match {
    /// New ACTIVE match; `user_a` is always the lexicographically smaller id
    pub fn new_active(a: &str, b: &str, created_at: DateTime<Utc>) -> Self {
        let (user_a, user_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            id: match_id(a, b),
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            created_at,
            state: MatchState::Active,
            ended_at: None,
            ended_by: None,
            end_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == MatchState::Active
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn other_user(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }

    /// Apply a lifecycle transition initiated by `by`
    pub fn transition(
        &mut self,
        to: MatchState,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), MatchTransitionError> {
        if !self.involves(by) {
            return Err(MatchTransitionError::NotParticipant(by.to_string()));
        }
        if !self.state.can_transition_to(to) {
            return Err(MatchTransitionError::InvalidTransition { from: self.state, to });
        }

        self.state = to;
        // FRIENDS keeps the relationship going, so it is not an ending
        if to != MatchState::Friends {
            self.ended_at = Some(at);
            self.ended_by = Some(by.to_string());
        }
        self.end_reason = match to {
            MatchState::Friends => Some(EndReason::FriendZone),
            MatchState::Unmatched => Some(EndReason::Unmatch),
            MatchState::GracefulExit => Some(EndReason::GracefulExit),
            MatchState::Blocked => Some(EndReason::Block),
            MatchState::Active => None,
        };
        Ok(())
    }
}

/// The single outstanding undoable decision for an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoSlot {
    pub actor: UserId,
    pub decision: Decision,
    /// Decision this one overwrote; undo puts it back
    #[serde(default)]
    pub previous: Option<Decision>,
    pub match_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl UndoSlot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Someone who liked the user and is still waiting on a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLiker {
    pub profile: Profile,
    pub liked_at: DateTime<Utc>,
}

/// Likes an actor has spent in the current local day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLikeStatus {
    pub likes_used: u32,
    /// `None` when likes are unlimited
    pub likes_remaining: Option<u32>,
    pub date: NaiveDate,
    pub resets_at: DateTime<Utc>,
}

/// Cached daily pick for a (seeker, date) key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPickEntry {
    pub candidate_id: UserId,
    #[serde(default)]
    pub viewed: bool,
}

/// Daily pick offered to a seeker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPick {
    pub candidate: Profile,
    pub date: NaiveDate,
    pub reason: String,
    pub already_seen: bool,
}

/// Per-factor breakdown of a compatibility score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub distance_km: Option<f64>,
    pub distance_score: f64,
    pub interest_score: f64,
    pub lifestyle_score: f64,
    pub age_score: f64,
    pub pace_score: f64,
    pub total: f64,
    pub star_rating: u8,
    pub label: String,
    pub shared_interests: Vec<String>,
    pub lifestyle_matches: Vec<String>,
    pub pace_sync_level: String,
    pub highlights: Vec<String>,
}

/// Candidate that survived the filter pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub profile: Profile,
    pub distance_km: Option<f64>,
    pub score: ScoreBreakdown,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub distance: f64,
    pub interest: f64,
    pub lifestyle: f64,
    pub age: f64,
    pub pace: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.interest + self.lifestyle + self.age + self.pace
    }

    /// Weights for users who care most about proximity
    pub fn proximity_focused() -> Self {
        Self {
            distance: 0.35,
            interest: 0.20,
            lifestyle: 0.25,
            age: 0.10,
            pace: 0.10,
        }
    }

    /// Weights that put lifestyle alignment first
    pub fn lifestyle_focused() -> Self {
        Self {
            distance: 0.10,
            interest: 0.20,
            lifestyle: 0.45,
            age: 0.10,
            pace: 0.15,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance: 0.15,
            interest: 0.30,
            lifestyle: 0.30,
            age: 0.10,
            pace: 0.15,
        }
    }
}

/// Geospatial bounding box
///
/// Longitudes are kept in `[-180, 180]`. A box that crosses the antimeridian
/// has `min_lon > max_lon` and covers `min_lon..=180` plus `-180..=max_lon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// Longitude intervals covered by the box, one or two of them
    pub fn longitude_ranges(&self) -> Vec<(f64, f64)> {
        if self.crosses_antimeridian() {
            vec![(self.min_lon, 180.0), (-180.0, self.max_lon)]
        } else {
            vec![(self.min_lon, self.max_lon)]
        }
    }

    pub fn contains_longitude(&self, lon: f64) -> bool {
        self.longitude_ranges()
            .iter()
            .any(|&(min, max)| lon >= min && lon <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_is_order_independent() {
        assert_eq!(match_id("alice", "bob"), match_id("bob", "alice"));
        assert!(match_id("alice", "bob").starts_with("m_"));
    }

    #[test]
    fn test_match_id_separator_does_not_collide() {
        assert_ne!(match_id("a_b", "c"), match_id("a", "b_c"));
    }

    #[test]
    fn test_new_match_orders_participants() {
        let m = Match::new_active("zed", "amy", Utc::now());
        assert_eq!(m.user_a, "amy");
        assert_eq!(m.user_b, "zed");
        assert!(m.is_active());
        assert_eq!(m.other_user("amy"), Some("zed"));
    }

    #[test]
    fn test_new_match_orders_by_bytes() {
        // Uppercase sorts before lowercase regardless of locale
        let m = Match::new_active("alice", "Bob", Utc::now());
        assert_eq!(m.user_a, "Bob");
        assert_eq!(m.user_b, "alice");
        assert!(m.user_a.as_bytes() < m.user_b.as_bytes());
    }

    #[test]
    fn test_bounding_box_longitude_ranges() {
        let plain = BoundingBox {
            min_lat: 0.0,
            max_lat: 1.0,
            min_lon: 10.0,
            max_lon: 11.0,
        };
        assert_eq!(plain.longitude_ranges(), vec![(10.0, 11.0)]);

        let wrapped = BoundingBox {
            min_lon: 179.5,
            max_lon: -179.5,
            ..plain
        };
        assert!(wrapped.crosses_antimeridian());
        assert_eq!(wrapped.longitude_ranges(), vec![(179.5, 180.0), (-180.0, -179.5)]);
        assert!(wrapped.contains_longitude(-179.9));
        assert!(wrapped.contains_longitude(179.9));
        assert!(!wrapped.contains_longitude(0.0));
    }

    #[test]
    fn test_match_transitions() {
        let now = Utc::now();
        let mut m = Match::new_active("a", "b", now);

        m.transition(MatchState::Friends, "a", now).unwrap();
        assert_eq!(m.state, MatchState::Friends);
        assert!(m.ended_at.is_none());

        m.transition(MatchState::Unmatched, "b", now).unwrap();
        assert_eq!(m.ended_by.as_deref(), Some("b"));

        let err = m.transition(MatchState::Active, "a", now).unwrap_err();
        assert!(matches!(err, MatchTransitionError::InvalidTransition { .. }));

        // Blocking is always allowed
        m.transition(MatchState::Blocked, "a", now).unwrap();
        assert_eq!(m.end_reason, Some(EndReason::Block));
    }

    #[test]
    fn test_transition_requires_participant() {
        let mut m = Match::new_active("a", "b", Utc::now());
        let err = m.transition(MatchState::Unmatched, "c", Utc::now()).unwrap_err();
        assert_eq!(err, MatchTransitionError::NotParticipant("c".to_string()));
    }

    #[test]
    fn test_kids_compatibility() {
        assert!(WantsKids::Open.is_compatible_with(WantsKids::No));
        assert!(WantsKids::Someday.is_compatible_with(WantsKids::HasKids));
        assert!(!WantsKids::No.is_compatible_with(WantsKids::Someday));
    }

    #[test]
    fn test_dealbreaker_validation() {
        let mut db = Dealbreakers::none();
        assert!(!db.has_any());
        assert!(db.validate().is_ok());

        db.min_height_cm = Some(190);
        db.max_height_cm = Some(170);
        assert!(db.has_any());
        assert!(db.validate().is_err());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((ScoringWeights::default().sum() - 1.0).abs() < 1e-9);
        assert!((ScoringWeights::proximity_focused().sum() - 1.0).abs() < 1e-9);
        assert!((ScoringWeights::lifestyle_focused().sum() - 1.0).abs() < 1e-9);
    }
}
