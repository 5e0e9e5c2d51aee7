// Integration tests for Lume Discovery

use actix_web::{test, web, App};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use lume_discovery::config::MatchingSettings;
use lume_discovery::core::{
    Clock, CompatibilityScorer, DailyPickSelector, DecisionPolicy, EngineError, InteractionLedger, ManualClock,
    Matcher, UndoController,
};
use lume_discovery::models::{ActivityState, Dealbreakers, Direction, Gender, Lifestyle, MatchState, Profile};
use lume_discovery::routes::{self, AppState};
use lume_discovery::services::{
    InMemoryBlockList, InMemoryDailyPickCache, InMemoryInteractionStore, InMemoryProfileDirectory, InMemoryUndoStore,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

fn create_profile(id: &str, gender: Gender, interested_in: Gender, lat: f64, lon: f64) -> Profile {
    Profile {
        user_id: id.to_string(),
        name: format!("User {}", id),
        state: ActivityState::Active,
        gender: Some(gender),
        interested_in: BTreeSet::from([interested_in]),
        age: 28,
        min_age: 21,
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

struct Engine {
    clock: Arc<ManualClock>,
    profiles: Arc<InMemoryProfileDirectory>,
    interactions: Arc<InMemoryInteractionStore>,
    blocks: Arc<InMemoryBlockList>,
    matcher: Arc<Matcher>,
    ledger: Arc<InteractionLedger>,
    undo: Arc<UndoController>,
    daily: Arc<DailyPickSelector>,
}

impl Engine {
    fn new(policy: DecisionPolicy) -> Self {
        Self::with_like_limit(policy, None)
    }

    fn with_like_limit(policy: DecisionPolicy, like_limit: Option<u32>) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let blocks = Arc::new(InMemoryBlockList::new());

        let undo = Arc::new(UndoController::new(
            interactions.clone(),
            Arc::new(InMemoryUndoStore::new()),
            dyn_clock.clone(),
            Duration::seconds(30),
        ));
        let ledger = Arc::new(
            InteractionLedger::new(
                interactions.clone(),
                profiles.clone(),
                blocks.clone(),
                undo.clone(),
                dyn_clock.clone(),
                policy,
            )
            .with_daily_like_limit(like_limit, chrono::FixedOffset::east_opt(0).unwrap()),
        );
        let matcher = Arc::new(Matcher::new(
            CompatibilityScorer::default(),
            interactions.clone(),
            blocks.clone(),
        ));
        let daily = Arc::new(DailyPickSelector::new(
            profiles.clone(),
            interactions.clone(),
            blocks.clone(),
            Arc::new(InMemoryDailyPickCache::new()),
            dyn_clock,
            chrono::FixedOffset::east_opt(0).unwrap(),
        ));

        Self {
            clock,
            profiles,
            interactions,
            blocks,
            matcher,
            ledger,
            undo,
            daily,
        }
    }

    async fn with_profiles(policy: DecisionPolicy, profiles: Vec<Profile>) -> Self {
        Self::populated(Self::new(policy), profiles).await
    }

    async fn populated(engine: Self, profiles: Vec<Profile>) -> Self {
        for profile in profiles {
            engine.profiles.upsert(profile).await;
        }
        engine
    }

    fn state(&self) -> AppState {
        AppState {
            profiles: self.profiles.clone(),
            matcher: self.matcher.clone(),
            ledger: self.ledger.clone(),
            undo: self.undo.clone(),
            daily: self.daily.clone(),
            matching: MatchingSettings::default(),
            postgres: None,
            cache: None,
        }
    }
}

fn nyc_pool() -> Vec<Profile> {
    vec![
        create_profile("seeker", Gender::Male, Gender::Female, 40.7128, -74.0060),
        create_profile("near", Gender::Female, Gender::Male, 40.72, -74.01),
        create_profile("mid", Gender::Female, Gender::Male, 40.80, -74.10),
        create_profile("far", Gender::Female, Gender::Male, 34.05, -118.24),
        create_profile("wrong_gender", Gender::Male, Gender::Male, 40.72, -74.01),
    ]
}

#[tokio::test]
async fn test_find_candidates_end_to_end() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let seeker = nyc_pool().remove(0);

    let result = engine.matcher.find_candidates(&seeker, nyc_pool(), 10).await.unwrap();
    let ids: Vec<&str> = result.candidates.iter().map(|c| c.profile.user_id.as_str()).collect();

    assert_eq!(result.total_pool, 5);
    assert_eq!(ids, vec!["near", "mid"]);
    for candidate in &result.candidates {
        assert!((0.0..=100.0).contains(&candidate.score.total));
    }
}

#[tokio::test]
async fn test_decided_and_blocked_profiles_are_excluded() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let seeker = nyc_pool().remove(0);

    engine.ledger.record_decision("seeker", "near", Direction::Pass).await.unwrap();
    engine.blocks.block("mid", "seeker").await;

    let result = engine.matcher.find_candidates(&seeker, nyc_pool(), 10).await.unwrap();
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn test_paused_seeker_cannot_browse() {
    let engine = Engine::new(DecisionPolicy::Reject);
    let mut seeker = nyc_pool().remove(0);
    seeker.state = ActivityState::Paused;

    let err = engine.matcher.find_candidates(&seeker, nyc_pool(), 10).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSeekerState { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutual_likes_create_one_match() {
    for round in 0..20 {
        let engine = Engine::new(DecisionPolicy::Reject);
        let a = format!("a{}", round);
        let b = format!("b{}", round);

        let (left, right) = tokio::join!(
            {
                let ledger = engine.ledger.clone();
                let (a, b) = (a.clone(), b.clone());
                tokio::spawn(async move { ledger.record_decision(&a, &b, Direction::Like).await })
            },
            {
                let ledger = engine.ledger.clone();
                let (a, b) = (a.clone(), b.clone());
                tokio::spawn(async move { ledger.record_decision(&b, &a, Direction::Like).await })
            }
        );

        let left = left.unwrap().unwrap();
        let right = right.unwrap().unwrap();
        let created: Vec<_> = left.into_iter().chain(right).collect();

        assert!(!created.is_empty());
        assert!(created.iter().all(|m| m.id == created[0].id));
        assert_eq!(engine.interactions.match_count().await, 1);
    }
}

#[tokio::test]
async fn test_undo_round_trip_restores_storage() {
    let engine = Engine::new(DecisionPolicy::Reject);

    engine.ledger.record_decision("bob", "alice", Direction::Like).await.unwrap();
    let created = engine
        .ledger
        .record_decision("alice", "bob", Direction::Like)
        .await
        .unwrap()
        .expect("mutual like should match");
    assert_eq!(created.state, MatchState::Active);

    engine.clock.advance(Duration::seconds(10));
    let outcome = engine.undo.undo("alice").await.unwrap();

    assert!(outcome.match_deleted);
    assert_eq!(outcome.decision.target, "bob");
    assert!(engine.ledger.get_decision("alice", "bob").await.unwrap().is_none());
    assert!(engine.ledger.get_decision("bob", "alice").await.unwrap().is_some());
    assert!(engine.ledger.get_match("alice", "bob").await.unwrap().is_none());

    // The slot is single-use
    assert!(matches!(engine.undo.undo("alice").await, Err(EngineError::NothingToUndo)));
}

#[tokio::test]
async fn test_undo_after_window_changes_nothing() {
    let engine = Engine::new(DecisionPolicy::Reject);

    engine.ledger.record_decision("bob", "alice", Direction::Like).await.unwrap();
    engine.ledger.record_decision("alice", "bob", Direction::Like).await.unwrap();

    engine.clock.advance(Duration::seconds(30));
    assert!(matches!(engine.undo.undo("alice").await, Err(EngineError::UndoExpired)));

    assert!(engine.ledger.get_decision("alice", "bob").await.unwrap().is_some());
    assert!(engine.ledger.get_match("alice", "bob").await.unwrap().is_some());
    assert_eq!(engine.interactions.decision_count().await, 2);
}

#[tokio::test]
async fn test_resubmission_policies() {
    let reject = Engine::new(DecisionPolicy::Reject);
    reject.ledger.record_decision("a", "b", Direction::Pass).await.unwrap();
    assert!(matches!(
        reject.ledger.record_decision("a", "b", Direction::Like).await,
        Err(EngineError::DuplicateDecision { .. })
    ));

    let overwrite = Engine::new(DecisionPolicy::Overwrite);
    overwrite.ledger.record_decision("b", "a", Direction::Like).await.unwrap();
    overwrite.ledger.record_decision("a", "b", Direction::Pass).await.unwrap();
    let created = overwrite.ledger.record_decision("a", "b", Direction::Like).await.unwrap();
    assert!(created.is_some());
}

#[tokio::test]
async fn test_daily_pick_is_stable_until_decided() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let seeker = nyc_pool().remove(0);
    let today = engine.daily.today();

    let first = engine.daily.get_daily_pick(&seeker, today).await.unwrap().expect("pool is not empty");
    let again = engine.daily.get_daily_pick(&seeker, today).await.unwrap().expect("pick is cached");
    assert_eq!(first.candidate.user_id, again.candidate.user_id);
    assert_ne!(first.candidate.user_id, "wrong_gender");
    assert!(!first.reason.is_empty());

    engine
        .ledger
        .record_decision("seeker", &first.candidate.user_id, Direction::Pass)
        .await
        .unwrap();
    assert!(engine.daily.get_daily_pick(&seeker, today).await.unwrap().is_none());
}

#[tokio::test]
async fn test_daily_pick_with_empty_pool() {
    let seeker = nyc_pool().remove(0);
    let engine = Engine::with_profiles(DecisionPolicy::Reject, vec![seeker.clone()]).await;
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    assert!(engine.daily.get_daily_pick(&seeker, date).await.unwrap().is_none());
}

#[actix_web::test]
async fn test_http_decision_and_undo_flow() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine.state()))
            .configure(routes::configure_routes),
    )
    .await;

    let like = |from: &str, to: &str| {
        test::TestRequest::post()
            .uri("/api/v1/decisions")
            .set_json(json!({ "userId": from, "targetUserId": to, "direction": "like" }))
            .to_request()
    };

    let resp = test::call_service(&app, like("near", "seeker")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["matched"], false);

    let resp = test::call_service(&app, like("seeker", "near")).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["matched"], true);
    let match_id = body["match"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri("/api/v1/matches?userId=seeker").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["matches"][0]["id"], match_id.as_str());

    let req = test::TestRequest::get().uri("/api/v1/undo/status?userId=seeker").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["canUndo"], true);

    engine.clock.advance(Duration::seconds(31));
    let req = test::TestRequest::post()
        .uri("/api/v1/undo")
        .set_json(json!({ "userId": "seeker" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 410);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/matches/{}/unmatch", match_id))
        .set_json(json!({ "userId": "seeker" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "unmatched");
}

#[actix_web::test]
async fn test_http_error_mapping() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine.state()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/candidates/find")
        .set_json(json!({ "userId": "ghost" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/v1/candidates/find")
        .set_json(json!({ "userId": "" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/decisions")
        .set_json(json!({ "userId": "seeker", "targetUserId": "seeker", "direction": "pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/undo")
        .set_json(json!({ "userId": "seeker" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "nothing_to_undo");

    let req = test::TestRequest::post()
        .uri("/api/v1/candidates/find")
        .set_json(json!({ "userId": "seeker", "limit": 1 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["candidates"].as_array().unwrap().len(), 1);
    assert_eq!(body["candidates"][0]["profile"]["userId"], "near");
}

#[actix_web::test]
async fn test_http_daily_pick() {
    let engine = Engine::with_profiles(DecisionPolicy::Reject, nyc_pool()).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine.state()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/daily-pick?userId=seeker").to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    assert!(first["pick"]["candidate"]["userId"].is_string());
    assert_eq!(first["pick"]["alreadySeen"], false);

    let req = test::TestRequest::post()
        .uri("/api/v1/daily-pick/viewed")
        .set_json(json!({ "userId": "seeker" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["updated"], true);

    let req = test::TestRequest::get().uri("/api/v1/daily-pick?userId=seeker").to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["pick"]["candidate"]["userId"], first["pick"]["candidate"]["userId"]);
    assert_eq!(second["pick"]["alreadySeen"], true);
}

#[tokio::test]
async fn test_matched_pair_keeps_its_likes_under_overwrite() {
    let engine = Engine::new(DecisionPolicy::Overwrite);

    engine.ledger.record_decision("bob", "alice", Direction::Like).await.unwrap();
    engine.ledger.record_decision("alice", "bob", Direction::Like).await.unwrap();

    assert!(matches!(
        engine.ledger.record_decision("alice", "bob", Direction::Pass).await,
        Err(EngineError::MatchedDecision { .. })
    ));
    let kept = engine.ledger.get_decision("alice", "bob").await.unwrap().unwrap();
    assert_eq!(kept.direction, Direction::Like);
    assert_eq!(engine.interactions.match_count().await, 1);
}

#[tokio::test]
async fn test_undo_of_overwrite_brings_back_earlier_pass() {
    let engine = Engine::new(DecisionPolicy::Overwrite);

    engine.ledger.record_decision("alice", "bob", Direction::Pass).await.unwrap();
    engine.clock.advance(Duration::seconds(5));
    engine.ledger.record_decision("alice", "bob", Direction::Like).await.unwrap();

    let outcome = engine.undo.undo("alice").await.unwrap();
    assert_eq!(outcome.decision.direction, Direction::Like);
    let restored = outcome.restored.expect("earlier pass comes back");
    assert_eq!(restored.direction, Direction::Pass);

    let stored = engine.ledger.get_decision("alice", "bob").await.unwrap().unwrap();
    assert_eq!(stored.direction, Direction::Pass);
}

#[actix_web::test]
async fn test_http_likers_and_daily_limit() {
    let engine = Engine::populated(Engine::with_like_limit(DecisionPolicy::Reject, Some(1)), nyc_pool()).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine.state()))
            .configure(routes::configure_routes),
    )
    .await;

    let like = |from: &str, to: &str| {
        test::TestRequest::post()
            .uri("/api/v1/decisions")
            .set_json(json!({ "userId": from, "targetUserId": to, "direction": "like" }))
            .to_request()
    };

    assert_eq!(test::call_service(&app, like("near", "seeker")).await.status(), 200);
    engine.clock.advance(Duration::minutes(1));
    assert_eq!(test::call_service(&app, like("mid", "seeker")).await.status(), 200);

    let req = test::TestRequest::get().uri("/api/v1/likers?userId=seeker").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let likers: Vec<&str> = body["likers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["profile"]["userId"].as_str().unwrap())
        .collect();
    assert_eq!(likers, vec!["mid", "near"]);

    let resp = test::call_service(&app, like("seeker", "near")).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, like("seeker", "mid")).await;
    assert_eq!(resp.status(), 429);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "daily_limit_reached");

    let req = test::TestRequest::get().uri("/api/v1/likes/status?userId=seeker").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"]["likesUsed"], 1);
    assert_eq!(body["status"]["likesRemaining"], 0);

    // Passing is never limited
    let req = test::TestRequest::post()
        .uri("/api/v1/decisions")
        .set_json(json!({ "userId": "seeker", "targetUserId": "mid", "direction": "pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/api/v1/likers?userId=seeker").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["likers"].as_array().unwrap().is_empty());
}
