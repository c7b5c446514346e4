use postapply_lib::rl::encoding::{
    CompanyCulture, CompanyType, FollowUpAction, FollowUpState, MessageContext, MessageStyle,
};
use postapply_lib::rl::follow_up_scheduler::{FollowUpScheduler, SchedulerParams, SchedulerSnapshot};
use postapply_lib::rl::orchestrator::{ApplicationContext, FollowUpOutcome, FollowUpRLOrchestrator};
use postapply_lib::rl::style_bandit::{BanditSnapshot, StyleBandit};
use postapply_lib::store::{
    AgentIdentity, FileSnapshotStore, MalformedSnapshot, MemorySnapshotStore, SnapshotBackend,
    SnapshotStore,
};
use postapply_lib::utils::rl_config::{RLConfig, StoreKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn touched_states() -> Vec<FollowUpState> {
    let mut states = Vec::new();
    for company_type in CompanyType::ALL {
        for days in [0, 4, 7, 20] {
            for has_connection in [false, true] {
                states.push(FollowUpState::new(days, company_type, has_connection));
            }
        }
    }
    states
}

fn touched_contexts() -> Vec<MessageContext> {
    let mut contexts = Vec::new();
    for title in ["Technical Recruiter", "Head of Data", "Engineering Lead", "Hiring Manager"] {
        for culture in [CompanyCulture::Casual, CompanyCulture::Formal, CompanyCulture::Mixed] {
            contexts.push(MessageContext::new(title, culture, title.len() % 2 == 0));
        }
    }
    contexts
}

#[test]
fn scheduler_survives_a_json_round_trip() {
    let params = SchedulerParams::default();
    let original = FollowUpScheduler::with_rng(params, StdRng::seed_from_u64(1)).unwrap();
    let mut rng = StdRng::seed_from_u64(2);
    let states = touched_states();
    for _ in 0..500 {
        let state = states[rng.gen_range(0..states.len())];
        let action = FollowUpAction::ALL[rng.gen_range(0..FollowUpAction::COUNT)];
        let reward = rng.gen_range(-28.0..50.0);
        let next = states[rng.gen_range(0..states.len())];
        let next_state = if rng.gen_bool(0.5) { Some(&next) } else { None };
        original.update(&state, action, reward, next_state);
    }

    let json = original.serialize().to_json().unwrap();
    let text = serde_json::to_string(&json).unwrap();
    let snapshot = SchedulerSnapshot::from_json(serde_json::from_str(&text).unwrap()).unwrap();
    let restored =
        FollowUpScheduler::from_snapshot(params, &snapshot, StdRng::seed_from_u64(3)).unwrap();

    assert_eq!(restored.total_updates(), 500);
    assert_eq!(restored.summary().total_states, original.summary().total_states);
    for state in &states {
        let (a, b) = (original.q_values(state), restored.q_values(state));
        assert_eq!(a.is_some(), b.is_some());
        if let (Some(a), Some(b)) = (a, b) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
            }
            assert!((original.best_action(state).1 - restored.best_action(state).1).abs() < 1e-9);
        }
    }
}

#[test]
fn bandit_survives_a_json_round_trip() {
    let original = StyleBandit::with_rng(StdRng::seed_from_u64(4));
    let mut rng = StdRng::seed_from_u64(5);
    let contexts = touched_contexts();
    for _ in 0..300 {
        let context = &contexts[rng.gen_range(0..contexts.len())];
        let arm = original.select_arm(context);
        original.update(context, arm, rng.gen_bool(0.3));
    }

    let json = original.serialize().to_json().unwrap();
    let snapshot = BanditSnapshot::from_json(json).unwrap();
    let restored = StyleBandit::from_snapshot(&snapshot, StdRng::seed_from_u64(6)).unwrap();

    assert_eq!(restored.statistics(), original.statistics());
    for context in &contexts {
        assert_eq!(restored.mean_probabilities(context), original.mean_probabilities(context));
        assert_eq!(restored.best_arm(context), original.best_arm(context));
    }
}

#[test]
fn snapshot_without_hyperparameters_keeps_current_ones() {
    let params = SchedulerParams {
        learning_rate: 0.3,
        discount_factor: 0.5,
        epsilon: 0.2,
    };
    let agent = FollowUpScheduler::with_rng(params, StdRng::seed_from_u64(0)).unwrap();
    let snapshot = SchedulerSnapshot::from_json(json!({
        "table": { "3-5_startup_True": {
            "wait_1d": 0.0, "wait_3d": 0.0, "wait_5d": 5.0,
            "wait_7d": 0.0, "wait_10d": 0.0, "wait_14d": 0.0
        } },
        "epsilon": 0.05
    }))
    .unwrap();
    agent.load(&snapshot).unwrap();

    let loaded = agent.params();
    assert_eq!(loaded.learning_rate, 0.3);
    assert_eq!(loaded.discount_factor, 0.5);
    assert_eq!(loaded.epsilon, 0.05);
    let state = FollowUpState::new(4, CompanyType::Startup, true);
    assert_eq!(agent.best_action(&state), (FollowUpAction::Wait5d, 5.0));
}

#[tokio::test]
async fn file_store_backs_the_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let config = RLConfig {
        store_kind: StoreKind::File,
        store_path: dir.path().join("rl_state"),
        agent_namespace: Some("alice".to_string()),
        rng_seed: Some(21),
        ..RLConfig::default()
    };
    let app = ApplicationContext::new(1)
        .with_company(CompanyType::Enterprise, CompanyCulture::Formal)
        .with_contact_title("VP of Talent Acquisition");

    let store = config.build_store().await.unwrap();
    assert!(matches!(store, SnapshotBackend::File(_)));
    let orchestrator = FollowUpRLOrchestrator::new(store, &config).await.unwrap();
    orchestrator.record_outcome(
        &app,
        &FollowUpOutcome {
            action: FollowUpAction::Wait10d,
            style: MessageStyle::Formal,
            got_response: true,
            got_interview: true,
        },
    );
    orchestrator.save_models().await.unwrap();
    assert!(dir.path().join("rl_state").join("alice.q_learning.json").exists());
    assert!(dir.path().join("rl_state").join("alice.thompson_sampling.json").exists());

    let reloaded = FollowUpRLOrchestrator::new(config.build_store().await.unwrap(), &config)
        .await
        .unwrap();
    let timing = reloaded.recommend_timing(&app);
    assert_eq!(timing.action, FollowUpAction::Wait10d);
    assert!((timing.q_value - 3.0).abs() < 1e-9);
    let style = reloaded.recommend_style(&app);
    assert!((style.all_probabilities[&MessageStyle::Formal] - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn unreadable_store_is_a_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the snapshot file should be makes every read fail.
    std::fs::create_dir_all(dir.path().join("q_learning.json")).unwrap();
    let store = FileSnapshotStore::new(dir.path());
    assert!(store.load(&AgentIdentity::scheduler(None)).await.is_err());

    let orchestrator = FollowUpRLOrchestrator::new(store, &RLConfig::default())
        .await
        .unwrap();
    assert_eq!(orchestrator.scheduler.total_updates(), 0);
    assert_eq!(orchestrator.get_rl_statistics().q_learning.total_states, 0);
}

#[tokio::test]
async fn corrupt_snapshot_file_is_an_error_and_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q_learning.json");
    std::fs::write(&path, b"{ \"table\": {").unwrap();

    let err = FollowUpRLOrchestrator::new(FileSnapshotStore::new(dir.path()), &RLConfig::default())
        .await
        .err()
        .expect("corrupt snapshot must not cold start");
    assert!(err.is::<MalformedSnapshot>());
    assert_eq!(std::fs::read(&path).unwrap(), b"{ \"table\": {");
}

#[tokio::test]
async fn memory_store_is_shared_between_orchestrators() {
    let store = MemorySnapshotStore::new();
    let config = RLConfig::default();
    let app = ApplicationContext::new(3);

    let first = FollowUpRLOrchestrator::new(store.clone(), &config).await.unwrap();
    let reward = first.record_outcome(
        &app,
        &FollowUpOutcome {
            action: FollowUpAction::Wait14d,
            style: MessageStyle::ConnectionFocused,
            got_response: false,
            got_interview: false,
        },
    );
    assert_eq!(reward, -28.0);
    first.save_models().await.unwrap();

    let second = FollowUpRLOrchestrator::new(store, &config).await.unwrap();
    let stats = second.get_rl_statistics();
    assert_eq!(stats.q_learning.total_updates, 1);
    assert_eq!(stats.thompson_sampling.total_updates, 1);
    assert_eq!(stats.thompson_sampling.success_rate, 0.0);
}
