use postapply_lib::rl::encoding::{
    CompanyCulture, CompanyType, FollowUpAction, FollowUpState, MessageContext, MessageStyle,
};
use postapply_lib::rl::follow_up_scheduler::{FollowUpScheduler, SchedulerParams};
use postapply_lib::rl::style_bandit::StyleBandit;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const UPDATES_PER_THREAD: usize = 50;
const N: usize = THREADS * UPDATES_PER_THREAD;

fn scheduler(alpha: f64, gamma: f64) -> Arc<FollowUpScheduler> {
    let params = SchedulerParams {
        learning_rate: alpha,
        discount_factor: gamma,
        epsilon: 0.1,
    };
    Arc::new(FollowUpScheduler::with_rng(params, StdRng::seed_from_u64(11)).unwrap())
}

#[test]
fn concurrent_scheduler_updates_are_not_lost() {
    let agent = scheduler(0.5, 0.0);
    let state = FollowUpState::new(4, CompanyType::Startup, true);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let agent = Arc::clone(&agent);
            thread::spawn(move || {
                for _ in 0..UPDATES_PER_THREAD {
                    agent.update(&state, FollowUpAction::Wait5d, 10.0, None);
                    agent.select_action(&state, true);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(agent.total_updates(), N as u64);
    // With identical rewards every interleaving gives 10·(1 − 0.5^N).
    let q = agent.q_values(&state).unwrap()[FollowUpAction::Wait5d.index()];
    let expected = 10.0 * (1.0 - 0.5f64.powi(N as i32));
    assert!((q - expected).abs() < 1e-9, "q = {}", q);
}

#[test]
fn concurrent_updates_with_distinct_rewards_stay_in_range() {
    let agent = scheduler(0.1, 0.9);
    let state = FollowUpState::new(8, CompanyType::Enterprise, false);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let agent = Arc::clone(&agent);
            thread::spawn(move || {
                for i in 0..UPDATES_PER_THREAD {
                    let reward = (t * UPDATES_PER_THREAD + i) as f64;
                    agent.update(&state, FollowUpAction::Wait7d, reward, None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(agent.total_updates(), N as u64);
    let row = agent.q_values(&state).unwrap();
    let q = row[FollowUpAction::Wait7d.index()];
    assert!(q > 0.0 && q < (N - 1) as f64, "q = {}", q);
    assert_eq!(agent.best_action(&state), (FollowUpAction::Wait7d, q));
    assert_eq!(agent.summary().total_states, 1);
}

#[test]
fn concurrent_updates_match_some_sequential_order() {
    const REWARDS: [f64; 3] = [1.0, 10.0, 100.0];
    const ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let alpha = 0.5;
    let sequential: Vec<f64> = ORDERS
        .iter()
        .map(|order| {
            order
                .iter()
                .fold(0.0, |q, &i| q + alpha * (REWARDS[i] - q))
        })
        .collect();
    let state = FollowUpState::new(2, CompanyType::Midsize, true);

    for _ in 0..20 {
        let agent = scheduler(alpha, 0.0);
        let barrier = Arc::new(std::sync::Barrier::new(REWARDS.len()));
        let handles: Vec<_> = REWARDS
            .iter()
            .map(|&reward| {
                let agent = Arc::clone(&agent);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    agent.update(&state, FollowUpAction::Wait3d, reward, None);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(agent.total_updates(), 3);
        let q = agent.q_values(&state).unwrap()[FollowUpAction::Wait3d.index()];
        assert!(
            sequential.iter().any(|s| (s - q).abs() < 1e-12),
            "q = {} is not any sequential result {:?}",
            q,
            sequential
        );
    }
}

#[test]
fn concurrent_bandit_selections_and_updates_are_counted() {
    let bandit = Arc::new(StyleBandit::with_rng(StdRng::seed_from_u64(5)));
    let context = MessageContext::new("Talent Partner", CompanyCulture::Casual, false);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bandit = Arc::clone(&bandit);
            let context = context.clone();
            thread::spawn(move || {
                for _ in 0..UPDATES_PER_THREAD {
                    bandit.select_arm(&context);
                    bandit.update(&context, MessageStyle::Casual, true);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = bandit.statistics();
    assert_eq!(stats.total_selections, N as u64);
    assert_eq!(stats.total_updates, N as u64);
    assert_eq!(stats.total_successes, N as u64);
    assert_eq!(stats.arm_counts.values().sum::<u64>(), N as u64);
    assert_eq!(stats.total_contexts, 1);

    let beliefs = bandit.beliefs(&context).unwrap();
    assert_eq!(beliefs[MessageStyle::Casual.index()].alpha, 1.0 + N as f64);
    assert_eq!(beliefs[MessageStyle::Casual.index()].beta, 1.0);
    assert_eq!(bandit.best_arm(&context).0, MessageStyle::Casual);
}
