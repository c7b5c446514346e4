// src/rl/mod.rs
//! Learning agents for follow-up decisions
//!
//! A Q-learning scheduler picks how long to wait before following up and a
//! Thompson-sampling bandit picks the message style. The orchestrator wires
//! both to a snapshot store.

pub mod encoding;
pub mod feedback_processor;
pub mod follow_up_scheduler;
pub mod orchestrator;
pub mod style_bandit;

// Re-exports for convenience
pub use encoding::{
    CompanyCulture, CompanyType, FollowUpAction, FollowUpState, MessageContext, MessageStyle,
    TitleCategory,
};
pub use feedback_processor::{process_outcomes_for_agents, FeedbackStats, RecordedOutcome};
pub use follow_up_scheduler::{FollowUpScheduler, SchedulerParams};
pub use orchestrator::{
    follow_up_reward, ApplicationContext, FollowUpOutcome, FollowUpRLOrchestrator,
};
pub use style_bandit::StyleBandit;
