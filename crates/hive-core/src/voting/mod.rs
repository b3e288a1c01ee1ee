//! Voting Engine: time-bounded, weighted, quorum-aware votes with
//! configurable tie-break policies (spec §3, §4.1).

pub mod engine;
pub mod types;

pub use engine::{VotingEngine, VotingMetrics, WeightTable};
pub use types::{
    ActiveVoting, Legitimacy, MajorityResult, OptionStats, Participation, TieBreaker, Vote,
    VoteOption, VotingRules, VotingStatus, VotingTopic,
};
