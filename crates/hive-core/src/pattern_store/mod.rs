//! Pattern Store (spec §4.4): records decision/task outcomes as
//! signature-addressed patterns and predicts outcomes for new contexts.

pub mod signature;
pub mod store;
pub mod types;

pub use signature::{compute_signature, cosine_similarity, normalize_context};
pub use store::{CosineOutcomePredictor, OutcomePredictor, PatternStore};
pub use types::{Insights, Outcome, Pattern, PatternKind, Prediction, Progress};
