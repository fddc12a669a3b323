#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod criteria;
pub mod goal;
pub mod judge;
pub mod ragas;
pub mod service;

pub use common::storage::types::evaluation::{weighted_score, EvaluationSummary};
pub use criteria::EvaluationCriterion;
pub use goal::{GoalCheck, GoalDetector};
pub use judge::{Judgement, LlmJudge, TranscriptEvaluation};
pub use ragas::{RagasEvaluator, RagasScores};
