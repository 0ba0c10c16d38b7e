//! Factuality scoring policy.
//!
//! Exact and immaterially different answers (C, E) score 1, subsets (A) score
//! 0.5, supersets (B) and disagreements (D) score 0: saying more than the expert
//! answer supports counts the same as saying something wrong.

use crate::models::{JudgeChoice, JudgeScore, JudgeVerdict};

/// Score for a judge choice.
pub fn score_of(choice: JudgeChoice) -> f64 {
    match choice {
        JudgeChoice::A => 0.5,
        JudgeChoice::B => 0.0,
        JudgeChoice::C => 1.0,
        JudgeChoice::D => 0.0,
        JudgeChoice::E => 1.0,
    }
}

impl JudgeScore {
    /// Derive the score for a verdict.
    pub fn from_verdict(verdict: &JudgeVerdict) -> Self {
        Self {
            choice: verdict.choice,
            score: score_of(verdict.choice),
            reasoning: verdict.reasoning.clone(),
            parse_defaulted: verdict.defaulted,
        }
    }
}
