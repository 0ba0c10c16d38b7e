//! halluval - Hallucination variant generation and LLM-judge factuality scoring.
//!
//! ## Architecture
//!
//! For one question/answer example, halluval produces three answers:
//! - **original**: the correct answer, copied verbatim
//! - **hallucination**: a confident answer with fabricated detail
//! - **partial**: a correct but incomplete answer
//!
//! Each answer is then judged against the correct one by a second model, which
//! picks a category A-E that maps to a factuality score in `[0, 1]`.
//!
//! ## Layers
//!
//! - `client`: `TextGenerator` seam and the OpenAI-compatible `LLMClient`
//! - `prompts`: generation and judge templates
//! - `engine`: generation engine, judge engine and verdict parsing
//! - `scoring`: category to score policy
//! - `pipeline`: per-example coordinator and batch runner

pub mod client;
pub mod engine;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod scoring;

// Re-exports for convenience
pub use client::{LLMClient, TextGenerator};
pub use engine::{GenerationEngine, JudgeEngine, parse_judge_output};
pub use models::{
    BaseExample, Config, HallucinationExample, HalluvalError, JudgeChoice, JudgeScore, Result,
    RunStats, VariantBatch, VariantKind,
};
pub use pipeline::{BatchRunner, HallucinationPipeline};
pub use scoring::score_of;
