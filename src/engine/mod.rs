//! Engines that talk to the text generator.
//!
//! - `generator`: builds the original, hallucinated and partial answers
//! - `judge`: classifies a submission against the expert answer
//! - `verdict`: reads the judge's free-text reply

mod generator;
mod judge;
mod verdict;

pub use generator::*;
pub use judge::*;
pub use verdict::*;
