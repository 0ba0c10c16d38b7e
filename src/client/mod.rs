//! Text-generation clients.

mod generator;
mod llm_client;

pub use generator::*;
pub use llm_client::*;
