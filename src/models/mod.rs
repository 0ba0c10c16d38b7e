//! Core data models for halluval.
//!
//! - `example`: inputs, variants, verdicts and scores (the JSON contract)
//! - `run`: batch output records and run statistics
//! - `config`: TOML configuration
//! - `error`: error taxonomy

mod config;
mod error;
mod example;
mod run;

pub use config::*;
pub use error::*;
pub use example::*;
pub use run::*;
