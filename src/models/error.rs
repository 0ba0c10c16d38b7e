//! Error types for halluval.
//!
//! Two layers:
//! - `ServiceError`: what the text-generation backend did wrong (HTTP, auth, timeouts)
//! - `HalluvalError`: what went wrong for a pipeline run, with the call stage attached
//!
//! Judge output that cannot be parsed is not an error here; it is recovered to
//! category D by the judge engine and surfaced through `JudgeVerdict::defaulted`.

use super::VariantKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for halluval.
#[derive(Debug, Error)]
pub enum HalluvalError {
    // ═══════════════════════════════════════════════════════════════════
    // Input and configuration
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Run failures (fatal to the batch of three)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Failed to generate {variant} answer: model returned no content")]
    GenerationFailed { variant: VariantKind },

    #[error("{stage} call failed: {source}")]
    ExternalService {
        stage: CallStage,
        #[source]
        source: ServiceError,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Invariant violations (bugs)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which external call of a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// Generating a non-original variant
    Generation(VariantKind),
    /// Judging a submission; the variant is known when called from the pipeline
    Judge(Option<VariantKind>),
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStage::Generation(kind) => write!(f, "{kind} generation"),
            CallStage::Judge(Some(kind)) => write!(f, "judge ({kind})"),
            CallStage::Judge(None) => write!(f, "judge"),
        }
    }
}

/// Errors raised by a text-generation backend.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty completion from model {0}")]
    EmptyCompletion(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ServiceError {
    /// Check if the caller may reasonably retry this request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Network(_)
        ) || matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Get retry delay hint in seconds, if the backend sent one.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl HalluvalError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a backend failure with the stage it happened in.
    pub fn service(stage: CallStage, source: ServiceError) -> Self {
        Self::ExternalService { stage, source }
    }

    /// Attribute a judge failure to the variant being scored.
    pub fn for_variant(self, variant: VariantKind) -> Self {
        match self {
            Self::ExternalService {
                stage: CallStage::Judge(None),
                source,
            } => Self::ExternalService {
                stage: CallStage::Judge(Some(variant)),
                source,
            },
            other => other,
        }
    }

    /// The variant this failure belongs to, if any.
    pub fn variant(&self) -> Option<VariantKind> {
        match self {
            Self::GenerationFailed { variant } => Some(*variant),
            Self::ExternalService {
                stage: CallStage::Generation(kind) | CallStage::Judge(Some(kind)),
                ..
            } => Some(*kind),
            _ => None,
        }
    }

    /// Check if retrying the whole run could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { source, .. } => source.is_retryable(),
            Self::GenerationFailed { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for halluval.
pub type Result<T> = std::result::Result<T, HalluvalError>;
