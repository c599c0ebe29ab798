//! Rich diagnostic error types for damage-intake.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so an operator knows what went wrong and
//! how to fix it. Per-image and weather failures are normally caught by the
//! pipeline and rendered inline; only the variants below reach the caller.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::evidence::{EvidenceError, ValidationError};
use crate::llm::LlmError;
use crate::weather::WeatherError;

/// Top-level error type for damage-intake.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum IntakeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("failed to start worker pool: {message}")]
    #[diagnostic(
        code(intake::pipeline::worker_pool),
        help(
            "The image worker pool could not be created. \
             Lower `pipeline.workers` in the configuration and try again."
        )
    )]
    WorkerPool { message: String },
}

/// Convenience alias for top-level operations.
pub type IntakeResult<T> = std::result::Result<T, IntakeError>;
