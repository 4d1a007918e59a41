//! Error types for pipeline steps

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures a step can raise to its caller.
///
/// Mechanism failures from the chosen backend are converted into
/// `status: error` step results instead; only cancellation and
/// configuration problems surface as errors, so callers never log a
/// user-initiated cancel as a genuine failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller cancelled the step mid-flight
    #[error("Step execution was cancelled")]
    Cancelled,

    /// The step configuration cannot produce a prompt
    #[error("Invalid step configuration: {0}")]
    InvalidConfig(String),
}
