//! Error types for logprobs bookkeeping
//!
//! All failures here are deterministic integration errors: a caller invoked a
//! feature-specific operation on a processor that was constructed with that
//! feature disabled, or handed over step data whose parallel sequences do not
//! line up. There is no I/O and no transient failure mode, so there is no
//! retry policy; errors surface immediately to the caller.

use thiserror::Error;

/// Error type for logprobs processor operations
#[derive(Debug, Error)]
pub enum RecontarError {
    /// A feature-specific update or drain was invoked while that feature was
    /// disabled at construction
    #[error("Feature disabled for this request: {feature}")]
    FeatureDisabled {
        /// Name of the disabled feature (e.g. "sample_logprobs")
        feature: &'static str,
    },

    /// Parallel sequences in a step batch have inconsistent lengths
    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Which batch field failed validation
        context: &'static str,
        /// Length implied by the batch shape
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Invalid construction-time configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },
}

/// Result type for logprobs processor operations
pub type Result<T> = std::result::Result<T, RecontarError>;
