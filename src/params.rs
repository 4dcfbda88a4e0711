//! Construction-time configuration for the logprobs processor
//!
//! These values come from the request's sampling parameters and are read-only
//! after the processor is built. A field left as `None` disables the
//! corresponding feature entirely; there is no way to enable it later.

use serde::{Deserialize, Serialize};

use crate::error::{RecontarError, Result};

/// Number of alternative logprobs requested per position
///
/// The wire representation follows the engine convention: a non-negative
/// integer, or `-1` meaning "all entries the engine supplied".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum LogprobCount {
    /// Retain exactly this many top-k alternatives
    Exact(usize),
    /// Retain however many entries the engine supplied
    All,
}

impl LogprobCount {
    /// Resolve the count against the number of entries actually supplied
    /// for a position
    pub fn resolve(self, supplied: usize) -> usize {
        match self {
            Self::Exact(k) => k,
            Self::All => supplied,
        }
    }
}

impl From<i64> for LogprobCount {
    fn from(value: i64) -> Self {
        if value < 0 {
            Self::All
        } else {
            // value >= 0 always fits usize on supported targets
            Self::Exact(usize::try_from(value).unwrap_or(usize::MAX))
        }
    }
}

impl From<LogprobCount> for i64 {
    fn from(value: LogprobCount) -> Self {
        match value {
            LogprobCount::Exact(k) => i64::try_from(k).unwrap_or(i64::MAX),
            LogprobCount::All => -1,
        }
    }
}

/// Default confidence window capacity
pub const DEFAULT_CONFIDENCE_WINDOW_SIZE: usize = 2048;

/// Default confidence stop threshold
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 17.0;

fn default_window_size() -> usize {
    DEFAULT_CONFIDENCE_WINDOW_SIZE
}

fn default_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// Configuration for confidence-based early stopping
///
/// Generation stops early once the moving average of the per-token confidence
/// signal over a full window of `window_size` tokens drops below `threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceStopConfig {
    /// Whether the confidence stop feature is active
    #[serde(default)]
    pub enabled: bool,
    /// Capacity of the sliding window, in tokens
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Moving-average threshold below which generation stops
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for ConfidenceStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_size: DEFAULT_CONFIDENCE_WINDOW_SIZE,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ConfidenceStopConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable the confidence stop
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the window capacity
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the stop threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if `window_size` is zero while the feature is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.window_size == 0 {
            return Err(RecontarError::InvalidConfig {
                reason: "confidence window_size must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-request logprobs configuration
///
/// Mirrors the request's sampling parameters at admission time. `None`
/// disables the corresponding feature for the request's whole lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogprobsParams {
    /// Number of sample logprobs per generated token, `None` to disable
    pub num_logprobs: Option<LogprobCount>,
    /// Number of prompt logprobs per prompt position, `None` to disable
    pub num_prompt_logprobs: Option<LogprobCount>,
    /// Optional confidence-based early stop bundle
    pub confidence_stop: Option<ConfidenceStopConfig>,
}

impl LogprobsParams {
    /// Create params with every feature disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request sample logprobs
    pub fn with_num_logprobs(mut self, count: LogprobCount) -> Self {
        self.num_logprobs = Some(count);
        self
    }

    /// Request prompt logprobs
    pub fn with_num_prompt_logprobs(mut self, count: LogprobCount) -> Self {
        self.num_prompt_logprobs = Some(count);
        self
    }

    /// Attach a confidence stop configuration
    pub fn with_confidence_stop(mut self, config: ConfidenceStopConfig) -> Self {
        self.confidence_stop = Some(config);
        self
    }
}
