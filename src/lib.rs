//! # Recontar
//!
//! Per-request token-output bookkeeping for an LLM serving engine.
//!
//! Recontar (Spanish: "to recount, to tally") owns the user-facing logprob
//! state of one in-flight generation request: the cumulative logprob of the
//! sampled tokens, a rank-indexed record per output position, prompt-side
//! records drained exactly once into the output stream, and a sliding-window
//! confidence signal that can stop generation early.
//!
//! ## Features
//!
//! - **Streaming updates**: incremental folding of per-step engine output,
//!   including multi-token steps from speculative decoding
//! - **O(1) confidence window**: bounded FIFO with a maintained running sum,
//!   no per-step recomputation
//! - **Delta-mode drains**: prompt logprobs are delivered exactly once, then
//!   forgotten
//! - **Feature-gated state**: each feature's fields are live together or
//!   absent together; partial initialization is unrepresentable
//!
//! ## Example
//!
//! ```rust
//! use recontar::{
//!     ConfidenceStopConfig, LogprobCount, LogprobsParams, LogprobsProcessor,
//! };
//!
//! let params = LogprobsParams::new()
//!     .with_num_logprobs(LogprobCount::Exact(5))
//!     .with_confidence_stop(
//!         ConfidenceStopConfig::new()
//!             .with_enabled(true)
//!             .with_window_size(2048),
//!     );
//!
//! let processor = LogprobsProcessor::from_params(None, &params);
//! // engine loop: processor.update(&step_output)?, then
//! // processor.is_confidence_stop_triggered() decides early termination.
//! assert!(!processor.is_confidence_stop_triggered());
//! ```
//!
//! ## Concurrency
//!
//! One processor per request, one logical owner per processor. All
//! operations are synchronous and non-blocking; step updates must arrive in
//! order because the cumulative sum and the moving-average window are
//! order-sensitive running aggregates. The shared tokenizer capability is
//! the only thing touched by more than one request at a time.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)] // usize -> f32/f64 window lengths are small
#![allow(clippy::float_cmp)] // Exact float comparisons in tests

pub mod confidence;
pub mod error;
pub mod logprobs;
pub mod params;
pub mod step;
pub mod tokenizer;

pub use confidence::ConfidenceWindow;
pub use error::{RecontarError, Result};
pub use logprobs::{LogprobEntry, LogprobsProcessor, PositionRecord};
pub use params::{
    ConfidenceStopConfig, LogprobCount, LogprobsParams, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_CONFIDENCE_WINDOW_SIZE,
};
pub use step::{PromptLogprobsChunk, SampleLogprobs, StepOutput};
pub use tokenizer::{TokenDecoder, Vocabulary, UNKNOWN_TOKEN};
