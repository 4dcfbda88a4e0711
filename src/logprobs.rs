//! Per-request logprobs bookkeeping
//!
//! One [`LogprobsProcessor`] is created per in-flight generation request. It
//! incrementally folds the raw per-step logprob batches from the inference
//! core into user-facing structures: the cumulative logprob of the sampled
//! tokens, one rank-indexed record per output position, and an accumulation
//! buffer of prompt-side records drained exactly once by the output stream.
//! When confidence-based early stopping is requested it also maintains the
//! sliding window consulted after every step.
//!
//! Each feature is gated as a whole: either its state bundle is live or every
//! related field is absent. Partially initialized state is unrepresentable.
//!
//! ## Example
//!
//! ```rust
//! use recontar::{LogprobCount, LogprobsParams, LogprobsProcessor, SampleLogprobs, StepOutput};
//!
//! let params = LogprobsParams::new().with_num_logprobs(LogprobCount::Exact(2));
//! let mut processor = LogprobsProcessor::from_params(None, &params);
//!
//! let step = StepOutput {
//!     new_sample_logprobs: Some(SampleLogprobs {
//!         token_ids: vec![vec![7, 3, 5]],
//!         logprobs: vec![vec![-0.1, -1.2, -2.3]],
//!         ranks: vec![1],
//!     }),
//!     new_prompt_logprobs: None,
//! };
//! processor.update(&step).unwrap();
//!
//! assert_eq!(processor.cumulative_logprob(), Some(f64::from(-0.1f32)));
//! assert_eq!(processor.sample_logprobs().unwrap().len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::confidence::ConfidenceWindow;
use crate::error::{RecontarError, Result};
use crate::params::{LogprobCount, LogprobsParams};
use crate::step::{PromptLogprobsChunk, SampleLogprobs, StepOutput};
use crate::tokenizer::TokenDecoder;

/// One token's logprob information at an output position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogprobEntry {
    /// Natural-log probability the model assigned to the token
    pub logprob: f32,
    /// The token's rank in the full distribution (1 = most likely)
    pub rank: u32,
    /// Display text, absent when no tokenizer capability is configured
    pub decoded_token: Option<String>,
}

/// All logprob information retained for one output position
///
/// Maps token id to its entry: the sampled (or actual prompt) token plus up
/// to k alternatives.
pub type PositionRecord = HashMap<u32, LogprobEntry>;

/// Sample-logprobs state bundle, live iff the feature was requested
#[derive(Debug, Clone)]
struct SampleState {
    /// Alternatives requested per generated token
    num_logprobs: LogprobCount,
    /// Running sum of sampled-token logprobs
    cumulative_logprob: f64,
    /// One record per generated token, in generation order
    records: Vec<PositionRecord>,
}

/// Prompt-logprobs state bundle, live iff the feature was requested
#[derive(Debug, Clone)]
struct PromptState {
    /// Alternatives requested per prompt position
    num_prompt_logprobs: LogprobCount,
    /// Accumulation buffer drained by the output stream
    records: Vec<Option<PositionRecord>>,
}

/// Per-request logprobs processor
///
/// Owned by the request's output-processing loop; mutated by strictly
/// sequential step updates, never concurrently. See the module docs for the
/// overall flow.
pub struct LogprobsProcessor {
    /// Shared decode capability, absent when detokenization is disabled
    tokenizer: Option<Arc<dyn TokenDecoder>>,
    /// Sample logprobs state, absent when the feature is disabled
    sample: Option<SampleState>,
    /// Prompt logprobs state, absent when the feature is disabled
    prompt: Option<PromptState>,
    /// Confidence window, absent unless early stopping was requested
    confidence: Option<ConfidenceWindow>,
}

impl std::fmt::Debug for LogprobsProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogprobsProcessor")
            .field("has_tokenizer", &self.tokenizer.is_some())
            .field("sample", &self.sample)
            .field("prompt", &self.prompt)
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// Decode ids through the capability, or yield absent text for every
/// position without any decode work
fn decode_or_absent(tokenizer: Option<&Arc<dyn TokenDecoder>>, ids: &[u32]) -> Vec<Option<String>> {
    match tokenizer {
        Some(t) => t.decode_tokens(ids).into_iter().map(Some).collect(),
        None => vec![None; ids.len()],
    }
}

/// Build the rank-indexed record for one position
///
/// The virtual rank sequence is the distinguished token's rank followed by
/// `1..=k`; ids, logprobs, ranks, and decoded strings are zipped truncating
/// to the shortest. Entries are inserted in this exact order, and a duplicate
/// token id overwrites the earlier entry: when the distinguished token also
/// appears among the top-k, its entry carries the top-k rank, not the true
/// distinguished rank. Last-write-wins here is a fixed contract the engine's
/// outputs are reproducible against; do not reorder the inserts.
fn make_position_record(
    logprobs: &[f32],
    token_ids: &[u32],
    decoded: Vec<Option<String>>,
    rank: u32,
    num_logprobs: LogprobCount,
) -> PositionRecord {
    let k = num_logprobs.resolve(logprobs.len());
    let ranks = std::iter::once(rank).chain((1u32..).take(k));

    let mut record = PositionRecord::with_capacity(token_ids.len());
    for (((token_id, logprob), rank), decoded_token) in
        token_ids.iter().zip(logprobs).zip(ranks).zip(decoded)
    {
        record.insert(
            *token_id,
            LogprobEntry {
                logprob: *logprob,
                rank,
                decoded_token,
            },
        );
    }
    record
}

impl LogprobsProcessor {
    /// Create a processor for a newly admitted request
    ///
    /// Features left as `None` in `params` (or a disabled confidence bundle)
    /// stay off for the request's whole lifetime. Inputs are assumed
    /// pre-validated by the caller.
    pub fn from_params(
        tokenizer: Option<Arc<dyn TokenDecoder>>,
        params: &LogprobsParams,
    ) -> Self {
        let sample = params.num_logprobs.map(|num_logprobs| SampleState {
            num_logprobs,
            cumulative_logprob: 0.0,
            records: Vec::new(),
        });
        // The first prompt token has no preceding context to condition a
        // probability on, so position 0 is always absent.
        let prompt = params.num_prompt_logprobs.map(|num_prompt_logprobs| PromptState {
            num_prompt_logprobs,
            records: vec![None],
        });
        let confidence = params
            .confidence_stop
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| ConfidenceWindow::new(c.window_size, c.threshold));

        debug!(
            sample_logprobs = sample.is_some(),
            prompt_logprobs = prompt.is_some(),
            confidence_stop = confidence.is_some(),
            "logprobs processor created"
        );

        Self {
            tokenizer,
            sample,
            prompt,
            confidence,
        }
    }

    /// Fold one completed inference step into the request state
    ///
    /// Applies the sample batch first, then the prompt chunk, each only when
    /// present.
    ///
    /// # Errors
    ///
    /// Propagates precondition violations from the feature-specific updates.
    pub fn update(&mut self, output: &StepOutput) -> Result<()> {
        if let Some(batch) = &output.new_sample_logprobs {
            self.update_sample_logprobs(batch)?;
        }
        if let Some(chunk) = &output.new_prompt_logprobs {
            self.update_prompt_logprobs(chunk)?;
        }
        Ok(())
    }

    /// Fold a sample-logprobs batch into the request state
    ///
    /// The batch carries one entry set per token finalized in the step,
    /// oldest first (more than one when speculative decoding lands several
    /// tokens). For each token this accumulates the sampled logprob, appends
    /// the position record, and feeds the confidence window when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`RecontarError::FeatureDisabled`] if sample logprobs were not
    /// requested at construction, or [`RecontarError::LengthMismatch`] if the
    /// batch's parallel sequences are inconsistent.
    pub fn update_sample_logprobs(&mut self, batch: &SampleLogprobs) -> Result<()> {
        let state = self
            .sample
            .as_mut()
            .ok_or(RecontarError::FeatureDisabled {
                feature: "sample_logprobs",
            })?;
        batch.validate()?;

        for ((rank, logprobs), token_ids) in batch
            .ranks
            .iter()
            .zip(&batch.logprobs)
            .zip(&batch.token_ids)
        {
            let decoded = decode_or_absent(self.tokenizer.as_ref(), token_ids);

            // Sampler puts the sampled token's logprob first.
            let sampled_logprob = logprobs[0];
            state.cumulative_logprob += f64::from(sampled_logprob);

            state.records.push(make_position_record(
                logprobs,
                token_ids,
                decoded,
                *rank,
                state.num_logprobs,
            ));

            if let Some(window) = self.confidence.as_mut() {
                // No alternatives means no distinguishing signal.
                let confidence = if logprobs.len() > 1 {
                    let alternatives = &logprobs[1..];
                    let sum: f32 = alternatives.iter().sum();
                    -(sum / alternatives.len() as f32)
                } else {
                    0.0
                };
                window.push(confidence);
            }
        }
        Ok(())
    }

    /// Fold a prefill chunk of prompt logprobs into the accumulation buffer
    ///
    /// Token ids for the whole chunk are decoded in one bulk pass and
    /// re-segmented per position. Successive chunks of the same request
    /// append; nothing is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`RecontarError::FeatureDisabled`] if prompt logprobs were not
    /// requested at construction, or [`RecontarError::LengthMismatch`] if the
    /// chunk's flattened fields contradict its declared shape.
    pub fn update_prompt_logprobs(&mut self, chunk: &PromptLogprobsChunk) -> Result<()> {
        let state = self
            .prompt
            .as_mut()
            .ok_or(RecontarError::FeatureDisabled {
                feature: "prompt_logprobs",
            })?;
        chunk.validate()?;

        let mut decoded = decode_or_absent(self.tokenizer.as_ref(), &chunk.token_ids).into_iter();
        let k = chunk.num_logprobs;

        for (pos, rank) in chunk.ranks.iter().enumerate() {
            let offset = pos * k;
            let decoded_for_pos: Vec<Option<String>> = decoded.by_ref().take(k).collect();
            state.records.push(Some(make_position_record(
                &chunk.logprobs[offset..offset + k],
                &chunk.token_ids[offset..offset + k],
                decoded_for_pos,
                *rank,
                state.num_prompt_logprobs,
            )));
        }
        Ok(())
    }

    /// Pop and return all accumulated prompt logprobs
    ///
    /// Returns everything buffered since the last drain and resets the
    /// buffer, so each record is delivered to the output stream exactly once
    /// (delta semantics). Returns `None` when prompt logprobs are disabled
    /// for this request; an enabled request with nothing newly accumulated
    /// gets `Some` of an empty collection, never `None`.
    pub fn pop_prompt_logprobs(&mut self) -> Option<Vec<Option<PositionRecord>>> {
        let state = self.prompt.as_mut()?;
        let records = std::mem::take(&mut state.records);
        trace!(positions = records.len(), "prompt logprobs drained");
        Some(records)
    }

    /// Whether the confidence window triggers early stopping
    ///
    /// True iff the feature is enabled, the window has filled to capacity,
    /// and the moving average is below the threshold. Pure read, safe after
    /// every update.
    pub fn is_confidence_stop_triggered(&self) -> bool {
        self.confidence
            .as_ref()
            .is_some_and(ConfidenceWindow::should_stop)
    }

    /// Running sum of sampled-token logprobs, `None` when sample logprobs
    /// are disabled
    pub fn cumulative_logprob(&self) -> Option<f64> {
        self.sample.as_ref().map(|s| s.cumulative_logprob)
    }

    /// Read-only view of the per-token sample records, `None` when the
    /// feature is disabled
    pub fn sample_logprobs(&self) -> Option<&[PositionRecord]> {
        self.sample.as_ref().map(|s| s.records.as_slice())
    }

    /// Full per-token confidence history, `None` when the confidence stop
    /// is disabled
    pub fn confidence_history(&self) -> Option<&[f32]> {
        self.confidence.as_ref().map(ConfidenceWindow::history)
    }

    /// Whether sample logprobs are enabled for this request
    pub fn sample_logprobs_enabled(&self) -> bool {
        self.sample.is_some()
    }

    /// Whether prompt logprobs are enabled for this request
    pub fn prompt_logprobs_enabled(&self) -> bool {
        self.prompt.is_some()
    }

    /// Whether the confidence stop is enabled for this request
    pub fn confidence_stop_enabled(&self) -> bool {
        self.confidence.is_some()
    }
}
