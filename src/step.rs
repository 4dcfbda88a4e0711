//! Step-output shapes at the inference-core boundary
//!
//! The inference core hands the output processor two batch shapes: sample
//! logprobs for tokens finalized during the step (more than one when
//! speculative decoding lands several tokens at once), and prompt logprobs
//! for a contiguous span of prefill positions. A step may carry neither,
//! either, or both.

use serde::{Deserialize, Serialize};

use crate::error::{RecontarError, Result};

/// Sample logprobs for the tokens finalized in one step
///
/// Outer vectors are parallel and ordered oldest-to-newest. For each token,
/// `logprobs[i][0]` is the sampled token's own logprob and `token_ids[i][0]`
/// its id; the remaining entries are the top-k alternatives in rank order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleLogprobs {
    /// Per-token top-k token ids (sampled token first)
    pub token_ids: Vec<Vec<u32>>,
    /// Per-token top-k logprobs (sampled token's logprob first)
    pub logprobs: Vec<Vec<f32>>,
    /// Per-token rank of the sampled token in the full distribution
    pub ranks: Vec<u32>,
}

impl SampleLogprobs {
    /// Number of newly finalized tokens in this batch
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Whether the batch carries no tokens
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Validate that the parallel sequences line up
    ///
    /// # Errors
    ///
    /// Returns [`RecontarError::LengthMismatch`] if the outer vectors differ
    /// in length, or if any token's ids and logprobs differ in length.
    pub fn validate(&self) -> Result<()> {
        let n = self.ranks.len();
        if self.token_ids.len() != n {
            return Err(RecontarError::LengthMismatch {
                context: "sample token_ids",
                expected: n,
                actual: self.token_ids.len(),
            });
        }
        if self.logprobs.len() != n {
            return Err(RecontarError::LengthMismatch {
                context: "sample logprobs",
                expected: n,
                actual: self.logprobs.len(),
            });
        }
        for (ids, lps) in self.token_ids.iter().zip(&self.logprobs) {
            if ids.len() != lps.len() {
                return Err(RecontarError::LengthMismatch {
                    context: "sample per-token entries",
                    expected: lps.len(),
                    actual: ids.len(),
                });
            }
            // Index 0 must hold the sampled token's own logprob.
            if lps.is_empty() {
                return Err(RecontarError::LengthMismatch {
                    context: "sample per-token entries",
                    expected: 1,
                    actual: 0,
                });
            }
        }
        Ok(())
    }
}

/// Prompt logprobs for a contiguous span of prefill positions
///
/// Flattened row-major with shape `num_positions x num_logprobs`: position
/// `p` occupies indices `p * num_logprobs .. (p + 1) * num_logprobs` of
/// `token_ids` and `logprobs`. `ranks[p]` is the rank of the actual prompt
/// token at that position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptLogprobsChunk {
    /// Flattened top-k token ids, `num_positions * num_logprobs` entries
    pub token_ids: Vec<u32>,
    /// Flattened top-k logprobs, `num_positions * num_logprobs` entries
    pub logprobs: Vec<f32>,
    /// Rank of the actual prompt token at each position
    pub ranks: Vec<u32>,
    /// Number of prompt positions in this chunk
    pub num_positions: usize,
    /// Number of logprob entries per position
    pub num_logprobs: usize,
}

impl PromptLogprobsChunk {
    /// Validate the flattened shape against the declared dimensions
    ///
    /// # Errors
    ///
    /// Returns [`RecontarError::LengthMismatch`] if any flattened field does
    /// not match `num_positions * num_logprobs`, or if `ranks` does not have
    /// one entry per position.
    pub fn validate(&self) -> Result<()> {
        let flat = self.num_positions * self.num_logprobs;
        if self.token_ids.len() != flat {
            return Err(RecontarError::LengthMismatch {
                context: "prompt token_ids",
                expected: flat,
                actual: self.token_ids.len(),
            });
        }
        if self.logprobs.len() != flat {
            return Err(RecontarError::LengthMismatch {
                context: "prompt logprobs",
                expected: flat,
                actual: self.logprobs.len(),
            });
        }
        if self.ranks.len() != self.num_positions {
            return Err(RecontarError::LengthMismatch {
                context: "prompt ranks",
                expected: self.num_positions,
                actual: self.ranks.len(),
            });
        }
        Ok(())
    }
}

/// Output of one completed inference step for a single request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutput {
    /// Sample logprobs for newly finalized tokens, if any
    pub new_sample_logprobs: Option<SampleLogprobs>,
    /// Prompt logprobs for a newly processed prefill chunk, if any
    pub new_prompt_logprobs: Option<PromptLogprobsChunk>,
}
