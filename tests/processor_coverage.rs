//! End-to-end coverage of the logprobs processor
//!
//! Drives a processor the way the engine's output loop does: prefill chunks,
//! sample steps (including speculative multi-token steps), delta drains, and
//! the per-step stop query.

use std::sync::Arc;

use recontar::{
    ConfidenceStopConfig, LogprobCount, LogprobsParams, LogprobsProcessor, PromptLogprobsChunk,
    SampleLogprobs, StepOutput, TokenDecoder, Vocabulary,
};

fn vocab() -> Arc<dyn TokenDecoder> {
    Arc::new(Vocabulary::from_tokens((0..32).map(|i| format!("t{i}")).collect()).unwrap())
}

fn sample_step(token_ids: Vec<u32>, logprobs: Vec<f32>, rank: u32) -> StepOutput {
    StepOutput {
        new_sample_logprobs: Some(SampleLogprobs {
            token_ids: vec![token_ids],
            logprobs: vec![logprobs],
            ranks: vec![rank],
        }),
        new_prompt_logprobs: None,
    }
}

fn prompt_step(positions: usize, k: usize, first_id: u32) -> StepOutput {
    let flat = positions * k;
    StepOutput {
        new_sample_logprobs: None,
        new_prompt_logprobs: Some(PromptLogprobsChunk {
            token_ids: (first_id..first_id + flat as u32).collect(),
            logprobs: (0..flat).map(|i| -0.01 * (i + 1) as f32).collect(),
            ranks: (1..=positions as u32).collect(),
            num_positions: positions,
            num_logprobs: k,
        }),
    }
}

// ============================================================================
// Full Request Lifecycle
// ============================================================================

#[test]
fn test_full_request_lifecycle() {
    let params = LogprobsParams::new()
        .with_num_logprobs(LogprobCount::Exact(2))
        .with_num_prompt_logprobs(LogprobCount::Exact(3));
    let mut processor = LogprobsProcessor::from_params(Some(vocab()), &params);

    // Prefill arrives in two chunks.
    processor.update(&prompt_step(2, 3, 0)).unwrap();
    processor.update(&prompt_step(2, 3, 6)).unwrap();

    // End of prefill: the stream drains everything once.
    let prompt = processor.pop_prompt_logprobs().unwrap();
    assert_eq!(prompt.len(), 5); // leading None + 4 positions
    assert!(prompt[0].is_none());

    // Decode phase.
    processor
        .update(&sample_step(vec![5, 1, 2], vec![-0.5, -1.0, -2.0], 1))
        .unwrap();
    processor
        .update(&sample_step(vec![6, 1, 2], vec![-0.5, -1.0, -2.0], 3))
        .unwrap();

    assert_eq!(processor.sample_logprobs().unwrap().len(), 2);
    assert_eq!(processor.cumulative_logprob(), Some(-1.0));

    // Nothing new accumulated since the drain.
    assert!(processor.pop_prompt_logprobs().unwrap().is_empty());
}

#[test]
fn test_step_with_both_shapes() {
    let params = LogprobsParams::new()
        .with_num_logprobs(LogprobCount::Exact(1))
        .with_num_prompt_logprobs(LogprobCount::Exact(1));
    let mut processor = LogprobsProcessor::from_params(None, &params);

    let step = StepOutput {
        new_sample_logprobs: sample_step(vec![5, 1], vec![-0.5, -1.0], 1).new_sample_logprobs,
        new_prompt_logprobs: prompt_step(2, 1, 0).new_prompt_logprobs,
    };
    processor.update(&step).unwrap();

    assert_eq!(processor.sample_logprobs().unwrap().len(), 1);
    assert_eq!(processor.pop_prompt_logprobs().unwrap().len(), 3);
}

#[test]
fn test_empty_step_is_a_no_op() {
    let params = LogprobsParams::new().with_num_logprobs(LogprobCount::Exact(1));
    let mut processor = LogprobsProcessor::from_params(None, &params);

    processor.update(&StepOutput::default()).unwrap();
    assert!(processor.sample_logprobs().unwrap().is_empty());
    assert_eq!(processor.cumulative_logprob(), Some(0.0));
}

#[test]
fn test_speculative_step_lands_multiple_tokens() {
    let params = LogprobsParams::new().with_num_logprobs(LogprobCount::Exact(1));
    let mut processor = LogprobsProcessor::from_params(Some(vocab()), &params);

    let step = StepOutput {
        new_sample_logprobs: Some(SampleLogprobs {
            token_ids: vec![vec![4, 1], vec![5, 2], vec![6, 3]],
            logprobs: vec![vec![-0.25, -1.0], vec![-0.25, -1.0], vec![-0.5, -1.0]],
            ranks: vec![1, 1, 1],
        }),
        new_prompt_logprobs: None,
    };
    processor.update(&step).unwrap();

    let records = processor.sample_logprobs().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(processor.cumulative_logprob(), Some(-1.0));
    // Generation order is preserved.
    assert_eq!(records[0][&4].decoded_token.as_deref(), Some("t4"));
    assert_eq!(records[2][&6].decoded_token.as_deref(), Some("t6"));
}

// ============================================================================
// Confidence Stop Scenario (window size 3, threshold 0.5)
// ============================================================================

#[test]
fn test_confidence_stop_scenario() {
    let params = LogprobsParams::new()
        .with_num_logprobs(LogprobCount::Exact(2))
        .with_confidence_stop(
            ConfidenceStopConfig::new()
                .with_enabled(true)
                .with_window_size(3)
                .with_threshold(0.5),
        );
    let mut processor = LogprobsProcessor::from_params(None, &params);

    // Alternatives at -1.0 give confidence 1.0 per token.
    for _ in 0..3 {
        assert!(!processor.is_confidence_stop_triggered());
        processor
            .update(&sample_step(vec![5, 1, 2], vec![-0.5, -1.0, -1.0], 1))
            .unwrap();
    }
    // Window full at average 1.0 >= 0.5: no stop.
    assert!(!processor.is_confidence_stop_triggered());

    // Alternatives at -0.1 give confidence 0.1 per token.
    for _ in 0..2 {
        processor
            .update(&sample_step(vec![5, 1, 2], vec![-0.5, -0.1, -0.1], 1))
            .unwrap();
        assert!(!processor.is_confidence_stop_triggered());
    }
    processor
        .update(&sample_step(vec![5, 1, 2], vec![-0.5, -0.1, -0.1], 1))
        .unwrap();
    // Window refilled with low values: average 0.1 < 0.5.
    assert!(processor.is_confidence_stop_triggered());

    assert_eq!(processor.confidence_history().unwrap().len(), 6);
}

#[test]
fn test_stop_query_without_confidence_feature() {
    let params = LogprobsParams::new().with_num_logprobs(LogprobCount::Exact(2));
    let mut processor = LogprobsProcessor::from_params(None, &params);

    for _ in 0..10 {
        processor
            .update(&sample_step(vec![5, 1, 2], vec![-9.0, -9.0, -9.0], 1))
            .unwrap();
        assert!(!processor.is_confidence_stop_triggered());
    }
    assert!(processor.confidence_history().is_none());
}

// ============================================================================
// Decoding Absence
// ============================================================================

#[test]
fn test_no_tokenizer_means_no_decoded_text_anywhere() {
    let params = LogprobsParams::new()
        .with_num_logprobs(LogprobCount::Exact(2))
        .with_num_prompt_logprobs(LogprobCount::Exact(2));
    let mut processor = LogprobsProcessor::from_params(None, &params);

    processor.update(&prompt_step(3, 2, 0)).unwrap();
    processor
        .update(&sample_step(vec![5, 1, 2], vec![-0.5, -1.0, -2.0], 1))
        .unwrap();

    for record in processor.sample_logprobs().unwrap() {
        assert!(record.values().all(|e| e.decoded_token.is_none()));
    }
    for record in processor.pop_prompt_logprobs().unwrap().into_iter().flatten() {
        assert!(record.values().all(|e| e.decoded_token.is_none()));
    }
}

// ============================================================================
// Precondition Violations
// ============================================================================

#[test]
fn test_updates_on_fully_disabled_processor() {
    let mut processor = LogprobsProcessor::from_params(None, &LogprobsParams::new());

    let err = processor
        .update(&sample_step(vec![5, 1], vec![-0.5, -1.0], 1))
        .unwrap_err();
    assert!(err.to_string().contains("sample_logprobs"));

    let err = processor.update(&prompt_step(1, 2, 0)).unwrap_err();
    assert!(err.to_string().contains("prompt_logprobs"));

    assert!(processor.pop_prompt_logprobs().is_none());
}

#[test]
fn test_malformed_prompt_chunk_rejected() {
    let params = LogprobsParams::new().with_num_prompt_logprobs(LogprobCount::Exact(2));
    let mut processor = LogprobsProcessor::from_params(None, &params);

    let mut step = prompt_step(2, 2, 0);
    step.new_prompt_logprobs.as_mut().unwrap().logprobs.pop();
    assert!(processor.update(&step).is_err());

    // The failed update must not have appended anything.
    assert_eq!(processor.pop_prompt_logprobs().unwrap().len(), 1);
}
