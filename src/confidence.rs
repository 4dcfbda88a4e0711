//! Sliding-window confidence signal for early stopping
//!
//! Each generated token contributes one confidence value, the negated mean
//! of the alternative-token logprobs at that position. The window keeps the
//! last `capacity` values in a FIFO together with a running sum, so the
//! moving average is available in O(1) per token instead of an O(W)
//! recomputation. A full unbounded history of the same values is retained
//! for post-hoc inspection.
//!
//! The stop predicate only fires once the window has filled to capacity;
//! before that there is not enough history for the average to mean anything.

use std::collections::VecDeque;

/// Bounded FIFO of per-token confidence values with a maintained running sum
#[derive(Debug, Clone)]
pub struct ConfidenceWindow {
    /// Window contents, oldest value at the front
    window: VecDeque<f32>,
    /// Running sum of the current window contents
    running_sum: f64,
    /// Window capacity, in tokens
    capacity: usize,
    /// Moving-average threshold below which the stop triggers
    threshold: f64,
    /// Full per-token confidence history, unbounded
    history: Vec<f32>,
}

impl ConfidenceWindow {
    /// Create a window with the given capacity and stop threshold
    ///
    /// Callers validate `capacity > 0` at configuration time
    /// (`ConfidenceStopConfig::validate`).
    pub fn new(capacity: usize, threshold: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            running_sum: 0.0,
            capacity,
            threshold,
            history: Vec::new(),
        }
    }

    /// Record one per-token confidence value
    ///
    /// Appends to the history, then updates the bounded window: at capacity
    /// the oldest value is evicted and subtracted from the running sum before
    /// the new value is inserted and added. The running sum always equals the
    /// exact sum of the window's current contents.
    pub fn push(&mut self, value: f32) {
        self.history.push(value);

        if self.window.len() >= self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.running_sum -= f64::from(evicted);
            }
        }
        self.window.push_back(value);
        self.running_sum += f64::from(value);
    }

    /// Whether the moving average has dropped below the threshold
    ///
    /// Returns `true` iff the window is non-empty, at full capacity, and
    /// `running_sum / len < threshold`. Pure read, safe after every update.
    pub fn should_stop(&self) -> bool {
        if self.window.is_empty() {
            return false;
        }
        self.window.len() >= self.capacity && self.mean() < self.threshold
    }

    /// Moving average over the current window contents
    ///
    /// Returns `0.0` for an empty window.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.running_sum / self.window.len() as f64
    }

    /// Number of values currently in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window holds no values
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Whether the window has filled to capacity
    pub fn is_full(&self) -> bool {
        self.window.len() >= self.capacity
    }

    /// Window capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Full per-token confidence history, oldest first
    pub fn history(&self) -> &[f32] {
        &self.history
    }
}
