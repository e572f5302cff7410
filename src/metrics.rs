//! Usage accounting for the explorer.
//!
//! Tracks token usage and inference latency per selection mode alongside a
//! few loop counters, plus lightweight timing helpers.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::vocabulary::SelectionMode;

/// Aggregated token, latency and retry counters for one explorer instance.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExplorerMetrics {
    pub single_prompt_tokens: u64,
    pub single_completion_tokens: u64,
    pub single_inference_time_ms: u64,

    pub multiple_prompt_tokens: u64,
    pub multiple_completion_tokens: u64,
    pub multiple_inference_time_ms: u64,

    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_inference_time_ms: u64,

    pub model_invocations: u64,
    pub cache_hits: u64,
    pub failed_trials: u64,
}

impl ExplorerMetrics {
    /// Record one model invocation for `mode` and update cumulative totals.
    pub fn record(
        &mut self,
        mode: SelectionMode,
        prompt_tokens: u64,
        completion_tokens: u64,
        inference_time_ms: u64,
    ) {
        match mode {
            SelectionMode::Single => {
                self.single_prompt_tokens += prompt_tokens;
                self.single_completion_tokens += completion_tokens;
                self.single_inference_time_ms += inference_time_ms;
            }
            SelectionMode::Multiple => {
                self.multiple_prompt_tokens += prompt_tokens;
                self.multiple_completion_tokens += completion_tokens;
                self.multiple_inference_time_ms += inference_time_ms;
            }
        }

        self.total_prompt_tokens += prompt_tokens;
        self.total_completion_tokens += completion_tokens;
        self.total_inference_time_ms += inference_time_ms;
        self.model_invocations += 1;
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_failed_trial(&mut self) {
        self.failed_trials += 1;
    }
}

/// Start an inference timer using [`Instant::now`].
pub fn start_inference_timer() -> Instant {
    Instant::now()
}

/// Return the elapsed milliseconds since the provided start instant.
pub fn get_inference_time_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
