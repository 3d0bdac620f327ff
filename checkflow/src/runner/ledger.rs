//! Per-run attempt ledger.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Attempt counts per stage key for one orchestrator run.
///
/// The orchestrator owns the ledger and hands a clone to every runner
/// call, so a stage re-entered within the same run keeps counting from
/// where it stopped.
#[derive(Debug, Clone, Default)]
pub struct AttemptLedger {
    attempts: Arc<DashMap<String, u32>>,
}

impl AttemptLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the attempt number for `stage_key`.
    pub fn next_attempt(&self, stage_key: &str) -> u32 {
        let mut entry = self.attempts.entry(stage_key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Returns the attempts recorded for `stage_key`.
    #[must_use]
    pub fn attempts(&self, stage_key: &str) -> u32 {
        self.attempts.get(stage_key).map_or(0, |v| *v)
    }

    /// Returns a copy of every count.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.attempts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
