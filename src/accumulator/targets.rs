//! One accumulator per harvest target
//!
//! Timeline runs keep a separate table set for every target, each persisted
//! to its own subdirectory. Targets never share rows or deduplication state.
//! A target's tables are released by its final flush; the map then only
//! carries that target's row counts.

use std::collections::BTreeMap;

use super::ResponseAccumulator;

/// Accumulators keyed by normalized target identifier
#[derive(Debug, Default)]
pub struct TargetAccumulators {
    targets: BTreeMap<String, ResponseAccumulator>,
}

impl TargetAccumulators {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `accumulator` for `target`, returning it for merging.
    ///
    /// A target registered twice keeps its first accumulator.
    pub fn insert(
        &mut self,
        target: impl Into<String>,
        accumulator: ResponseAccumulator,
    ) -> &mut ResponseAccumulator {
        self.targets.entry(target.into()).or_insert(accumulator)
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no target is registered
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
