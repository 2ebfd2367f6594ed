//! Strategy composer
//!
//! Runs every configured strategy over the same context and merges their
//! results into one sorted, deduplicated impacted set. Per-strategy timing
//! and failures are reported alongside the result.

use crate::error::StrategyError;
use crate::impact::strategies::{
    FixtureVisibilityStrategy, ImpactStrategy, ImportReachabilityStrategy,
};
use crate::impact::types::{ImpactContext, StrategyStats};
use crate::indexer::ModuleId;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

/// What to do when a strategy fails.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Abort the whole computation on the first strategy error.
    #[default]
    FailFast,
    /// Drop the failing strategy's contribution and mark the result degraded.
    Partial,
}

/// Merged output of all strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Composition {
    pub impacted: Vec<ModuleId>,
    pub stats: Vec<StrategyStats>,
    pub degraded: bool,
}

pub struct StrategyComposer {
    strategies: Vec<Box<dyn ImpactStrategy>>,
    mode: FailureMode,
}

impl Default for StrategyComposer {
    fn default() -> Self {
        Self::new(default_strategies())
    }
}

impl StrategyComposer {
    pub fn new(strategies: Vec<Box<dyn ImpactStrategy>>) -> Self {
        Self {
            strategies,
            mode: FailureMode::default(),
        }
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn push(&mut self, strategy: Box<dyn ImpactStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.mode
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Union of every strategy's result, sorted by identifier.
    pub fn compose(&self, ctx: &ImpactContext<'_>) -> Result<Composition, StrategyError> {
        if self.strategies.is_empty() {
            tracing::warn!("no impact strategies configured, nothing can be reported as impacted");
        }

        let mut impacted = BTreeSet::new();
        let mut stats = Vec::with_capacity(self.strategies.len());
        let mut degraded = false;

        for strategy in &self.strategies {
            let start = Instant::now();
            let name = strategy.name().to_string();
            match strategy.find_impacted(ctx) {
                Ok(found) => {
                    tracing::debug!(strategy = %name, impacted = found.len(), "strategy finished");
                    stats.push(StrategyStats {
                        name,
                        duration_ms: start.elapsed().as_millis() as u64,
                        result_count: found.len(),
                        error: None,
                    });
                    impacted.extend(found);
                }
                Err(err) => match self.mode {
                    FailureMode::FailFast => return Err(err),
                    FailureMode::Partial => {
                        tracing::warn!(
                            strategy = %name,
                            error = %err,
                            "strategy failed, continuing with partial results; impacted tests may be missing"
                        );
                        degraded = true;
                        stats.push(StrategyStats {
                            name,
                            duration_ms: start.elapsed().as_millis() as u64,
                            result_count: 0,
                            error: Some(err.to_string()),
                        });
                    }
                },
            }
        }

        Ok(Composition {
            impacted: impacted.into_iter().collect(),
            stats,
            degraded,
        })
    }
}

/// Import reachability plus transitive fixture visibility.
pub fn default_strategies() -> Vec<Box<dyn ImpactStrategy>> {
    vec![
        Box::new(ImportReachabilityStrategy::new()),
        Box::new(FixtureVisibilityStrategy::transitive()),
    ]
}
