//! Import reachability strategy
//!
//! A test is impacted when it imports a changed module directly or through
//! any chain of imports. A changed test module always impacts itself.
//! Modules that failed to parse have unknown imports, so whenever anything
//! changed they are assumed to depend on it.

use super::{ImpactStrategy, ensure_graph_matches};
use crate::error::StrategyError;
use crate::impact::types::ImpactContext;
use crate::indexer::ModuleId;
use std::collections::BTreeSet;

pub const NAME: &str = "imports";

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportReachabilityStrategy;

impl ImportReachabilityStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ImpactStrategy for ImportReachabilityStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn find_impacted(&self, ctx: &ImpactContext<'_>) -> Result<BTreeSet<ModuleId>, StrategyError> {
        ensure_graph_matches(NAME, ctx)?;
        let graph = ctx.graph;
        let mut impacted = BTreeSet::new();

        for changed in ctx.changed_modules {
            let id = changed.id();
            if !changed.is_deleted() && graph.is_test(id) {
                impacted.insert(id.clone());
            }
            impacted.extend(graph.ancestors(id).into_iter().filter(|m| graph.is_test(m)));
        }

        if !ctx.changed_modules.is_empty() {
            for module in graph.unanalyzed() {
                if graph.is_test(module) {
                    impacted.insert(module.clone());
                }
                impacted.extend(
                    graph
                        .ancestors(module)
                        .into_iter()
                        .filter(|m| graph.is_test(m)),
                );
            }
        }

        Ok(impacted)
    }
}
