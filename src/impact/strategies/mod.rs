//! Impact strategies
//!
//! Each strategy answers "which test modules does this change set implicate"
//! from its own angle:
//! - `imports`: reverse import reachability over the dependency graph
//! - `fixtures`: implicit visibility of fixture files in their directory subtree
//!
//! Callers may add their own by implementing [`ImpactStrategy`].

pub mod fixture;
pub mod reachability;

pub use fixture::FixtureVisibilityStrategy;
pub use reachability::ImportReachabilityStrategy;

use crate::error::StrategyError;
use crate::impact::types::ImpactContext;
use crate::indexer::ModuleId;
use std::collections::BTreeSet;

/// One way of deciding which test modules a change set impacts.
///
/// Returning an empty set means "nothing impacted". A strategy that cannot
/// answer must return an error instead.
pub trait ImpactStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn find_impacted(&self, ctx: &ImpactContext<'_>) -> Result<BTreeSet<ModuleId>, StrategyError>;
}

impl<S: ImpactStrategy + ?Sized> ImpactStrategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn find_impacted(&self, ctx: &ImpactContext<'_>) -> Result<BTreeSet<ModuleId>, StrategyError> {
        (**self).find_impacted(ctx)
    }
}

/// Reject a graph built for some other namespace.
pub(crate) fn ensure_graph_matches(
    strategy: &str,
    ctx: &ImpactContext<'_>,
) -> Result<(), StrategyError> {
    if ctx.graph.namespace() != ctx.namespace {
        return Err(StrategyError::new(
            strategy,
            format!(
                "dependency graph was built for {}, not {}",
                ctx.graph.namespace().package_root().display(),
                ctx.namespace.package_root().display()
            ),
        ));
    }
    Ok(())
}
