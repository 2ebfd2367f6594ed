//! Fixture visibility strategy
//!
//! The host test runner loads fixture files (`conftest.py`) implicitly for
//! every test at or below their directory, so no import edge connects them
//! to the tests they affect. This strategy works on path hierarchy alone.
//! A changed fixture file counts even when it lives outside the namespace
//! roots (a `conftest.py` at the repository root still applies to every
//! test below it).
//!
//! In transitive mode a fixture file that imports a changed module (directly
//! or through other modules) counts as changed too, and so does a fixture
//! file whose imports are unknown because it failed to parse.

use super::{ImpactStrategy, ensure_graph_matches};
use crate::error::StrategyError;
use crate::impact::types::ImpactContext;
use crate::indexer::ModuleId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const NAME: &str = "fixtures";

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureVisibilityStrategy {
    transitive: bool,
}

impl FixtureVisibilityStrategy {
    /// Only changed fixture files implicate their subtree.
    pub fn new() -> Self {
        Self { transitive: false }
    }

    /// Fixture files that depend on a changed module implicate their subtree too.
    pub fn transitive() -> Self {
        Self { transitive: true }
    }

    pub fn is_transitive(&self) -> bool {
        self.transitive
    }

    fn implicated_dirs(&self, ctx: &ImpactContext<'_>) -> BTreeSet<PathBuf> {
        let graph = ctx.graph;
        let mut dirs = BTreeSet::new();

        for changed in ctx.changed_modules {
            if changed.source.role.is_fixture() {
                if let Some(dir) = changed.source.path.parent() {
                    dirs.insert(dir.to_path_buf());
                }
            }
        }
        for changed in ctx.changed_files {
            let is_fixture = changed.path.extension().is_some_and(|ext| ext == "py")
                && changed
                    .path
                    .file_stem()
                    .is_some_and(|stem| stem == ctx.naming.fixture_stem.as_str());
            if is_fixture {
                if let Some(dir) = changed.path.parent() {
                    dirs.insert(dir.to_path_buf());
                }
            }
        }

        if !self.transitive || ctx.changed_modules.is_empty() {
            return dirs;
        }

        let mut implicated: BTreeSet<ModuleId> = BTreeSet::new();
        for changed in ctx.changed_modules {
            implicated.extend(graph.ancestors(changed.id()));
        }
        implicated.extend(graph.unanalyzed().iter().cloned());

        for fixture in graph.fixture_modules() {
            if implicated.contains(&fixture.module) {
                if let Some(dir) = fixture.path.parent() {
                    dirs.insert(dir.to_path_buf());
                }
            }
        }
        dirs
    }
}

impl ImpactStrategy for FixtureVisibilityStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn find_impacted(&self, ctx: &ImpactContext<'_>) -> Result<BTreeSet<ModuleId>, StrategyError> {
        ensure_graph_matches(NAME, ctx)?;
        let dirs = self.implicated_dirs(ctx);
        if dirs.is_empty() {
            return Ok(BTreeSet::new());
        }
        tracing::debug!(directories = dirs.len(), "fixture files implicate directory subtrees");

        Ok(ctx
            .graph
            .test_modules()
            .filter(|test| in_any_subtree(&test.path, &dirs))
            .map(|test| test.module.clone())
            .collect())
    }
}

fn in_any_subtree(path: &Path, dirs: &BTreeSet<PathBuf>) -> bool {
    path.ancestors().skip(1).any(|dir| dirs.contains(dir))
}
