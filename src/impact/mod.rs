//! Test impact analysis
//!
//! Answers "which tests must run again after these files changed?" by
//! resolving changed files to modules, building (or reusing) the import
//! graph, and merging the verdicts of the configured strategies.
//!
//! Over-approximation is expected: an unnecessary test run is acceptable,
//! a skipped impacted test is not.

pub mod composer;
pub mod strategies;
pub mod types;

pub use composer::{Composition, FailureMode, StrategyComposer, default_strategies};
pub use strategies::{FixtureVisibilityStrategy, ImpactStrategy, ImportReachabilityStrategy};
pub use types::{
    ChangeStatus, ChangedFile, ChangedModule, ImpactContext, ImpactReport, StrategyStats,
    UnresolvedChange,
};

use crate::cache::ResultCache;
use crate::config::{EngineConfig, NamespaceConfig};
use crate::error::{ImpactError, ResolutionError, Result};
use crate::graph::{BuildOptions, DependencyGraph, ParsePolicy};
use crate::indexer::{self, DiscoveryOptions, ModuleId, TestNaming, scan::ScanOptions};
use crate::util;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub struct ImpactAnalyzer {
    namespace: NamespaceConfig,
    composer: StrategyComposer,
    build: BuildOptions,
    discovery: DiscoveryOptions,
    cache: Option<Arc<ResultCache>>,
    cwd: Option<PathBuf>,
}

impl ImpactAnalyzer {
    /// Analyzer with the default strategies and settings from the environment.
    pub fn new(namespace: NamespaceConfig) -> Self {
        Self::with_config(namespace, EngineConfig::get())
    }

    pub fn with_config(namespace: NamespaceConfig, config: &EngineConfig) -> Self {
        Self {
            namespace,
            composer: StrategyComposer::new(default_strategies())
                .with_failure_mode(config.failure_mode()),
            build: BuildOptions {
                parse_policy: config.parse_policy,
                parallel: config.parallel,
            },
            discovery: DiscoveryOptions {
                scan: ScanOptions::new(config.respect_gitignore),
                naming: TestNaming::default(),
            },
            cache: None,
            cwd: None,
        }
    }

    pub fn strategies(mut self, strategies: Vec<Box<dyn ImpactStrategy>>) -> Self {
        let mode = self.composer.failure_mode();
        self.composer = StrategyComposer::new(strategies).with_failure_mode(mode);
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.composer = self.composer.with_failure_mode(mode);
        self
    }

    pub fn parse_policy(mut self, policy: ParsePolicy) -> Self {
        self.build.parse_policy = policy;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.build.parallel = parallel;
        self
    }

    pub fn naming(mut self, naming: TestNaming) -> Self {
        self.discovery.naming = naming;
        self
    }

    pub fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.discovery.scan = ScanOptions::new(enabled);
        self
    }

    /// Share graphs across analyzers and runs.
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Directory relative changed paths are resolved against; defaults to
    /// the process working directory.
    pub fn relative_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn namespace(&self) -> &NamespaceConfig {
        &self.namespace
    }

    /// The dependency graph for the namespace, from the cache when configured.
    pub fn graph(&self) -> Result<Arc<DependencyGraph>> {
        match &self.cache {
            Some(cache) => cache.get_or_build(&self.namespace, &self.build, &self.discovery),
            None => {
                let modules = indexer::discover_modules(&self.namespace, &self.discovery)?;
                Ok(Arc::new(DependencyGraph::build(
                    &self.namespace,
                    modules,
                    &self.build,
                )?))
            }
        }
    }

    pub fn analyze(&self, changed_files: &[ChangedFile]) -> Result<ImpactReport> {
        let start = Instant::now();
        let changed_files = self.normalize_changes(changed_files)?;
        let (changed_modules, unresolved) = self.resolve_normalized(&changed_files);
        let graph = self.graph()?;

        let ctx = ImpactContext {
            changed_files: &changed_files,
            changed_modules: &changed_modules,
            graph: &graph,
            namespace: &self.namespace,
            naming: &self.discovery.naming,
        };
        let composition = self.composer.compose(&ctx)?;

        let paths = composition
            .impacted
            .iter()
            .filter_map(|id| graph.source_file(id).map(|file| file.path.clone()))
            .collect();

        tracing::info!(
            changed = changed_modules.len(),
            impacted = composition.impacted.len(),
            degraded = composition.degraded,
            duration_ms = start.elapsed().as_millis() as u64,
            "impact analysis finished"
        );

        Ok(ImpactReport {
            impacted: composition.impacted,
            paths,
            changed_modules: changed_modules.iter().map(|m| m.id().clone()).collect(),
            unresolved,
            strategies: composition.stats,
            degraded: composition.degraded,
            unanalyzed: graph.unanalyzed().iter().cloned().collect(),
        })
    }

    /// Map changed files to modules. Files outside both roots and files that
    /// are not importable are reported back as unresolved.
    pub fn resolve_changes(
        &self,
        changed_files: &[ChangedFile],
    ) -> Result<(Vec<ChangedModule>, Vec<UnresolvedChange>)> {
        let normalized = self.normalize_changes(changed_files)?;
        Ok(self.resolve_normalized(&normalized))
    }

    /// Absolute, symlink-resolved copies of the changed paths.
    fn normalize_changes(&self, changed_files: &[ChangedFile]) -> Result<Vec<ChangedFile>> {
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|source| ImpactError::Io {
                path: PathBuf::from("."),
                source,
            })?,
        };
        Ok(changed_files
            .iter()
            .map(|changed| {
                ChangedFile::new(
                    util::canonical_or_clean(&util::absolutize(&cwd, &changed.path)),
                    changed.status,
                )
            })
            .collect())
    }

    fn resolve_normalized(
        &self,
        changed_files: &[ChangedFile],
    ) -> (Vec<ChangedModule>, Vec<UnresolvedChange>) {
        let mut modules: BTreeMap<ModuleId, ChangedModule> = BTreeMap::new();
        let mut unresolved = Vec::new();
        for changed in changed_files {
            let path = changed.path.clone();
            match indexer::resolve_source(&path, &self.namespace, &self.discovery.naming) {
                Ok(source) => {
                    let status = changed.status;
                    modules
                        .entry(source.module.clone())
                        .and_modify(|existing| {
                            // a rename back and forth still leaves the module present
                            if !status.is_deleted() {
                                existing.status = status;
                            }
                        })
                        .or_insert(ChangedModule { source, status });
                }
                Err(err) => {
                    match &err {
                        ResolutionError::OutsideRoot { .. } => {
                            tracing::info!(path = %path.display(), "changed file is outside the analyzed namespace");
                        }
                        _ => {
                            tracing::warn!(path = %path.display(), error = %err, "ignoring changed file");
                        }
                    }
                    unresolved.push(UnresolvedChange {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        (modules.into_values().collect(), unresolved)
    }
}

/// One-shot analysis: impacted test modules for `changed_files`, sorted.
/// Uses the default strategies when `strategies` is `None`.
pub fn get_impacted_tests(
    changed_files: &[ChangedFile],
    namespace_root: &Path,
    tests_root: Option<&Path>,
    strategies: Option<Vec<Box<dyn ImpactStrategy>>>,
) -> Result<Vec<ModuleId>> {
    let namespace = NamespaceConfig::new(namespace_root, tests_root)?;
    let mut analyzer = ImpactAnalyzer::new(namespace);
    if let Some(strategies) = strategies {
        analyzer = analyzer.strategies(strategies);
    }
    Ok(analyzer.analyze(changed_files)?.impacted)
}

/// True when the host runner's item path (`tests/test_a.py` or
/// `tests/test_a.py::TestX::test_y`) names one of the impacted test files.
pub fn matches_impacted_tests<P: AsRef<Path>>(item_path: &str, impacted_paths: &[P]) -> bool {
    let file_part = item_path.split("::").next().unwrap_or(item_path);
    let item = util::normalize_path(Path::new(file_part));
    if item == "." {
        return false;
    }
    impacted_paths.iter().any(|path| {
        let candidate = util::normalize_path(path.as_ref());
        candidate == item
            || candidate
                .strip_suffix(item.as_str())
                .is_some_and(|head| head.ends_with('/'))
    })
}
