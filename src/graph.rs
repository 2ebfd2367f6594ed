//! Module dependency graph.
//!
//! Edge `a -> b` means "a imports b". Both directions are kept so that the
//! central query, "who would be impacted if b changed", is a plain breadth
//! first walk over the reverse adjacency.

use crate::config::NamespaceConfig;
use crate::error::{ImpactError, ParseError, Result};
use crate::indexer::python::{Extraction, ImportExtractor};
use crate::indexer::{ModuleId, ModuleRole, ModuleSet, SourceFile};
use clap::ValueEnum;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::fs;
use std::time::Instant;

/// What graph construction does with a file that fails to parse.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// Keep the module as a node without edges, warn, and mark it unanalyzed.
    #[default]
    Skip,
    /// Abort the build with the parse error.
    Fail,
    /// Keep whatever imports the error-tolerant parse recovered, and warn.
    BestEffort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BuildOptions {
    pub parse_policy: ParsePolicy,
    pub parallel: bool,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    namespace: NamespaceConfig,
    modules: ModuleSet,
    forward: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    reverse: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    unanalyzed: BTreeSet<ModuleId>,
}

impl DependencyGraph {
    /// Empty graph over a discovered module set; every module is a node.
    pub fn new(namespace: NamespaceConfig, modules: ModuleSet) -> Self {
        let mut forward = BTreeMap::new();
        let mut reverse = BTreeMap::new();
        for id in modules.ids() {
            forward.insert(id.clone(), BTreeSet::new());
            reverse.insert(id.clone(), BTreeSet::new());
        }
        Self {
            namespace,
            modules,
            forward,
            reverse,
            unanalyzed: BTreeSet::new(),
        }
    }

    /// Parse every module and add its import edges.
    pub fn build(
        namespace: &NamespaceConfig,
        modules: ModuleSet,
        options: &BuildOptions,
    ) -> Result<Self> {
        let start = Instant::now();
        let files: Vec<SourceFile> = modules.iter().cloned().collect();
        let mut graph = Self::new(namespace.clone(), modules);

        let outcomes: Vec<Result<Extraction>> = if options.parallel {
            files
                .par_iter()
                .map_init(ImportExtractor::new, |extractor, file| match extractor {
                    Ok(extractor) => Ok(extract_file(extractor, file, namespace)),
                    Err(err) => Err(ImpactError::Parse(ParseError::new(
                        &file.path,
                        format!("no parser available: {err}"),
                    ))),
                })
                .collect()
        } else {
            let mut extractor = ImportExtractor::new()?;
            files
                .iter()
                .map(|file| Ok(extract_file(&mut extractor, file, namespace)))
                .collect()
        };

        // applied in module order so parallel and sequential builds agree
        for (file, outcome) in files.iter().zip(outcomes) {
            let extraction = outcome?;
            match (extraction.error, options.parse_policy) {
                (None, _) => graph.add_imports(&file.module, extraction.imports),
                (Some(err), ParsePolicy::Fail) => return Err(err.into()),
                (Some(err), ParsePolicy::Skip) => {
                    tracing::warn!(
                        module = %file.module,
                        error = %err,
                        "skipping unparsable module; it will be treated as depending on every change"
                    );
                    graph.mark_unanalyzed(&file.module);
                }
                (Some(err), ParsePolicy::BestEffort) => {
                    tracing::warn!(
                        module = %file.module,
                        recovered = extraction.imports.len(),
                        error = %err,
                        "module has syntax errors, keeping recovered imports"
                    );
                    graph.add_imports(&file.module, extraction.imports);
                }
            }
        }

        tracing::debug!(
            modules = graph.modules.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            unanalyzed = graph.unanalyzed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "built dependency graph"
        );
        Ok(graph)
    }

    /// Add edges from `importer` to each of `imports`. Targets that are not
    /// discovered modules become dangling nodes, except names imported from
    /// a plain module (`from pkg.a import value`), which are attributes.
    pub fn add_imports(&mut self, importer: &ModuleId, imports: impl IntoIterator<Item = ModuleId>) {
        for imported in imports {
            if self.is_module_attribute(&imported) {
                continue;
            }
            self.add_edge(importer, imported);
        }
    }

    fn is_module_attribute(&self, name: &ModuleId) -> bool {
        if self.modules.contains(name) {
            return false;
        }
        name.parent()
            .and_then(|parent| self.modules.get(&parent))
            .is_some_and(|parent| !parent.is_package)
    }

    pub fn add_edge(&mut self, importer: &ModuleId, imported: ModuleId) {
        self.forward.entry(imported.clone()).or_default();
        self.reverse
            .entry(imported.clone())
            .or_default()
            .insert(importer.clone());
        self.reverse.entry(importer.clone()).or_default();
        self.forward
            .entry(importer.clone())
            .or_default()
            .insert(imported);
    }

    pub fn mark_unanalyzed(&mut self, module: &ModuleId) {
        self.unanalyzed.insert(module.clone());
    }

    /// Every module that imports `node` directly or transitively. Never
    /// contains `node` itself; unknown nodes have no ancestors.
    pub fn ancestors(&self, node: &ModuleId) -> BTreeSet<ModuleId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node);
        while let Some(current) = queue.pop_front() {
            let Some(importers) = self.reverse.get(current) else {
                continue;
            };
            for importer in importers {
                if importer == node {
                    continue;
                }
                if visited.insert(importer.clone()) {
                    queue.push_back(importer);
                }
            }
        }
        visited
    }

    /// Modules `node` imports directly.
    pub fn dependencies(&self, node: &ModuleId) -> impl Iterator<Item = &ModuleId> {
        self.forward.get(node).into_iter().flatten()
    }

    /// Modules importing `node` directly.
    pub fn dependents(&self, node: &ModuleId) -> impl Iterator<Item = &ModuleId> {
        self.reverse.get(node).into_iter().flatten()
    }

    pub fn contains(&self, node: &ModuleId) -> bool {
        self.forward.contains_key(node)
    }

    /// True for nodes that are import targets without a discovered file.
    pub fn is_dangling(&self, node: &ModuleId) -> bool {
        self.contains(node) && !self.modules.contains(node)
    }

    pub fn source_file(&self, node: &ModuleId) -> Option<&SourceFile> {
        self.modules.get(node)
    }

    pub fn role(&self, node: &ModuleId) -> Option<ModuleRole> {
        self.modules.get(node).map(|file| file.role)
    }

    pub fn is_test(&self, node: &ModuleId) -> bool {
        self.role(node).is_some_and(ModuleRole::is_test)
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.modules
    }

    pub fn test_modules(&self) -> impl Iterator<Item = &SourceFile> {
        self.modules.iter().filter(|file| file.role.is_test())
    }

    pub fn fixture_modules(&self) -> impl Iterator<Item = &SourceFile> {
        self.modules.iter().filter(|file| file.role.is_fixture())
    }

    pub fn edges(&self) -> impl Iterator<Item = (&ModuleId, &ModuleId)> {
        self.forward
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from, to)))
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn node_count(&self) -> usize {
        self.forward.len()
    }

    pub fn unanalyzed(&self) -> &BTreeSet<ModuleId> {
        &self.unanalyzed
    }

    pub fn namespace(&self) -> &NamespaceConfig {
        &self.namespace
    }

    pub fn fingerprint(&self) -> &str {
        self.modules.fingerprint()
    }
}

fn extract_file(
    extractor: &mut ImportExtractor,
    file: &SourceFile,
    namespace: &NamespaceConfig,
) -> Extraction {
    match fs::read(&file.path) {
        // python sources may declare other encodings; imports are ascii
        Ok(bytes) => extractor.extract(&String::from_utf8_lossy(&bytes), file, namespace),
        Err(err) => Extraction {
            imports: BTreeSet::new(),
            error: Some(ParseError::new(&file.path, format!("cannot read file: {err}"))),
        },
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, importers) in &self.reverse {
            let names: Vec<&str> = importers.iter().map(ModuleId::as_str).collect();
            let mut flags = String::new();
            if self.is_dangling(node) {
                flags.push_str(" (missing)");
            }
            if self.unanalyzed.contains(node) {
                flags.push_str(" (unanalyzed)");
            }
            writeln!(f, "{node}{flags} -> [{}]", names.join(", "))?;
        }
        Ok(())
    }
}
