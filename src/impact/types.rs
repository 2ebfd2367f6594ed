//! Type definitions for impact analysis
//!
//! Inputs (changed files), the context handed to every strategy, and the
//! report returned to callers.

use crate::config::NamespaceConfig;
use crate::graph::DependencyGraph;
use crate::indexer::{ModuleId, SourceFile, TestNaming};
use serde::Serialize;
use std::path::PathBuf;

/// Change status as reported by version control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Modified,
    Added,
    Deleted,
    Untracked,
}

impl ChangeStatus {
    pub fn is_deleted(self) -> bool {
        self == ChangeStatus::Deleted
    }
}

/// A file reported as changed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub status: ChangeStatus,
}

impl ChangedFile {
    pub fn new(path: impl Into<PathBuf>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeStatus::Modified)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeStatus::Deleted)
    }
}

/// A changed file resolved to its module. `source.path` is the absolute
/// path even when the file no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedModule {
    pub source: SourceFile,
    pub status: ChangeStatus,
}

impl ChangedModule {
    pub fn id(&self) -> &ModuleId {
        &self.source.module
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }
}

/// Everything a strategy may look at for one analysis run.
///
/// `changed_files` holds every reported file, including those outside the
/// namespace roots, with absolute normalized paths.
#[derive(Debug, Clone, Copy)]
pub struct ImpactContext<'a> {
    pub changed_files: &'a [ChangedFile],
    pub changed_modules: &'a [ChangedModule],
    pub graph: &'a DependencyGraph,
    pub namespace: &'a NamespaceConfig,
    pub naming: &'a TestNaming,
}

/// A changed file that could not be mapped to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedChange {
    pub path: PathBuf,
    pub reason: String,
}

/// Statistics for a single strategy run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyStats {
    pub name: String,
    pub duration_ms: u64,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one analysis run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImpactReport {
    /// Impacted test modules, sorted
    pub impacted: Vec<ModuleId>,
    /// Files of the impacted test modules, same order as `impacted`
    pub paths: Vec<PathBuf>,
    pub changed_modules: Vec<ModuleId>,
    pub unresolved: Vec<UnresolvedChange>,
    pub strategies: Vec<StrategyStats>,
    /// True when a strategy failed and was skipped; coverage is incomplete
    pub degraded: bool,
    /// Modules whose imports are unknown because they failed to parse
    pub unanalyzed: Vec<ModuleId>,
}

impl ImpactReport {
    pub fn is_empty(&self) -> bool {
        self.impacted.is_empty()
    }
}
