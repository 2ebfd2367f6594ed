//! Static test impact analysis for python packages.
//!
//! Given the files that changed, `impacted` builds a module import graph
//! from source (nothing is imported or executed), then asks a set of
//! strategies which test modules could observe the change. The result errs
//! on the side of running too many tests, never too few.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod graph;
pub mod impact;
pub mod indexer;
pub mod util;

pub use cache::ResultCache;
pub use config::{EngineConfig, NamespaceConfig};
pub use error::{ConfigurationError, ImpactError, ParseError, ResolutionError, StrategyError};
pub use graph::{BuildOptions, DependencyGraph, ParsePolicy};
pub use impact::{
    ChangeStatus, ChangedFile, FailureMode, ImpactAnalyzer, ImpactReport, ImpactStrategy,
    StrategyComposer, default_strategies, get_impacted_tests, matches_impacted_tests,
};
pub use indexer::{ModuleId, ModuleRole, SourceFile, discover_modules, module_to_path, path_to_module};
