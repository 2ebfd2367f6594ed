//! Error types for impact analysis.
//!
//! Each failure class carries the path, module or strategy it concerns so a
//! caller can report it without extra bookkeeping:
//!
//! - `ConfigurationError`: bad namespace roots; fatal, raised before analysis
//! - `ParseError`: a source file could not be parsed; recoverable per file
//! - `ResolutionError`: path/module mapping failed; recoverable per file
//! - `StrategyError`: a named strategy could not complete
//!
//! `ImpactError` unifies them for the public entry points.

use std::path::PathBuf;

use thiserror::Error;

/// Namespace or tests-directory configuration is unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration for {}: {reason}", path.display())]
pub struct ConfigurationError {
    pub path: PathBuf,
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A source file could not be read or parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to parse {}: {message}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Mapping between a filesystem path and a module identifier failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("{} is not inside any namespace root", path.display())]
    OutsideRoot { path: PathBuf },

    #[error("{} is not an importable python module", path.display())]
    NotSource { path: PathBuf },

    #[error("{} contains a component that is not a valid identifier: {component}", path.display())]
    InvalidComponent { path: PathBuf, component: String },

    #[error("no file found for module {module}")]
    ModuleNotFound { module: String },
}

/// A strategy failed; carries the strategy name so degraded runs can say which.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("strategy `{strategy}` failed: {reason}")]
pub struct StrategyError {
    pub strategy: String,
    pub reason: String,
}

impl StrategyError {
    pub fn new(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

/// Unified error for the analysis entry points.
#[derive(Debug, Error)]
pub enum ImpactError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("failed to load the python grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = ImpactError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = ConfigurationError::new("/repo/pkg", "directory does not exist");
        assert_eq!(
            err.to_string(),
            "invalid configuration for /repo/pkg: directory does not exist"
        );

        let err = StrategyError::new("imports", "graph unavailable");
        assert_eq!(err.to_string(), "strategy `imports` failed: graph unavailable");

        let err = ResolutionError::ModuleNotFound {
            module: "pkg.gone".to_string(),
        };
        assert_eq!(err.to_string(), "no file found for module pkg.gone");
    }

    #[test]
    fn impact_error_is_transparent() {
        let err: ImpactError = ParseError::new("pkg/bad.py", "syntax error at line 3").into();
        assert_eq!(err.to_string(), "failed to parse pkg/bad.py: syntax error at line 3");
        assert!(matches!(err, ImpactError::Parse(_)));
    }
}
