// Configuration for impacted
// Engine settings come from environment variables with sensible defaults;
// namespace roots are validated before any analysis starts.

use crate::error::ConfigurationError;
use crate::graph::ParsePolicy;
use crate::impact::composer::FailureMode;
use crate::util;
use clap::ValueEnum;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Result cache capacity in namespaces (IMPACTED_CACHE_CAPACITY)
    pub cache_capacity: usize,

    /// Parse files on the rayon pool (IMPACTED_PARALLEL)
    pub parallel: bool,

    /// What to do with files that fail to parse (IMPACTED_PARSE_POLICY)
    pub parse_policy: ParsePolicy,

    /// Keep going when a strategy fails (IMPACTED_PARTIAL_RESULTS)
    pub partial_results: bool,

    /// Skip gitignored files during discovery (IMPACTED_RESPECT_GITIGNORE)
    pub respect_gitignore: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 8,
            parallel: false,
            parse_policy: ParsePolicy::Skip,
            partial_results: false,
            respect_gitignore: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = EngineConfig::default();

        if let Some(val) = lookup("IMPACTED_CACHE_CAPACITY") {
            match val.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.cache_capacity = parsed,
                _ => tracing::warn!(
                    value = %val,
                    default = config.cache_capacity,
                    "invalid IMPACTED_CACHE_CAPACITY, using default"
                ),
            }
        }

        if let Some(val) = lookup("IMPACTED_PARALLEL") {
            match parse_flag(&val) {
                Some(parsed) => config.parallel = parsed,
                None => tracing::warn!(value = %val, "invalid IMPACTED_PARALLEL, using default"),
            }
        }

        if let Some(val) = lookup("IMPACTED_PARSE_POLICY") {
            match ParsePolicy::from_str(val.trim(), true) {
                Ok(parsed) => config.parse_policy = parsed,
                Err(_) => tracing::warn!(
                    value = %val,
                    "invalid IMPACTED_PARSE_POLICY, using default"
                ),
            }
        }

        if let Some(val) = lookup("IMPACTED_PARTIAL_RESULTS") {
            match parse_flag(&val) {
                Some(parsed) => config.partial_results = parsed,
                None => tracing::warn!(
                    value = %val,
                    "invalid IMPACTED_PARTIAL_RESULTS, using default"
                ),
            }
        }

        if let Some(val) = lookup("IMPACTED_RESPECT_GITIGNORE") {
            match parse_flag(&val) {
                Some(parsed) => config.respect_gitignore = parsed,
                None => tracing::warn!(
                    value = %val,
                    "invalid IMPACTED_RESPECT_GITIGNORE, using default"
                ),
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static EngineConfig {
        CONFIG.get_or_init(EngineConfig::from_env)
    }

    pub fn failure_mode(&self) -> FailureMode {
        if self.partial_results {
            FailureMode::Partial
        } else {
            FailureMode::FailFast
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// One directory of importable modules.
///
/// `base` is the directory placed on the import path, so module identifiers
/// are computed relative to it and always start with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceRoot {
    pub dir: PathBuf,
    pub base: PathBuf,
    pub prefix: String,
}

impl NamespaceRoot {
    fn from_dir(dir: &Path) -> Result<Self, ConfigurationError> {
        let dir = validate_dir(dir)?;
        let name = dir
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigurationError::new(&dir, "directory has no usable name"))?
            .to_string();
        if !util::is_identifier(&name) {
            return Err(ConfigurationError::new(
                &dir,
                format!("`{name}` is not a valid python package name"),
            ));
        }
        let base = dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigurationError::new(&dir, "namespace root has no parent directory"))?;
        Ok(Self {
            dir,
            base,
            prefix: name,
        })
    }

    /// True when `module` is this root's package or lives underneath it.
    pub fn owns(&self, module: &str) -> bool {
        module == self.prefix
            || (module.len() > self.prefix.len()
                && module.starts_with(self.prefix.as_str())
                && module.as_bytes()[self.prefix.len()] == b'.')
    }
}

/// Primary package root plus an optional out-of-package tests root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceConfig {
    package: NamespaceRoot,
    tests: Option<NamespaceRoot>,
}

impl NamespaceConfig {
    /// Validate both roots. A tests root nested inside the package root is
    /// dropped since its modules are discovered under the package anyway.
    pub fn new(
        package_root: impl AsRef<Path>,
        tests_root: Option<&Path>,
    ) -> Result<Self, ConfigurationError> {
        let package = NamespaceRoot::from_dir(package_root.as_ref())?;
        let tests = match tests_root {
            Some(path) => Some(NamespaceRoot::from_dir(path)?),
            None => None,
        };
        Self::from_roots(package, tests)
    }

    /// Resolve a dotted package name (`pkg` or `company.pkg`) against a repo
    /// root, the way the host test runner sees it from its working directory.
    pub fn from_module_name(
        repo_root: &Path,
        module: &str,
        tests_dir: Option<&Path>,
    ) -> Result<Self, ConfigurationError> {
        let repo_root = validate_dir(repo_root)?;
        let segments: Vec<&str> = module.split('.').collect();
        let rel: PathBuf = segments.iter().collect();
        let dir = repo_root.join(&rel);
        if !dir.is_dir() {
            let mut reason = format!(
                "module `{module}` not found (no `{}` directory under the repository root)",
                util::normalize_path(&rel)
            );
            if module.contains('-') {
                let suggestion = module.replace('-', "_");
                let suggestion_dir: PathBuf = suggestion.split('.').collect();
                if repo_root.join(&suggestion_dir).is_dir() {
                    reason = format!(
                        "module `{module}` not found; python module names use underscores. Did you mean: {suggestion}"
                    );
                }
            }
            return Err(ConfigurationError::new(dir, reason));
        }
        if let Some(bad) = segments.iter().find(|seg| !util::is_identifier(seg)) {
            return Err(ConfigurationError::new(
                &dir,
                format!("`{bad}` is not a valid python package name"),
            ));
        }
        let package = NamespaceRoot {
            dir: validate_dir(&dir)?,
            base: repo_root.clone(),
            prefix: module.to_string(),
        };
        let tests = match tests_dir {
            Some(path) => Some(NamespaceRoot::from_dir(&util::absolutize(&repo_root, path))?),
            None => None,
        };
        Self::from_roots(package, tests)
    }

    fn from_roots(
        package: NamespaceRoot,
        tests: Option<NamespaceRoot>,
    ) -> Result<Self, ConfigurationError> {
        let tests = match tests {
            Some(tests) if tests.dir.starts_with(&package.dir) => {
                tracing::info!(
                    tests_root = %tests.dir.display(),
                    "tests root is inside the package root, discovering it as part of the package"
                );
                None
            }
            Some(tests) => {
                if package.owns(&tests.prefix) || tests.owns(&package.prefix) {
                    return Err(ConfigurationError::new(
                        &tests.dir,
                        format!(
                            "tests root `{}` collides with package namespace `{}`",
                            tests.prefix, package.prefix
                        ),
                    ));
                }
                Some(tests)
            }
            None => None,
        };
        Ok(Self { package, tests })
    }

    pub fn package_root(&self) -> &Path {
        &self.package.dir
    }

    pub fn tests_root(&self) -> Option<&Path> {
        self.tests.as_ref().map(|root| root.dir.as_path())
    }

    pub fn package(&self) -> &NamespaceRoot {
        &self.package
    }

    /// Roots in discovery order, package first.
    pub fn roots(&self) -> impl Iterator<Item = &NamespaceRoot> {
        std::iter::once(&self.package).chain(self.tests.iter())
    }

    /// The root whose directory contains `path`, if any.
    pub fn root_for(&self, path: &Path) -> Option<&NamespaceRoot> {
        self.roots().find(|root| path.starts_with(&root.dir))
    }

    /// True when a dotted module name belongs to the analyzed namespace.
    pub fn owns(&self, module: &str) -> bool {
        self.roots().any(|root| root.owns(module))
    }
}

fn validate_dir(path: &Path) -> Result<PathBuf, ConfigurationError> {
    if !path.exists() {
        return Err(ConfigurationError::new(path, "directory does not exist"));
    }
    if !path.is_dir() {
        return Err(ConfigurationError::new(path, "not a directory"));
    }
    path.canonicalize()
        .map_err(|err| ConfigurationError::new(path, format!("cannot resolve path: {err}")))
}
