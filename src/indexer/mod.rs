//! Module resolution and discovery.
//!
//! Maps filesystem paths to dotted module identifiers and back, and
//! enumerates every importable unit under the configured namespace roots.
//! Nothing here imports or executes the analyzed code.

use crate::config::{NamespaceConfig, NamespaceRoot};
use crate::error::{ResolutionError, Result};
use crate::util;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub mod python;
pub mod scan;
pub mod test_detection;

pub use test_detection::{ModuleRole, TestNaming};

/// Dotted logical name of a module, e.g. `pkg.sub.mod`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The enclosing package, `None` for a top-level name.
    pub fn parent(&self) -> Option<ModuleId> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| ModuleId::new(parent))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        ModuleId::new(value)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A discovered (or changed) python file and its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub module: ModuleId,
    pub role: ModuleRole,
    /// True for `__init__.py`: the file stands for its package.
    pub is_package: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DiscoveryOptions {
    pub scan: scan::ScanOptions,
    pub naming: TestNaming,
}

/// Every importable unit of a namespace, keyed by module identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet {
    modules: BTreeMap<ModuleId, SourceFile>,
    fingerprint: String,
}

impl ModuleSet {
    pub fn get(&self, module: &ModuleId) -> Option<&SourceFile> {
        self.modules.get(module)
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.modules.contains_key(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.modules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Insert a source file. On an identifier collision the package
    /// (`x/__init__.py`) shadows the plain module (`x.py`), as at runtime.
    pub fn insert(&mut self, file: SourceFile) {
        match self.modules.entry(file.module.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(file);
            }
            Entry::Occupied(mut slot) => {
                let (kept, shadowed) = if file.is_package && !slot.get().is_package {
                    let old = slot.insert(file);
                    (slot.get().path.clone(), old.path)
                } else {
                    (slot.get().path.clone(), file.path)
                };
                tracing::warn!(
                    module = %slot.key(),
                    kept = %kept.display(),
                    shadowed = %shadowed.display(),
                    "two files map to the same module, ignoring the shadowed one"
                );
            }
        }
    }
}

/// Map a path inside the namespace to its module identifier.
pub fn path_to_module(
    path: &Path,
    namespace: &NamespaceConfig,
) -> std::result::Result<ModuleId, ResolutionError> {
    resolve_source(path, namespace, &TestNaming::default()).map(|file| file.module)
}

/// Resolve a path to a classified source file. Purely lexical, so deleted
/// files resolve the same way they did while present.
pub fn resolve_source(
    path: &Path,
    namespace: &NamespaceConfig,
    naming: &TestNaming,
) -> std::result::Result<SourceFile, ResolutionError> {
    let root = namespace
        .root_for(path)
        .ok_or_else(|| ResolutionError::OutsideRoot {
            path: path.to_path_buf(),
        })?;
    resolve_in_root(path, root, naming)
}

fn resolve_in_root(
    path: &Path,
    root: &NamespaceRoot,
    naming: &TestNaming,
) -> std::result::Result<SourceFile, ResolutionError> {
    if !scan::is_python_source(path) {
        return Err(ResolutionError::NotSource {
            path: path.to_path_buf(),
        });
    }
    let rel = path
        .strip_prefix(&root.base)
        .map_err(|_| ResolutionError::OutsideRoot {
            path: path.to_path_buf(),
        })?;

    let mut parts = Vec::new();
    for comp in rel.components() {
        let Component::Normal(name) = comp else {
            return Err(ResolutionError::OutsideRoot {
                path: path.to_path_buf(),
            });
        };
        let name = name.to_str().ok_or_else(|| ResolutionError::InvalidComponent {
            path: path.to_path_buf(),
            component: name.to_string_lossy().to_string(),
        })?;
        parts.push(name);
    }

    let file_name = parts.pop().ok_or_else(|| ResolutionError::NotSource {
        path: path.to_path_buf(),
    })?;
    let stem = file_name.strip_suffix(".py").unwrap_or(file_name);
    if let Some(bad) = parts
        .iter()
        .chain(std::iter::once(&stem))
        .find(|part| !util::is_identifier(part))
    {
        return Err(ResolutionError::InvalidComponent {
            path: path.to_path_buf(),
            component: bad.to_string(),
        });
    }

    let is_package = stem == "__init__";
    if !is_package {
        parts.push(stem);
    }
    if parts.is_empty() {
        return Err(ResolutionError::NotSource {
            path: path.to_path_buf(),
        });
    }

    Ok(SourceFile {
        path: path.to_path_buf(),
        module: ModuleId::new(parts.join(".")),
        role: naming.classify(rel),
        is_package,
    })
}

/// Locate the file behind a module identifier.
pub fn module_to_path(
    module: &ModuleId,
    namespace: &NamespaceConfig,
) -> std::result::Result<PathBuf, ResolutionError> {
    let not_found = || ResolutionError::ModuleNotFound {
        module: module.to_string(),
    };
    let root = namespace
        .roots()
        .find(|root| root.owns(module.as_str()))
        .ok_or_else(not_found)?;
    let mut rel = PathBuf::new();
    for part in module.parts() {
        rel.push(part);
    }
    let package_init = root.base.join(&rel).join("__init__.py");
    if package_init.is_file() {
        return Ok(package_init);
    }
    let module_file = root.base.join(&rel).with_extension("py");
    if module_file.is_file() {
        return Ok(module_file);
    }
    Err(not_found())
}

/// Enumerate every importable unit under the namespace roots.
pub fn discover_modules(namespace: &NamespaceConfig, options: &DiscoveryOptions) -> Result<ModuleSet> {
    let files = scan::scan_namespace(namespace, options.scan)?;
    let mut set = ModuleSet {
        modules: BTreeMap::new(),
        fingerprint: scan::fingerprint(&files),
    };
    for file in &files {
        match resolve_source(&file.abs_path, namespace, &options.naming) {
            Ok(source) => set.insert(source),
            Err(err) => tracing::debug!(error = %err, "skipping non-importable file"),
        }
    }
    tracing::debug!(
        modules = set.len(),
        fingerprint = %set.fingerprint,
        "discovered modules"
    );
    Ok(set)
}
