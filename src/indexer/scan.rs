use crate::config::{NamespaceConfig, NamespaceRoot};
use crate::error::{ImpactError, Result};
use crate::util;
use blake3::Hasher;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the root's base, forward slashes.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScanOptions {
    pub respect_gitignore: bool,
}

impl ScanOptions {
    pub fn new(respect_gitignore: bool) -> Self {
        Self { respect_gitignore }
    }
}

/// Every python source file under one namespace root, sorted by path.
pub fn scan_root(root: &NamespaceRoot, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(&root.dir);
    if options.respect_gitignore {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    } else {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    }
    let walker = builder
        .hidden(false)
        .follow_links(false)
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(root = %root.dir.display(), error = %err, "walk error");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if !is_python_source(path) {
            continue;
        }
        let Some(rel_path) = util::normalize_rel_path(&root.base, path) else {
            continue;
        };
        let metadata = fs::metadata(path).map_err(|source| ImpactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            size: metadata.len(),
            modified,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Scan every root of the namespace, package root first.
pub fn scan_namespace(
    namespace: &NamespaceConfig,
    options: ScanOptions,
) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    for root in namespace.roots() {
        files.extend(scan_root(root, options)?);
    }
    Ok(files)
}

/// Identity of a scanned file set: paths, sizes and modification times.
/// Any add, delete, rename or edit under the roots changes it.
pub fn fingerprint(files: &[ScannedFile]) -> String {
    let mut hasher = Hasher::new();
    for file in files {
        hasher.update(file.rel_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&file.size.to_le_bytes());
        hasher.update(&file.modified.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Fingerprint the namespace without building anything from it.
pub fn fingerprint_namespace(namespace: &NamespaceConfig, options: ScanOptions) -> Result<String> {
    Ok(fingerprint(&scan_namespace(namespace, options)?))
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    let name = entry.file_name();
    if name == OsStr::new("__pycache__") {
        return true;
    }
    if !entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
        return false;
    }
    // directories that cannot be a package component are never importable
    match name.to_str() {
        Some(name) => name.starts_with('.') || !util::is_identifier(name),
        None => true,
    }
}

pub fn is_python_source(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("py")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamespaceConfig;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn scan_skips_caches_hidden_and_non_python() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "pkg/__init__.py", "");
        write(root, "pkg/a.py", "");
        write(root, "pkg/__pycache__/a.cpython-312.py", "");
        write(root, "pkg/.hidden/b.py", "");
        write(root, "pkg/not-a-package/c.py", "");
        write(root, "pkg/data.json", "{}");

        let namespace = NamespaceConfig::new(root.join("pkg"), None).unwrap();
        let files = scan_namespace(&namespace, ScanOptions::default()).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["pkg/__init__.py", "pkg/a.py"]);
    }

    #[test]
    fn fingerprint_changes_with_file_set() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "pkg/a.py", "");
        let namespace = NamespaceConfig::new(root.join("pkg"), None).unwrap();

        let first = fingerprint_namespace(&namespace, ScanOptions::default()).unwrap();
        let again = fingerprint_namespace(&namespace, ScanOptions::default()).unwrap();
        assert_eq!(first, again);

        write(root, "pkg/b.py", "");
        let after = fingerprint_namespace(&namespace, ScanOptions::default()).unwrap();
        assert_ne!(first, after);
    }
}
