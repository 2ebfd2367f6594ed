use std::path::{Component, Path, PathBuf};

/// Render a path with forward slashes, dropping `.` components.
pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn normalize_rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(normalize_path(rel))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
///
/// Deleted files cannot be canonicalized, so changed paths go through this
/// instead of `fs::canonicalize`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join `path` onto `base` unless it is already absolute, then clean it.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(&base.join(path))
    }
}

/// Canonicalize when possible. For paths that no longer exist, canonicalize
/// the closest existing ancestor and re-attach the missing tail, so deleted
/// files still compare equal to canonical namespace roots.
pub fn canonical_or_clean(path: &Path) -> PathBuf {
    let cleaned = clean_path(path);
    if let Ok(found) = cleaned.canonicalize() {
        return found;
    }
    let mut tail = Vec::new();
    let mut current = cleaned.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(mut found) = parent.canonicalize() {
            for name in tail.iter().rev() {
                found.push(name);
            }
            return found;
        }
        current = parent;
    }
    cleaned
}

/// True for names Python accepts as a module or package component.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch == '_' || ch.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_alphanumeric())
}
