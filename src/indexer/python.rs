use crate::config::NamespaceConfig;
use crate::error::{ParseError, Result};
use crate::indexer::{ModuleId, SourceFile};
use std::collections::BTreeSet;
use tree_sitter::{Node, Parser};

/// Imports found in one file. `error` is set when the tree contained syntax
/// errors; `imports` then holds whatever the error-tolerant parse recovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub imports: BTreeSet<ModuleId>,
    pub error: Option<ParseError>,
}

/// Static import extractor for python source. Parse-only: nothing is
/// imported or evaluated.
pub struct ImportExtractor {
    parser: Parser,
}

impl ImportExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }

    /// In-namespace modules imported by `file`, or a `ParseError` if the
    /// source has syntax errors.
    pub fn extract_imports(
        &mut self,
        source: &str,
        file: &SourceFile,
        namespace: &NamespaceConfig,
    ) -> std::result::Result<BTreeSet<ModuleId>, ParseError> {
        let extraction = self.extract(source, file, namespace);
        match extraction.error {
            Some(err) => Err(err),
            None => Ok(extraction.imports),
        }
    }

    /// Extract imports without deciding what a syntax error means.
    pub fn extract(
        &mut self,
        source: &str,
        file: &SourceFile,
        namespace: &NamespaceConfig,
    ) -> Extraction {
        let Some(tree) = self.parser.parse(source, None) else {
            return Extraction {
                imports: BTreeSet::new(),
                error: Some(ParseError::new(&file.path, "parser produced no syntax tree")),
            };
        };
        let root = tree.root_node();
        let error = root
            .has_error()
            .then(|| ParseError::new(&file.path, describe_error(root)));

        let base_package = base_package_parts(&file.module, file.is_package);
        let mut candidates = Vec::new();
        collect_imports(root, source, &base_package, &file.module, &mut candidates);

        let mut imports = BTreeSet::new();
        for candidate in candidates {
            for name in with_parent_packages(&candidate) {
                if namespace.owns(&name) {
                    imports.insert(ModuleId::new(name));
                }
            }
        }
        Extraction { imports, error }
    }
}

fn collect_imports(
    root: Node<'_>,
    source: &str,
    base_package: &[String],
    module: &ModuleId,
    out: &mut Vec<String>,
) {
    // iterative walk: imports may sit at any depth (functions, branches,
    // try blocks, TYPE_CHECKING guards)
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    if let Some(dotted) = imported_name(name, source) {
                        out.push(dotted);
                    }
                }
                continue;
            }
            "import_from_statement" => {
                handle_from_import(node, source, base_package, module, out);
                continue;
            }
            // `from __future__ import x` names compiler features
            "future_import_statement" => continue,
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
}

fn handle_from_import(
    node: Node<'_>,
    source: &str,
    base_package: &[String],
    module: &ModuleId,
    out: &mut Vec<String>,
) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let raw = compact_text(module_node, source);
    let base = match module_node.kind() {
        "relative_import" => match absolutize_module(&raw, base_package) {
            Some(value) => value,
            None => {
                tracing::debug!(
                    module = %module,
                    import = %raw,
                    "relative import climbs above the top-level package"
                );
                return;
            }
        },
        _ => raw,
    };
    if base.is_empty() {
        return;
    }
    out.push(base.clone());

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        if let Some(item) = imported_name(name, source) {
            out.push(format!("{base}.{item}"));
        }
    }
}

/// Dotted name of an import target, ignoring any `as` alias.
fn imported_name(node: Node<'_>, source: &str) -> Option<String> {
    let target = match node.kind() {
        "aliased_import" => node.child_by_field_name("name")?,
        "dotted_name" => node,
        _ => return None,
    };
    let text = compact_text(target, source);
    (!text.is_empty()).then_some(text)
}

fn compact_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .split_whitespace()
        .collect()
}

/// `a.b.c` -> `a`, `a.b`, `a.b.c`: importing a dotted name runs every
/// enclosing package first.
fn with_parent_packages(name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for part in name.split('.').filter(|part| !part.is_empty()) {
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(part);
        out.push(current.clone());
    }
    out
}

fn describe_error(root: Node<'_>) -> String {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return format!("syntax error at line {}, column {}", pos.row + 1, pos.column + 1);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    "syntax error".to_string()
}

/// Package a relative import is resolved against: the module itself for a
/// package `__init__`, otherwise its parent.
fn base_package_parts(module: &ModuleId, is_package: bool) -> Vec<String> {
    let parts: Vec<&str> = module.parts().filter(|part| !part.is_empty()).collect();
    let keep = if is_package {
        parts.len()
    } else {
        parts.len().saturating_sub(1)
    };
    parts[..keep].iter().map(|part| part.to_string()).collect()
}

fn absolutize_module(candidate: &str, base_package: &[String]) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('.') {
        return Some(trimmed.to_string());
    }
    let dot_count = trimmed.chars().take_while(|ch| *ch == '.').count();
    let rest = &trimmed[dot_count..];
    let up = dot_count.saturating_sub(1);
    if up >= base_package.len() {
        return None;
    }
    let mut parts: Vec<String> = base_package.to_vec();
    parts.truncate(parts.len() - up);
    for segment in rest.split('.').filter(|part| !part.is_empty()) {
        parts.push(segment.to_string());
    }
    Some(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_resolution_uses_package_depth() {
        let base = base_package_parts(&ModuleId::new("pkg.sub.mod"), false);
        assert_eq!(base, vec!["pkg", "sub"]);
        assert_eq!(absolutize_module(".", &base).as_deref(), Some("pkg.sub"));
        assert_eq!(absolutize_module(".x", &base).as_deref(), Some("pkg.sub.x"));
        assert_eq!(absolutize_module("..y.z", &base).as_deref(), Some("pkg.y.z"));
        assert_eq!(absolutize_module("...", &base), None);

        let base = base_package_parts(&ModuleId::new("pkg.sub"), true);
        assert_eq!(base, vec!["pkg", "sub"]);
        assert_eq!(absolutize_module("..", &base).as_deref(), Some("pkg"));
    }

    #[test]
    fn parents_are_emitted() {
        assert_eq!(with_parent_packages("a.b.c"), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(with_parent_packages("a"), vec!["a"]);
    }
}
