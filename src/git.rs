//! Changed-file retrieval from git
//!
//! Two comparison modes:
//! - `unstaged`: everything that differs from HEAD in the working tree or
//!   the index, plus untracked files
//! - `branch`: everything that differs from a base ref, plus untracked files
//!
//! Paths are returned absolute, joined onto the repository top level.
//! A rename is reported as a deletion of the old path and an addition of
//! the new one, so importers of the old module are still found.

use crate::impact::types::{ChangeStatus, ChangedFile};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GitMode {
    /// Uncommitted changes in the working tree and index
    #[default]
    Unstaged,
    /// All changes on the current branch relative to a base ref
    Branch,
}

pub fn changed_files(repo: &Path, mode: GitMode, base: Option<&str>) -> Result<Vec<ChangedFile>> {
    let toplevel = PathBuf::from(run_git(repo, &["rev-parse", "--show-toplevel"])?.trim());

    let mut entries = match mode {
        GitMode::Unstaged => {
            let out = run_git(repo, &["status", "--porcelain", "-z", "--untracked-files=all"])?;
            parse_porcelain(&out)
        }
        GitMode::Branch => {
            let base = base.context("branch mode needs a base ref (--base-branch)")?;
            let spec = format!("{base}^{{commit}}");
            run_git(repo, &["rev-parse", "--verify", "--quiet", &spec])
                .with_context(|| format!("unknown base ref `{base}`"))?;
            let diff = run_git(repo, &["diff", "--name-status", "-z", base])?;
            let mut entries = parse_name_status(&diff);
            let untracked = run_git(repo, &["ls-files", "--others", "--exclude-standard", "-z"])?;
            entries.extend(
                untracked
                    .split('\0')
                    .filter(|path| !path.is_empty())
                    .map(|path| (path.to_string(), ChangeStatus::Untracked)),
            );
            entries
        }
    };

    entries.sort();
    entries.dedup();
    tracing::debug!(mode = ?mode, files = entries.len(), "collected changed files from git");
    Ok(entries
        .into_iter()
        .map(|(path, status)| ChangedFile::new(toplevel.join(path), status))
        .collect())
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `git status --porcelain -z`. Entries are `XY path`, and renames or
/// copies carry the original path in the following field.
fn parse_porcelain(raw: &str) -> Vec<(String, ChangeStatus)> {
    let mut out = Vec::new();
    let mut fields = raw.split('\0').filter(|field| !field.is_empty());
    while let Some(entry) = fields.next() {
        if entry.len() < 4 {
            continue;
        }
        let (code, path) = entry.split_at(3);
        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        let path = path.to_string();

        if x == 'R' || x == 'C' {
            let original = fields.next();
            if x == 'R' {
                if let Some(original) = original {
                    out.push((original.to_string(), ChangeStatus::Deleted));
                }
            }
            let status = if y == 'D' {
                ChangeStatus::Deleted
            } else {
                ChangeStatus::Added
            };
            out.push((path, status));
            continue;
        }

        let status = match (x, y) {
            ('?', '?') => ChangeStatus::Untracked,
            ('D', _) | (_, 'D') => ChangeStatus::Deleted,
            ('A', _) => ChangeStatus::Added,
            _ => ChangeStatus::Modified,
        };
        out.push((path, status));
    }
    out
}

/// Parse `git diff --name-status -z`: a status field followed by one path,
/// or two for renames and copies.
fn parse_name_status(raw: &str) -> Vec<(String, ChangeStatus)> {
    let mut out = Vec::new();
    let mut fields = raw.split('\0').filter(|field| !field.is_empty());
    while let Some(code) = fields.next() {
        let Some(kind) = code.chars().next() else {
            continue;
        };
        match kind {
            'R' | 'C' => {
                let (Some(old), Some(new)) = (fields.next(), fields.next()) else {
                    break;
                };
                if kind == 'R' {
                    out.push((old.to_string(), ChangeStatus::Deleted));
                }
                out.push((new.to_string(), ChangeStatus::Added));
            }
            _ => {
                let Some(path) = fields.next() else {
                    break;
                };
                let status = match kind {
                    'A' => ChangeStatus::Added,
                    'D' => ChangeStatus::Deleted,
                    _ => ChangeStatus::Modified,
                };
                out.push((path.to_string(), status));
            }
        }
    }
    out
}
