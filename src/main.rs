use anyhow::{Context, Result};
use clap::Parser;
use impacted::cli::{self, OutputFormat};
use impacted::config::{EngineConfig, NamespaceConfig};
use impacted::impact::{ChangedFile, FailureMode, ImpactAnalyzer};
use impacted::{git, util};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("IMPACTED_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn namespace_for(repo: &Path, module: &str, tests_dir: Option<&Path>) -> Result<NamespaceConfig> {
    NamespaceConfig::from_module_name(repo, module, tests_dir)
        .with_context(|| format!("cannot analyze module `{module}`"))
}

fn explicit_changes(repo: &Path, files: &[PathBuf]) -> Vec<ChangedFile> {
    files
        .iter()
        .map(|file| {
            let path = util::absolutize(repo, file);
            if path.exists() {
                ChangedFile::modified(path)
            } else {
                ChangedFile::deleted(path)
            }
        })
        .collect()
}

fn main() -> Result<()> {
    init_logging();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Tests {
            module,
            tests_dir,
            repo,
            git_mode,
            base_branch,
            files,
            paths,
            format,
            partial,
            parse_policy,
            parallel,
        } => {
            let repo = util::canonical_or_clean(&repo);
            let namespace = namespace_for(&repo, &module, tests_dir.as_deref())?;

            let changes = if files.is_empty() {
                git::changed_files(&repo, git_mode, base_branch.as_deref())?
            } else {
                explicit_changes(&repo, &files)
            };

            let mut config = EngineConfig::get().clone();
            if let Some(policy) = parse_policy {
                config.parse_policy = policy;
            }
            config.parallel |= parallel;
            let mut analyzer = ImpactAnalyzer::with_config(namespace, &config).relative_to(&repo);
            if partial {
                analyzer = analyzer.failure_mode(FailureMode::Partial);
            }

            let report = analyzer.analyze(&changes)?;
            if report.degraded {
                eprintln!("Warning: some strategies failed; impacted tests may be missing");
            }

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text if paths => {
                    for path in &report.paths {
                        let shown = path.strip_prefix(&repo).unwrap_or(path);
                        println!("{}", util::normalize_path(shown));
                    }
                }
                OutputFormat::Text => {
                    for module in &report.impacted {
                        println!("{module}");
                    }
                }
            }
            Ok(())
        }
        cli::Command::Graph {
            module,
            tests_dir,
            repo,
            format,
            parse_policy,
        } => {
            let repo = util::canonical_or_clean(&repo);
            let namespace = namespace_for(&repo, &module, tests_dir.as_deref())?;
            let mut analyzer = ImpactAnalyzer::new(namespace);
            if let Some(policy) = parse_policy {
                analyzer = analyzer.parse_policy(policy);
            }
            let graph = analyzer.graph()?;

            match format {
                OutputFormat::Text => print!("{graph}"),
                OutputFormat::Json => {
                    let edges: Vec<_> = graph
                        .edges()
                        .map(|(from, to)| json!({ "from": from, "to": to }))
                        .collect();
                    let value = json!({
                        "modules": graph.modules().iter().collect::<Vec<_>>(),
                        "edges": edges,
                        "unanalyzed": graph.unanalyzed(),
                        "fingerprint": graph.fingerprint(),
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
            Ok(())
        }
    }
}
