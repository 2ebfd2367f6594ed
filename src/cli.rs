use crate::git::GitMode;
use crate::graph::ParsePolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "impacted",
    version,
    about = "Select the python tests impacted by a change set",
    after_help = r#"Examples:
  impacted tests --module my_pkg --tests-dir tests
  impacted tests --module my_pkg --tests-dir tests --git-mode branch --base-branch main
  impacted tests --module my_pkg --file my_pkg/core.py --paths
  impacted tests --module company.pkg --format json
  impacted graph --module my_pkg --tests-dir tests

Logging goes to stderr; set IMPACTED_LOG=debug for details.
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the test modules impacted by the current changes, one per line.
    Tests {
        /// Package to analyze, as a dotted module name relative to --repo.
        #[arg(long)]
        module: String,
        /// Tests directory outside the package, relative to --repo.
        #[arg(long)]
        tests_dir: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Which git changes to consider: unstaged|branch.
        #[arg(long, default_value = "unstaged")]
        git_mode: GitMode,
        /// Base ref for --git-mode branch.
        #[arg(long)]
        base_branch: Option<String>,
        /// Use these files as the change set instead of asking git.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Print file paths instead of module names.
        #[arg(long)]
        paths: bool,
        /// Output format: text|json.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
        /// Continue when a strategy fails; the result may miss tests.
        #[arg(long)]
        partial: bool,
        /// Handling of unparsable files: skip|fail|best-effort.
        #[arg(long)]
        parse_policy: Option<ParsePolicy>,
        /// Parse files in parallel.
        #[arg(long)]
        parallel: bool,
    },
    /// Print the module dependency graph (module -> [importers]).
    Graph {
        #[arg(long)]
        module: String,
        #[arg(long)]
        tests_dir: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Output format: text|json.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
        /// Handling of unparsable files: skip|fail|best-effort.
        #[arg(long)]
        parse_policy: Option<ParsePolicy>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tests_command() {
        let args = Args::try_parse_from([
            "impacted",
            "tests",
            "--module",
            "pkg",
            "--tests-dir",
            "tests",
            "--git-mode",
            "branch",
            "--base-branch",
            "main",
            "--parse-policy",
            "best-effort",
            "--format",
            "json",
        ])
        .unwrap();
        match args.command {
            Command::Tests {
                module,
                git_mode,
                base_branch,
                parse_policy,
                format,
                files,
                ..
            } => {
                assert_eq!(module, "pkg");
                assert_eq!(git_mode, GitMode::Branch);
                assert_eq!(base_branch.as_deref(), Some("main"));
                assert_eq!(parse_policy, Some(ParsePolicy::BestEffort));
                assert_eq!(format, OutputFormat::Json);
                assert!(files.is_empty());
            }
            Command::Graph { .. } => panic!("expected tests command"),
        }
    }

    #[test]
    fn repeated_file_flags_collect() {
        let args = Args::try_parse_from([
            "impacted", "tests", "--module", "pkg", "--file", "pkg/a.py", "--file", "pkg/b.py",
        ])
        .unwrap();
        let Command::Tests { files, .. } = args.command else {
            panic!("expected tests command");
        };
        assert_eq!(files, vec![PathBuf::from("pkg/a.py"), PathBuf::from("pkg/b.py")]);
    }
}
