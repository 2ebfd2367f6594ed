use impacted::cache::ResultCache;
use impacted::config::{EngineConfig, NamespaceConfig};
use impacted::graph::{BuildOptions, DependencyGraph, ParsePolicy};
use impacted::impact::{
    ChangeStatus, ChangedFile, FailureMode, FixtureVisibilityStrategy, ImpactAnalyzer,
    ImpactStrategy, ImportReachabilityStrategy, get_impacted_tests, matches_impacted_tests,
};
use impacted::indexer::{DiscoveryOptions, discover_modules};
use impacted::{ImpactError, ModuleId};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&path, &target);
        } else {
            fs::copy(&path, &target).unwrap();
        }
    }
}

struct TempRepo {
    dir: TempDir,
}

impl TempRepo {
    fn from_fixture(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        copy_dir(&fixture_path(name), dir.path());
        Self { dir }
    }

    fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    fn write(&self, rel: &str, body: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn namespace(&self) -> NamespaceConfig {
        NamespaceConfig::new(self.root().join("pkg"), Some(&self.root().join("tests"))).unwrap()
    }

    fn analyzer(&self) -> ImpactAnalyzer {
        ImpactAnalyzer::with_config(self.namespace(), &EngineConfig::default()).relative_to(self.root())
    }

    fn changed(&self, rel: &str) -> ChangedFile {
        ChangedFile::modified(self.root().join(rel))
    }
}

fn ids(report: &[ModuleId]) -> Vec<&str> {
    report.iter().map(ModuleId::as_str).collect()
}

/// The minimal scenario: `b` imports `a`, `test_b` imports `b`, and an
/// empty fixture file sits next to the test.
fn minimal_repo() -> TempRepo {
    let repo = TempRepo::empty();
    repo.write("pkg/a.py", "");
    repo.write("pkg/b.py", "import pkg.a\n");
    repo.write("pkg/c.py", "");
    repo.write("tests/test_b.py", "import pkg.b\n");
    repo.write("tests/conftest.py", "");
    repo
}

#[test]
fn minimal_scenario_transitive_change() {
    let repo = minimal_repo();
    let report = repo.analyzer().analyze(&[repo.changed("pkg/a.py")]).unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b"]);
    assert_eq!(report.paths, vec![repo.root().join("tests/test_b.py")]);
    assert_eq!(ids(&report.changed_modules), vec!["pkg.a"]);
    assert!(!report.degraded);
}

#[test]
fn minimal_scenario_fixture_change() {
    let repo = minimal_repo();
    let report = repo
        .analyzer()
        .analyze(&[repo.changed("tests/conftest.py")])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b"]);
}

#[test]
fn minimal_scenario_unrelated_change() {
    let repo = minimal_repo();
    let report = repo.analyzer().analyze(&[repo.changed("pkg/c.py")]).unwrap();
    assert!(report.impacted.is_empty());
    assert!(report.paths.is_empty());
}

#[test]
fn fixture_above_the_test_root_impacts_every_test() {
    let repo = minimal_repo();
    repo.write("conftest.py", "import pytest\n");
    repo.write("tests/unit/test_u.py", "");
    repo.write("docs/conftest.py", "");

    let report = repo.analyzer().analyze(&[repo.changed("conftest.py")]).unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b", "tests.unit.test_u"]);
    // still outside the namespace as far as module resolution goes
    assert_eq!(report.unresolved.len(), 1);

    let report = repo
        .analyzer()
        .analyze(&[ChangedFile::new("conftest.py", ChangeStatus::Deleted)])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b", "tests.unit.test_u"]);

    let report = repo.analyzer().analyze(&[repo.changed("docs/conftest.py")]).unwrap();
    assert!(report.impacted.is_empty());
}

#[test]
fn one_shot_entry_point() {
    let repo = minimal_repo();
    let root = repo.root();
    let impacted = get_impacted_tests(
        &[ChangedFile::modified(root.join("pkg/a.py"))],
        &root.join("pkg"),
        Some(&root.join("tests")),
        None,
    )
    .unwrap();
    assert_eq!(ids(&impacted), vec!["tests.test_b"]);

    let only_imports: Vec<Box<dyn ImpactStrategy>> = vec![Box::new(ImportReachabilityStrategy)];
    let impacted = get_impacted_tests(
        &[ChangedFile::modified(root.join("tests/conftest.py"))],
        &root.join("pkg"),
        Some(&root.join("tests")),
        Some(only_imports),
    )
    .unwrap();
    assert!(impacted.is_empty());
}

#[test]
fn missing_namespace_root_is_configuration_error() {
    let repo = minimal_repo();
    let err = get_impacted_tests(&[], &repo.root().join("nope"), None, None).unwrap_err();
    match err {
        ImpactError::Configuration(inner) => assert!(inner.path.ends_with("nope")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn transitive_change_reaches_fixture_subtree() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo.analyzer().analyze(&[repo.changed("pkg/a.py")]).unwrap();
    // pkg.a <- pkg.b <- pkg.sub.helpers <- pkg.sub <- tests.unit.conftest
    assert_eq!(ids(&report.impacted), vec!["tests.test_b", "tests.unit.test_sub"]);
    assert_eq!(ids(&report.unanalyzed), vec!["pkg.broken"]);
}

#[test]
fn cycles_terminate_with_finite_result() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo
        .analyzer()
        .analyze(&[repo.changed("pkg/cycle_y.py")])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_cycle"]);

    let graph = repo.analyzer().graph().unwrap();
    let ancestors = graph.ancestors(&ModuleId::new("pkg.cycle_x"));
    assert!(ancestors.contains(&ModuleId::new("pkg.cycle_y")));
    assert!(!ancestors.contains(&ModuleId::new("pkg.cycle_x")));
}

#[test]
fn root_fixture_impacts_all_tests() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo
        .analyzer()
        .analyze(&[repo.changed("tests/conftest.py")])
        .unwrap();
    assert_eq!(
        ids(&report.impacted),
        vec![
            "tests.test_b",
            "tests.test_cycle",
            "tests.test_typing",
            "tests.unit.test_sub",
        ]
    );
}

#[test]
fn guarded_imports_are_captured() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo.analyzer().analyze(&[repo.changed("pkg/c.py")]).unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_typing"]);
}

#[test]
fn changed_test_always_runs() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo
        .analyzer()
        .analyze(&[repo.changed("tests/unit/test_sub.py")])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.unit.test_sub"]);
}

#[test]
fn package_init_change_impacts_every_importer() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo
        .analyzer()
        .analyze(&[repo.changed("pkg/__init__.py")])
        .unwrap();
    assert_eq!(
        ids(&report.impacted),
        vec![
            "tests.test_b",
            "tests.test_cycle",
            "tests.test_typing",
            "tests.unit.test_sub",
        ]
    );
}

#[test]
fn deleted_module_impacts_former_importers_only() {
    let repo = TempRepo::from_fixture("py_impact");
    fs::remove_file(repo.root().join("pkg/a.py")).unwrap();
    let report = repo
        .analyzer()
        .analyze(&[ChangedFile::deleted(repo.root().join("pkg/a.py"))])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b", "tests.unit.test_sub"]);
}

#[test]
fn deletion_never_explodes() {
    let repo = TempRepo::from_fixture("py_impact");
    let report = repo
        .analyzer()
        .analyze(&[ChangedFile::deleted(repo.root().join("pkg/never_existed.py"))])
        .unwrap();
    assert!(report.impacted.is_empty(), "{:?}", report.impacted);

    fs::remove_file(repo.root().join("tests/test_cycle.py")).unwrap();
    let report = repo
        .analyzer()
        .analyze(&[ChangedFile::deleted(repo.root().join("tests/test_cycle.py"))])
        .unwrap();
    assert!(report.impacted.is_empty(), "{:?}", report.impacted);
}

#[test]
fn files_outside_namespace_are_reported_unresolved() {
    let repo = TempRepo::from_fixture("py_impact");
    repo.write("README.md", "docs\n");
    repo.write("pkg/data.json", "{}\n");
    let report = repo
        .analyzer()
        .analyze(&[
            repo.changed("README.md"),
            repo.changed("pkg/data.json"),
            ChangedFile::new("tests/test_b.py", ChangeStatus::Untracked),
        ])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_b"]);
    assert_eq!(report.unresolved.len(), 2);
    assert!(report.unresolved[1].reason.contains("not an importable python module"));
}

#[test]
fn parse_policy_fail_aborts() {
    let repo = TempRepo::from_fixture("py_impact");
    let err = repo
        .analyzer()
        .parse_policy(ParsePolicy::Fail)
        .analyze(&[repo.changed("pkg/a.py")])
        .unwrap_err();
    match err {
        ImpactError::Parse(inner) => assert!(inner.path.ends_with("pkg/broken.py")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unparsable_test_runs_on_any_change() {
    let repo = TempRepo::from_fixture("py_impact");
    repo.write("tests/test_broken.py", "import pkg.a\ndef test(:\n");
    let report = repo.analyzer().analyze(&[repo.changed("pkg/c.py")]).unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_broken", "tests.test_typing"]);

    let report = repo
        .analyzer()
        .parse_policy(ParsePolicy::BestEffort)
        .analyze(&[repo.changed("pkg/c.py")])
        .unwrap();
    assert_eq!(ids(&report.impacted), vec!["tests.test_typing"]);
    assert!(report.unanalyzed.is_empty());
}

#[test]
fn graph_construction_is_idempotent_and_parallel_safe() {
    let repo = TempRepo::from_fixture("py_impact");
    let namespace = repo.namespace();
    let discovery = DiscoveryOptions::default();
    let build = |parallel: bool| {
        let modules = discover_modules(&namespace, &discovery).unwrap();
        let options = BuildOptions {
            parallel,
            ..BuildOptions::default()
        };
        DependencyGraph::build(&namespace, modules, &options).unwrap()
    };
    let edges = |graph: &DependencyGraph| -> BTreeSet<(ModuleId, ModuleId)> {
        graph
            .edges()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect()
    };

    let first = build(false);
    let second = build(false);
    let parallel = build(true);
    assert_eq!(edges(&first), edges(&second));
    assert_eq!(edges(&first), edges(&parallel));
    assert_eq!(first.unanalyzed(), parallel.unanalyzed());
    assert!(first.edge_count() > 0);
}

#[test]
fn cached_graph_gives_identical_results() {
    let repo = TempRepo::from_fixture("py_impact");
    let cache = Arc::new(ResultCache::new(4));
    let cached = repo.analyzer().cache(Arc::clone(&cache));
    let uncached = repo.analyzer();
    let changes = [repo.changed("pkg/a.py")];

    let cold = cached.analyze(&changes).unwrap();
    let warm = cached.analyze(&changes).unwrap();
    let fresh = uncached.analyze(&changes).unwrap();
    assert_eq!(cold.impacted, warm.impacted);
    assert_eq!(cold.impacted, fresh.impacted);
    assert_eq!(cache.stats().hits, 1);

    assert!(cache.invalidate(repo.analyzer().namespace()));
    assert!(cache.is_empty());
}

#[test]
fn partial_mode_survives_failing_strategy() {
    struct Unavailable;

    impl ImpactStrategy for Unavailable {
        fn name(&self) -> &str {
            "coverage"
        }

        fn find_impacted(
            &self,
            _: &impacted::impact::ImpactContext<'_>,
        ) -> Result<BTreeSet<ModuleId>, impacted::StrategyError> {
            Err(impacted::StrategyError::new("coverage", "no coverage data"))
        }
    }

    let repo = minimal_repo();
    let strategies = || -> Vec<Box<dyn ImpactStrategy>> {
        vec![
            Box::new(ImportReachabilityStrategy),
            Box::new(FixtureVisibilityStrategy::new()),
            Box::new(Unavailable),
        ]
    };

    let err = repo
        .analyzer()
        .strategies(strategies())
        .analyze(&[repo.changed("pkg/a.py")])
        .unwrap_err();
    assert!(matches!(err, ImpactError::Strategy(_)));

    let report = repo
        .analyzer()
        .strategies(strategies())
        .failure_mode(FailureMode::Partial)
        .analyze(&[repo.changed("pkg/a.py")])
        .unwrap();
    assert!(report.degraded);
    assert_eq!(ids(&report.impacted), vec!["tests.test_b"]);
    assert_eq!(report.strategies.len(), 3);
    assert_eq!(report.strategies[2].error.as_deref(), Some("strategy `coverage` failed: no coverage data"));
}

#[test]
fn report_paths_match_runner_items() {
    let repo = minimal_repo();
    let report = repo.analyzer().analyze(&[repo.changed("pkg/a.py")]).unwrap();
    assert!(matches_impacted_tests("tests/test_b.py::test_one", &report.paths));
    assert!(!matches_impacted_tests("tests/test_other.py::test_one", &report.paths));
}
