//! Test and fixture file detection
//!
//! Roles are decided from the path alone. Nothing here opens a file, so a
//! deleted path classifies exactly like it did before it was removed.
//!
//! # Detection Rules
//!
//! Rules are checked in order and the first match wins:
//!
//! 1. **Fixture**: the file stem equals the reserved fixture name
//!    (`conftest`). The host test runner loads these implicitly for every
//!    test in the same directory subtree.
//! 2. **Regular**: package markers (`__init__.py`) are never tests, even
//!    inside a tests directory.
//! 3. **Test**: the stem starts with a test prefix (`test_`), ends with a
//!    test suffix (`_test`), or is exactly `test`.
//! 4. **Test**: any directory between the namespace base and the file is a
//!    test directory (`tests`, `test`). Helper modules inside a tests tree
//!    are treated as tests; running them costs little and they may define
//!    collectable items.
//! 5. **Regular** otherwise.

use serde::Serialize;
use std::path::{Component, Path};

/// Role of a discovered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleRole {
    Regular,
    Test,
    Fixture,
}

impl ModuleRole {
    pub fn is_test(self) -> bool {
        self == ModuleRole::Test
    }

    pub fn is_fixture(self) -> bool {
        self == ModuleRole::Fixture
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleRole::Regular => "regular_module",
            ModuleRole::Test => "test_module",
            ModuleRole::Fixture => "fixture_module",
        }
    }
}

/// Naming convention used to classify modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestNaming {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    pub directories: Vec<String>,
    pub fixture_stem: String,
}

impl Default for TestNaming {
    fn default() -> Self {
        Self {
            prefixes: vec!["test_".to_string()],
            suffixes: vec!["_test".to_string()],
            directories: vec!["tests".to_string(), "test".to_string()],
            fixture_stem: "conftest".to_string(),
        }
    }
}

impl TestNaming {
    /// Classify a path relative to its namespace base (`tests/unit/test_a.py`).
    pub fn classify(&self, rel_path: &Path) -> ModuleRole {
        let Some(stem) = rel_path.file_stem().and_then(|s| s.to_str()) else {
            return ModuleRole::Regular;
        };

        if stem == self.fixture_stem {
            return ModuleRole::Fixture;
        }

        if stem == "__init__" {
            return ModuleRole::Regular;
        }

        if self.is_test_stem(stem) {
            return ModuleRole::Test;
        }

        let in_test_dir = rel_path
            .parent()
            .map(|dir| {
                dir.components().any(|comp| match comp {
                    Component::Normal(name) => name
                        .to_str()
                        .is_some_and(|name| self.directories.iter().any(|d| d == name)),
                    _ => false,
                })
            })
            .unwrap_or(false);

        if in_test_dir {
            ModuleRole::Test
        } else {
            ModuleRole::Regular
        }
    }

    /// True when a bare file stem follows the test naming convention.
    pub fn is_test_stem(&self, stem: &str) -> bool {
        stem == "test"
            || self.prefixes.iter().any(|p| stem.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| stem.ends_with(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(path: &str) -> ModuleRole {
        TestNaming::default().classify(Path::new(path))
    }

    #[test]
    fn test_fixture_detection() {
        assert_eq!(classify("tests/conftest.py"), ModuleRole::Fixture);
        assert_eq!(classify("pkg/sub/conftest.py"), ModuleRole::Fixture);
        assert_eq!(classify("conftest.py"), ModuleRole::Fixture);
    }

    #[test]
    fn test_file_naming() {
        assert_eq!(classify("pkg/test_utils.py"), ModuleRole::Test);
        assert_eq!(classify("pkg/utils_test.py"), ModuleRole::Test);
        assert_eq!(classify("pkg/test.py"), ModuleRole::Test);
        assert_eq!(classify("pkg/testing.py"), ModuleRole::Regular);
        assert_eq!(classify("pkg/contest.py"), ModuleRole::Regular);
        assert_eq!(classify("pkg/latest.py"), ModuleRole::Regular);
    }

    #[test]
    fn test_directory_membership() {
        assert_eq!(classify("tests/helpers.py"), ModuleRole::Test);
        assert_eq!(classify("pkg/tests/unit/factories.py"), ModuleRole::Test);
        assert_eq!(classify("tests/__init__.py"), ModuleRole::Regular);
        assert_eq!(classify("pkg/testsuite/helpers.py"), ModuleRole::Regular);
    }

    #[test]
    fn custom_naming_convention() {
        let naming = TestNaming {
            prefixes: vec!["check_".to_string()],
            suffixes: Vec::new(),
            directories: vec!["checks".to_string()],
            fixture_stem: "fixtures".to_string(),
        };
        assert_eq!(naming.classify(Path::new("pkg/check_a.py")), ModuleRole::Test);
        assert_eq!(naming.classify(Path::new("pkg/test_a.py")), ModuleRole::Regular);
        assert_eq!(naming.classify(Path::new("checks/util.py")), ModuleRole::Test);
        assert_eq!(naming.classify(Path::new("checks/fixtures.py")), ModuleRole::Fixture);
        assert_eq!(naming.classify(Path::new("pkg/conftest.py")), ModuleRole::Regular);
    }

    #[test]
    fn role_names() {
        assert_eq!(ModuleRole::Fixture.as_str(), "fixture_module");
        assert!(ModuleRole::Test.is_test());
        assert!(!ModuleRole::Fixture.is_test());
    }
}
