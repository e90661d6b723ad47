//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code
//! - The core library never writes to stdout or stderr
//! - The core library stays free of binary-only dependencies
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|entry| entry.into_path())
        .collect()
}

/// Lines of `path` that belong to production code
///
/// Everything from the first `#[cfg(test)]` onward is treated as test code.
/// Line comments are dropped.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(source) = fs::read_to_string(path) else {
        return Vec::new();
    };

    source
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(index, line)| (index + 1, line.to_string()))
        .collect()
}

/// `file:line: text` for every production line containing one of `patterns`
#[must_use]
pub fn find_violations(dir: &Path, patterns: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for path in rust_sources(dir) {
        for (number, line) in production_lines(&path) {
            if patterns.iter().any(|pattern| line.contains(pattern)) {
                violations.push(format!("{}:{number}: {}", path.display(), line.trim()));
            }
        }
    }
    violations
}
