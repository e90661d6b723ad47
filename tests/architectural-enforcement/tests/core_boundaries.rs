//! Core Library Boundaries
//!
//! The composer core is a library driven by async streams. It must not block
//! the runtime, print, or pull in dependencies that belong to the binary.

use std::fs;

use architectural_enforcement::{find_violations, rust_sources, workspace_root};

fn core_src() -> std::path::PathBuf {
    workspace_root().join("composer").join("core").join("src")
}

#[test]
fn test_core_sources_found() {
    let sources = rust_sources(&core_src());
    assert!(
        sources.iter().any(|p| p.ends_with("lib.rs")),
        "core sources not found under {}",
        core_src().display()
    );
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(
        &workspace_root().join("composer"),
        &["thread::sleep(", "time::sleep("],
    );
    assert!(
        violations.is_empty(),
        "sleep() found in production code:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_never_prints() {
    let violations = find_violations(
        &core_src(),
        &["println!(", "eprintln!(", "print!(", "dbg!("],
    );
    assert!(
        violations.is_empty(),
        "core writes to the terminal; use tracing instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_has_no_binary_dependencies() {
    let manifest = workspace_root()
        .join("composer")
        .join("core")
        .join("Cargo.toml");
    let manifest = fs::read_to_string(&manifest).expect("core manifest readable");

    for forbidden in ["clap", "anyhow", "tracing-subscriber"] {
        assert!(
            !manifest
                .lines()
                .any(|line| line.trim_start().starts_with(&format!("{forbidden} "))),
            "composer-core must not depend on {forbidden}"
        );
    }
}
