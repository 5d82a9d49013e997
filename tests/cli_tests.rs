//! CLI integration tests
//!
//! These tests verify the CLI commands work correctly by running the binary.

#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::Command;

const ROOT: &str = "{http://avro.apache.org/AvroTest}root";

fn docpath_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_xmlschema-docpath"))
}

fn fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Inspect Command Tests
// ============================================================================

#[test]
fn test_cli_inspect() {
    let output = Command::new(docpath_bin())
        .args(["inspect", "--model", fixture("avro.json").as_str(), "--root", ROOT])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect should succeed");
    assert!(stdout.contains("xmlschema-docpath"), "should show version");
    assert!(stdout.contains("substitutionGroup"), "should list the record group");
    assert!(stdout.contains("*#0 element"), "should mark the start node");
}

#[test]
fn test_cli_inspect_unknown_root() {
    let output = Command::new(docpath_bin())
        .args(["inspect", "--model", fixture("avro.json").as_str(), "--root", "{urn:none}root"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "inspect should fail");
    assert!(stderr.contains("not declared globally"));
}

// ============================================================================
// Walk Command Tests
// ============================================================================

#[test]
fn test_cli_walk_valid() {
    for dom in [false, true] {
        let model = fixture("avro.json");
        let file = fixture("avro_grandchildren.xml");
        let mut args = vec!["walk", "--model", model.as_str(), "--root", ROOT, file.as_str()];
        if dom {
            args.push("--dom");
        }
        let output = Command::new(docpath_bin())
            .args(&args)
            .output()
            .expect("Failed to execute command");

        let stdout = String::from_utf8_lossy(&output.stdout);

        assert!(output.status.success(), "walk should succeed");
        assert!(stdout.contains("Document matches"));
        assert!(stdout.contains("Backtracks: 0"));
    }
}

#[test]
fn test_cli_walk_steps() {
    let output = Command::new(docpath_bin())
        .args([
            "walk",
            "--model",
            fixture("avro.json").as_str(),
            "--root",
            ROOT,
            "--steps",
            fixture("avro_grandchildren.xml").as_str(),
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Steps:"));
    assert!(stdout.contains("content"));
}

#[test]
fn test_cli_walk_invalid() {
    let output = Command::new(docpath_bin())
        .args([
            "walk",
            "--model",
            fixture("avro.json").as_str(),
            "--root",
            ROOT,
            fixture("avro_invalid.xml").as_str(),
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success(), "walk should fail");
    assert!(stdout.contains("Document does not match"));
    assert!(stdout.contains("nonNullPrimitive"));
}
