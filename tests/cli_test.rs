// SPDX-License-Identifier: MIT
//! Tests for the `lbf` command line tool

use std::process::Command;

use linked_binary_file::FileBuilder;
use tempfile::NamedTempFile;

fn write_sample() -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let mut builder = FileBuilder::new();
    let a = builder.create_block(&[0; 16]).unwrap();
    let b = builder.create_block(b"target").unwrap();
    builder.create_link(a, 0, b, 0).unwrap();
    builder.write_to_file(file.path()).unwrap();
    file
}

fn lbf() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lbf"))
}

#[test]
fn test_verify_valid_file() {
    let file = write_sample();
    let output = lbf().arg("verify").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok"));
}

#[test]
fn test_verify_rejects_garbage() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), vec![0xEE; 64]).unwrap();

    let output = lbf().arg("verify").arg(file.path()).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad magic"));
}

#[test]
fn test_inspect_json() {
    let file = write_sample();
    let output = lbf()
        .args(["inspect", "--json"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["header"]["links_count"], 1);
    assert_eq!(report["header"]["version"], 0x10);
    assert_eq!(report["links"][0]["origin"], 28);
    assert_eq!(report["links"][0]["destination"], 44);
    assert_eq!(report["sha256"].as_str().unwrap().len(), 64);
}
