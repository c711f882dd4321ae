//! Tests that drive the `sieve` binary

use std::process::Command;

use pretty_assertions::assert_eq;

use crate::common::{
    body, identity_of, mount_absent_fallback, mount_present, start_ledger_mock, write_candidates,
};

fn sieve() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sieve"));
    cmd.env("RUST_LOG", "warn").env_remove("SIEVE_RPC_URL");
    cmd
}

#[test]
fn derive_prints_identity_and_key() {
    let b = body(7);
    let output = sieve().args(["derive", &b]).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = stdout.lines().next().unwrap();
    let mut parts = line.split_whitespace();
    assert_eq!(parts.next().unwrap(), identity_of(&b).as_str());
    assert_eq!(parts.next().unwrap(), "07".repeat(32));
}

#[test]
fn derive_fails_on_an_invalid_body() {
    let output = sieve()
        .args(["derive", &body(1), "TOO-SHORT"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("TOO-SHORT"));
}

#[test]
fn analyze_writes_both_report_files() {
    let dir = tempfile::tempdir().unwrap();
    let labels: Vec<serde_json::Value> = (0..40u8)
        .map(|i| {
            let identity = identity_of(&body(i));
            serde_json::json!({ "identity": identity.as_str(), "label": i % 2 == 0 })
        })
        .collect();
    let input = dir.path().join("labels.json");
    std::fs::write(&input, serde_json::to_string(&labels).unwrap()).unwrap();
    let out = dir.path().join("report");

    let output = sieve()
        .args(["analyze", "--input"])
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .args(["--positions", "0-59", "--pre-specified", "4,27,30"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out.join("statistical_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["sample_size"], 40);
    assert!(out.join("statistical_report.md").exists());
}

#[test]
fn analyze_rejects_out_of_range_positions() {
    let dir = tempfile::tempdir().unwrap();
    let output = sieve()
        .args(["analyze", "--input"])
        .arg(dir.path())
        .arg("--out")
        .arg(dir.path())
        .args(["--positions", "61"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn scan_binary_completes_against_a_mock_ledger() {
    let server = start_ledger_mock().await;
    let a = body(30);
    mount_present(&server, &identity_of(&a)).await;
    mount_absent_fallback(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_candidates(dir.path(), &[a, body(31)]);
    let out = dir.path().join("run");

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_sieve"))
        .env("RUST_LOG", "warn")
        .args(["scan", "--candidates"])
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .args(["--rpc-url", &server.uri(), "--rate-limit-ms", "1"])
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(out.join("results.json").exists());
    assert!(out.join("sieve.log").exists());

    let results = sieve_engine::read_results(&out).unwrap();
    assert_eq!(results.summary.onchain_found, 1);
}
