//! End-to-end scans against a mocked ledger

use pretty_assertions::assert_eq;
use sieve_engine::{
    CHECKPOINT_FILE, MANIFEST_FILE, OutputLayout, RESULTS_FILE, RunOutcome, read_results, scan,
};
use sieve_stats::LabeledSet;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    body, fast_config, identity_of, mount_absent_fallback, mount_present, start_ledger_mock,
    write_candidates,
};

#[tokio::test]
async fn scan_reports_found_identities_and_invalid_lines() {
    let server = start_ledger_mock().await;
    let (a, b) = (body(1), body(2));
    mount_present(&server, &identity_of(&a)).await;
    mount_absent_fallback(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_candidates(dir.path(), &[a.clone(), "NOT-A-BODY".to_string(), b]);
    let out = dir.path().join("run");

    let outcome = scan(&fast_config(&server), &input, &out, CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed { summary, output } = outcome else {
        panic!("scan should complete");
    };

    assert_eq!(summary.total, 3);
    assert_eq!(summary.valid, 2);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.onchain_found, 1);
    assert_eq!(summary.indeterminate, 0);
    assert!((summary.success_rate - 50.0).abs() < 1e-9);

    assert!(matches!(output, OutputLayout::Single { .. }));
    assert!(out.join(RESULTS_FILE).exists());
    assert!(!out.join(CHECKPOINT_FILE).exists());

    let results = read_results(&out).unwrap();
    assert_eq!(results.invalid_candidates.len(), 1);
    let found = results
        .records
        .iter()
        .find(|r| r.validation.exists)
        .expect("one identity exists");
    assert_eq!(found.identity, identity_of(&a));
    assert_eq!(found.validation.balance, Some(1500));
}

#[tokio::test]
async fn server_errors_become_indeterminate_and_are_excluded_from_analysis() {
    let server = start_ledger_mock().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_candidates(dir.path(), &[body(3), body(4)]);
    let out = dir.path().join("run");

    let mut config = fast_config(&server);
    config.ledger.max_retries = 1;
    let outcome = scan(&config, &input, &out, CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed { summary, .. } = outcome else {
        panic!("scan should complete");
    };
    assert_eq!(summary.indeterminate, 2);
    assert_eq!(summary.onchain_found, 0);

    let labeled = LabeledSet::from_records(&read_results(&out).unwrap().records);
    assert!(labeled.samples.is_empty());
    assert_eq!(labeled.excluded_indeterminate, 2);
}

#[tokio::test]
async fn cancelled_scan_resumes_to_the_same_result() {
    let server = start_ledger_mock().await;
    let bodies: Vec<String> = (10..16).map(body).collect();
    mount_present(&server, &identity_of(&bodies[0])).await;
    mount_absent_fallback(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_candidates(dir.path(), &bodies);
    let out = dir.path().join("run");
    let config = fast_config(&server);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let first = scan(&config, &input, &out, cancel).await.unwrap();
    assert!(matches!(
        first,
        RunOutcome::Interrupted {
            processed: 0,
            total: 6
        }
    ));
    assert!(!out.join(RESULTS_FILE).exists());

    let second = scan(&config, &input, &out, CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed { summary, .. } = second else {
        panic!("resumed scan should complete");
    };
    assert_eq!(summary.processed, 6);
    assert_eq!(summary.onchain_found, 1);
    assert!(!out.join(CHECKPOINT_FILE).exists());
}

#[tokio::test]
async fn large_runs_are_sharded_behind_a_manifest() {
    let server = start_ledger_mock().await;
    mount_absent_fallback(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let bodies: Vec<String> = (20..25).map(body).collect();
    let input = write_candidates(dir.path(), &bodies);
    let out = dir.path().join("run");

    let mut config = fast_config(&server);
    config.scan.shard_threshold = 2;
    config.scan.shard_size = 2;
    let outcome = scan(&config, &input, &out, CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed { output, .. } = outcome else {
        panic!("scan should complete");
    };
    let OutputLayout::Sharded { shards, manifest } = output else {
        panic!("expected shards");
    };
    assert_eq!(shards.len(), 3);
    assert_eq!(manifest, out.join(MANIFEST_FILE));

    let results = read_results(&out).unwrap();
    assert_eq!(results.records.len(), 5);
    assert_eq!(results.summary.valid, 5);
}
