use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use sieve_ledger::{IdentityValidator, LedgerClient, LedgerConfig, RateLimiter, RetryConfig};
use sieve_types::{Identity, RemoteErrorKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRESENT: &str = "BLHDHZCECZJITFHDWNIVWPRHVQNCWOFUEUXHNFRTKELDDQGPKKWAMMGDARKA";
const ABSENT: &str = "BUICAHKIBLQWQAIONARLYROQGMRAYEAOECSZCPMTEHUIFXLKGTMAPJFDCHQI";

fn test_config(server: &MockServer) -> LedgerConfig {
    LedgerConfig {
        rpc_url: server.uri(),
        request_timeout: Duration::from_millis(500),
        rate_limit: Duration::ZERO,
        retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        },
    }
}

fn balances_path(identity: &str) -> String {
    format!("/v1/balances/{identity}")
}

fn identity(raw: &str) -> Identity {
    Identity::parse(raw).unwrap()
}

#[tokio::test]
async fn valid_for_tick_marks_identity_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(balances_path(PRESENT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance": {
                "id": PRESENT,
                "balance": "42",
                "validForTick": 17_000_123,
                "incomingAmount": "42",
                "outgoingAmount": "0",
                "numberOfIncomingTransfers": 1,
                "numberOfOutgoingTransfers": 0
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = LedgerClient::new(&test_config(&server)).unwrap();
    let result = client.check(&identity(PRESENT)).await;

    assert!(result.exists);
    assert_eq!(result.error, None);
    assert_eq!(result.balance, Some(42));
    assert_eq!(result.valid_for_tick, Some(17_000_123));
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn not_found_is_confirmed_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(balances_path(ABSENT)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = LedgerClient::new(&test_config(&server)).unwrap();
    let result = client.check(&identity(ABSENT)).await;

    assert_eq!(result.label(), Some(false));
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn server_errors_become_indeterminate_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(balances_path(ABSENT)))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = LedgerClient::new(&test_config(&server)).unwrap();
    let result = client.check(&identity(ABSENT)).await;

    assert_eq!(result.label(), None);
    assert_eq!(result.error.as_ref().map(|e| e.kind), Some(RemoteErrorKind::HttpStatus));
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn unauthorized_is_indeterminate_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = LedgerClient::new(&test_config(&server)).unwrap();
    let result = client.check(&identity(ABSENT)).await;

    assert!(result.is_indeterminate());
    assert!(!result.exists);
}

#[tokio::test]
async fn slow_responses_time_out_as_indeterminate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "balance": { "validForTick": 1 } }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.request_timeout = Duration::from_millis(100);
    config.retry.max_retries = 1;
    let client = LedgerClient::new(&config).unwrap();
    let result = client.check(&identity(PRESENT)).await;

    assert_eq!(result.error.as_ref().map(|e| e.kind), Some(RemoteErrorKind::Timeout));
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn malformed_body_is_indeterminate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = LedgerClient::new(&test_config(&server)).unwrap();
    let result = client.check(&identity(PRESENT)).await;

    assert_eq!(
        result.error.as_ref().map(|e| e.kind),
        Some(RemoteErrorKind::MalformedResponse)
    );
}

#[tokio::test]
async fn retries_pass_through_the_shared_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(60)));
    let client = LedgerClient::with_limiter(&config, Arc::clone(&limiter)).unwrap();

    let start = Instant::now();
    let result = client.check(&identity(ABSENT)).await;

    assert_eq!(result.attempts, 3);
    // Three calls, two limiter gaps.
    assert!(start.elapsed() >= Duration::from_millis(120));
}
