//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use sieve_codec::{derive_identity, encode_body};
use sieve_engine::SieveConfig;
use sieve_types::{Identity, PublicKey};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A valid 56-character body whose key bytes are all `seed`.
pub fn body(seed: u8) -> String {
    encode_body(&PublicKey::from_bytes([seed; 32]))
}

pub fn identity_of(body: &str) -> Identity {
    derive_identity(body)
        .expect("fixture body decodes")
        .identity
}

/// Write `lines` as a `.txt` candidate file in `dir`.
pub fn write_candidates(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("candidates.txt");
    std::fs::write(&path, lines.join("\n")).expect("write candidates");
    path
}

/// Config pointed at `server`, with no pacing or backoff worth waiting for.
pub fn fast_config(server: &MockServer) -> SieveConfig {
    let mut config = SieveConfig::default();
    config.ledger.rpc_url = server.uri();
    config.ledger.rate_limit_ms = 1;
    config.ledger.timeout_secs = 5;
    config.ledger.initial_backoff_ms = 1;
    config.ledger.max_backoff_ms = 2;
    config.scan.checkpoint_interval = 1;
    config
}

pub async fn start_ledger_mock() -> MockServer {
    MockServer::start().await
}

/// Answer `identity` as a funded, active entry.
pub async fn mount_present(server: &MockServer, identity: &Identity) {
    let body = serde_json::json!({
        "balance": {
            "id": identity.as_str(),
            "balance": "1500",
            "validForTick": 21_000_000,
            "latestIncomingTransferTick": 20_999_000,
            "incomingAmount": "2000",
            "outgoingAmount": 500,
            "numberOfIncomingTransfers": 3,
            "numberOfOutgoingTransfers": 1
        }
    });
    Mock::given(method("GET"))
        .and(path(format!("/v1/balances/{identity}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Every other balance lookup answers 404.
pub async fn mount_absent_fallback(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/balances/[A-Z]{60}$"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(10)
        .mount(server)
        .await;
}
