//! Batch orchestration for sieve.
//!
//! This crate wires the codec, the ledger validator and the checkpoint store into
//! a resumable run over a candidate file, and reads finished runs back for
//! analysis.

pub mod checkpoint;
mod config;
pub mod orchestrator;
pub mod output;
pub mod source;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use checkpoint::{CHECKPOINT_FILE, CheckpointError, CheckpointStore};
pub use config::{
    ConfigError, LedgerSection, MAX_IN_FLIGHT_LIMIT, RPC_URL_ENV, ScanConfig, SieveConfig,
    expand_env_vars,
};
pub use orchestrator::{Orchestrator, RunError, RunOutcome, RunState, StopSignal};
pub use output::{
    MANIFEST_FILE, OutputError, OutputLayout, RESULTS_FILE, ResultSet, ShardPolicy, read_results,
    write_results,
};
pub use source::{CandidateSet, SourceError, load_candidates};

use sieve_ledger::{LedgerClient, LedgerError};
use tokio_util::sync::CancellationToken;

/// Anything that stops a run before the first candidate is processed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("output directory {} is not usable: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to start decode pool: {0}")]
    DecodePool(String),
}

/// Load `candidates`, build the ledger client from `config` and run to
/// completion or until `cancel` fires.
pub async fn scan(
    config: &SieveConfig,
    candidates: &std::path::Path,
    out_dir: &std::path::Path,
    cancel: CancellationToken,
) -> Result<RunOutcome, RunError> {
    let source = load_candidates(candidates).map_err(SetupError::from)?;
    let ledger_config = config.ledger.to_ledger_config();
    let client = LedgerClient::new(&ledger_config).map_err(SetupError::from)?;
    tracing::info!(
        rpc_url = %ledger_config.rpc_url,
        rate_limit_ms = ledger_config.rate_limit.as_millis(),
        max_in_flight = config.scan.max_in_flight,
        "Ledger client ready"
    );

    let stop = StopSignal::new(config.scan.stop_file.clone()).with_token(cancel);
    let mut orchestrator = Orchestrator::new(out_dir, config.scan.clone(), Arc::new(client))
        .with_stop_signal(stop);
    orchestrator.run(&source).await
}
