//! The checkpointed batch loop.
//!
//! ```text
//! Init -> LoadingCheckpoint -> Processing -+-> Checkpointed            (stop requested)
//!                                          +-> Finalizing -> Done      (all candidates processed)
//! ```
//!
//! Candidates are decoded on a bounded rayon pool, then fed through an ordered
//! buffered stream so at most `max_in_flight` ledger checks are outstanding and
//! results are applied strictly in candidate order. The orchestrator is the only
//! owner of [`CheckpointState`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::{StreamExt, future, stream};
use rayon::prelude::*;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use sieve_codec::{DerivedIdentity, derive_identity};
use sieve_ledger::IdentityValidator;
use sieve_types::{
    CandidateFormatError, CheckpointState, IdentityRecord, InvalidCandidate, RunSummary,
};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::ScanConfig;
use crate::output::{self, OutputError, OutputLayout, ShardPolicy};
use crate::source::CandidateSet;
use crate::SetupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    LoadingCheckpoint,
    Processing,
    Checkpointed,
    Finalizing,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        summary: RunSummary,
        output: OutputLayout,
    },
    /// Stopped on request; progress is in the checkpoint.
    Interrupted { processed: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("failed to persist checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("failed to write results: {0}")]
    Output(#[from] OutputError),
    #[error("decode task failed: {0}")]
    Decode(String),
}

/// Cooperative stop request: a sentinel file, a cancellation token, or both.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    file: Option<PathBuf>,
    token: CancellationToken,
}

impl StopSignal {
    #[must_use]
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled() || self.file.as_deref().is_some_and(Path::exists)
    }
}

enum Processed {
    Valid(IdentityRecord),
    Invalid(InvalidCandidate),
}

/// Throughput bookkeeping for progress lines.
struct Progress {
    started: Instant,
    processed_at_start: usize,
    total: usize,
}

impl Progress {
    fn log(&self, state: &CheckpointState, onchain_found: usize) {
        let done_here = state.processed_count.saturating_sub(self.processed_at_start);
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            done_here as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(state.processed_count);
        let eta_secs = if rate > 0.0 {
            (remaining as f64 / rate).round() as u64
        } else {
            0
        };
        tracing::info!(
            processed = state.processed_count,
            total = self.total,
            items_per_sec = format_args!("{rate:.2}"),
            eta_secs,
            onchain_found,
            "Progress"
        );
    }
}

type Decoded = (String, Result<DerivedIdentity, CandidateFormatError>);

/// Decode `pending` on a dedicated pool, preserving order.
async fn decode_pending(workers: usize, pending: Vec<String>) -> Result<Vec<Decoded>, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("sieve-decode-{i}"))
        .build()
        .map_err(|e| SetupError::DecodePool(e.to_string()))?;

    tokio::task::spawn_blocking(move || {
        pool.install(|| {
            pending
                .into_par_iter()
                .map(|raw| {
                    let decoded = derive_identity(&raw);
                    (raw, decoded)
                })
                .collect()
        })
    })
    .await
    .map_err(|e| RunError::Decode(e.to_string()))
}

pub struct Orchestrator {
    out_dir: PathBuf,
    settings: ScanConfig,
    validator: Arc<dyn IdentityValidator>,
    stop: StopSignal,
    store: CheckpointStore,
    state: RunState,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        out_dir: impl Into<PathBuf>,
        settings: ScanConfig,
        validator: Arc<dyn IdentityValidator>,
    ) -> Self {
        let out_dir = out_dir.into();
        let stop = StopSignal::new(settings.stop_file.clone());
        Self {
            store: CheckpointStore::in_dir(&out_dir),
            out_dir,
            settings,
            validator,
            stop,
            state: RunState::Init,
        }
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    fn transition(&mut self, next: RunState) {
        tracing::info!(from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }

    /// Create the output directory and prove it accepts new files by creating
    /// and dropping a temp file in it, so an unusable `--out` fails before any
    /// ledger call.
    fn prepare_output_dir(&self) -> Result<(), SetupError> {
        let dir_error = |source| SetupError::OutputDir {
            path: self.out_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.out_dir).map_err(dir_error)?;
        NamedTempFile::new_in(&self.out_dir)
            .and_then(NamedTempFile::close)
            .map_err(dir_error)?;
        Ok(())
    }

    /// Process `source` to completion or until a stop is requested.
    pub async fn run(&mut self, source: &CandidateSet) -> Result<RunOutcome, RunError> {
        let total = source.len();
        self.transition(RunState::Init);
        self.prepare_output_dir()?;

        self.transition(RunState::LoadingCheckpoint);
        let mut state = self
            .store
            .load_for_source(source.fingerprint())
            .map_err(SetupError::from)?;
        let resume = state.resume_index().min(total);
        if state.is_fresh() {
            tracing::info!(total, "Starting new run");
        } else {
            tracing::info!(
                resume_index = resume,
                processed = state.processed_count,
                total,
                "Resuming from checkpoint"
            );
        }

        self.transition(RunState::Processing);
        if resume < total && self.stop.is_triggered() {
            return self.interrupt(&mut state, total);
        }

        let decoded = decode_pending(
            self.settings.decode_workers,
            source.candidates()[resume..].to_vec(),
        )
        .await?;

        let mut onchain_found = state
            .valid_identities
            .iter()
            .filter(|r| r.validation.label() == Some(true))
            .count();
        let progress = Progress {
            started: Instant::now(),
            processed_at_start: state.processed_count,
            total,
        };
        let interval = self.settings.checkpoint_interval.max(1);
        let mut since_save = 0usize;

        let stop = self.stop.clone();
        let validator = Arc::clone(&self.validator);
        let results = stream::iter(
            decoded
                .into_iter()
                .enumerate()
                .map(move |(offset, (raw, decoded))| (resume + offset, raw, decoded)),
        )
        .take_while(move |_| future::ready(!stop.is_triggered()))
        .map(move |(index, raw, decoded)| {
            let validator = Arc::clone(&validator);
            async move {
                let processed = match decoded {
                    Ok(derived) => {
                        let validation = validator.check(&derived.identity).await;
                        Processed::Valid(IdentityRecord {
                            body: derived.body,
                            identity: derived.identity,
                            public_key: derived.public_key,
                            validation,
                        })
                    }
                    Err(reason) => Processed::Invalid(InvalidCandidate {
                        candidate: raw,
                        reason,
                    }),
                };
                (index, processed)
            }
        })
        .buffered(self.settings.max_in_flight.max(1));
        let mut results = std::pin::pin!(results);

        while let Some((index, processed)) = results.next().await {
            match processed {
                Processed::Valid(record) => {
                    if record.validation.label() == Some(true) {
                        onchain_found += 1;
                        tracing::info!(identity = %record.identity, "Identity found on ledger");
                    }
                    state.record_valid(index, record);
                }
                Processed::Invalid(invalid) => {
                    tracing::debug!(
                        index,
                        candidate = %invalid.candidate,
                        reason = %invalid.reason,
                        "Candidate rejected by codec"
                    );
                    state.record_invalid(index, invalid);
                }
            }

            since_save += 1;
            if since_save >= interval {
                self.store.save(&mut state)?;
                since_save = 0;
                progress.log(&state, onchain_found);
            }
        }

        if state.processed_count < total {
            return self.interrupt(&mut state, total);
        }

        self.transition(RunState::Finalizing);
        let summary = state.summary(total);
        let layout = output::write_results(
            &self.out_dir,
            &summary,
            &state.valid_identities,
            &state.invalid_candidates,
            ShardPolicy {
                threshold: self.settings.shard_threshold,
                shard_size: self.settings.shard_size,
            },
        )?;
        self.store.delete()?;

        self.transition(RunState::Done);
        tracing::info!(
            total = summary.total,
            valid = summary.valid,
            invalid = summary.invalid,
            onchain_found = summary.onchain_found,
            indeterminate = summary.indeterminate,
            success_rate = format_args!("{:.2}%", summary.success_rate),
            "Run complete"
        );
        Ok(RunOutcome::Completed {
            summary,
            output: layout,
        })
    }

    fn interrupt(
        &mut self,
        state: &mut CheckpointState,
        total: usize,
    ) -> Result<RunOutcome, RunError> {
        self.store.save(state)?;
        self.transition(RunState::Checkpointed);
        tracing::warn!(
            processed = state.processed_count,
            total,
            checkpoint = %self.store.path().display(),
            "Stop requested; progress checkpointed"
        );
        Ok(RunOutcome::Interrupted {
            processed: state.processed_count,
            total,
        })
    }
}
