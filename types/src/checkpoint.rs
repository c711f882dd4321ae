//! Batch progress state and its summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Candidate, CandidateFormatError, Identity, PublicKey, ValidationResult};

/// A decoded candidate together with its remote check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub body: Candidate,
    pub identity: Identity,
    pub public_key: PublicKey,
    #[serde(rename = "metadata")]
    pub validation: ValidationResult,
}

/// A candidate the codec rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidCandidate {
    pub candidate: String,
    pub reason: CandidateFormatError,
}

/// Identifies the canonical candidate sequence a checkpoint was taken against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub count: usize,
    pub sha256: String,
}

/// Durable, append-only progress of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(rename = "processed")]
    pub processed_count: usize,
    /// Index of the last processed candidate; `None` before the first item.
    pub last_processed_index: Option<usize>,
    pub valid_identities: Vec<IdentityRecord>,
    pub invalid_candidates: Vec<InvalidCandidate>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fingerprint: Option<SourceFingerprint>,
}

impl CheckpointState {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            processed_count: 0,
            last_processed_index: None,
            valid_identities: Vec::new(),
            invalid_candidates: Vec::new(),
            started_at: now,
            updated_at: now,
            source_fingerprint: None,
        }
    }

    /// Index of the next candidate to process.
    #[must_use]
    pub fn resume_index(&self) -> usize {
        self.last_processed_index.map_or(0, |i| i + 1)
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.processed_count == 0 && self.last_processed_index.is_none()
    }

    pub fn record_valid(&mut self, index: usize, record: IdentityRecord) {
        self.valid_identities.push(record);
        self.advance(index);
    }

    pub fn record_invalid(&mut self, index: usize, candidate: InvalidCandidate) {
        self.invalid_candidates.push(candidate);
        self.advance(index);
    }

    fn advance(&mut self, index: usize) {
        self.processed_count += 1;
        self.last_processed_index = Some(index);
    }

    #[must_use]
    pub fn summary(&self, total: usize) -> RunSummary {
        RunSummary::from_records(total, &self.valid_identities, self.invalid_candidates.len())
    }
}

/// Aggregate counts for a run or a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub onchain_found: usize,
    pub indeterminate: usize,
    /// `onchain_found / valid`, as a percentage.
    pub success_rate: f64,
}

impl RunSummary {
    #[must_use]
    pub fn from_records(total: usize, records: &[IdentityRecord], invalid: usize) -> Self {
        let valid = records.len();
        let onchain_found = records.iter().filter(|r| r.validation.label() == Some(true)).count();
        let indeterminate = records
            .iter()
            .filter(|r| r.validation.is_indeterminate())
            .count();
        let success_rate = if valid == 0 {
            0.0
        } else {
            onchain_found as f64 / valid as f64 * 100.0
        };
        Self {
            total,
            processed: valid + invalid,
            valid,
            invalid,
            onchain_found,
            indeterminate,
            success_rate,
        }
    }
}
