//! Candidate input files.
//!
//! Every accepted layout has its own variant; anything else is rejected rather
//! than guessed at.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use sieve_types::{SourceFingerprint, canonicalize};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read candidates from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(
        "unrecognized candidate layout in {}: expected a string array, an array of objects with `body_56`/`body`, or an object with `all_candidates` or `results`",
        path.display()
    )]
    UnrecognizedShape { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct BodyEntry {
    #[serde(alias = "body_56")]
    body: String,
}

/// The JSON layouts a candidate file may take.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonSource {
    Strings(Vec<String>),
    Entries(Vec<BodyEntry>),
    AllCandidates { all_candidates: Vec<String> },
    Results { results: Vec<BodyEntry> },
}

impl JsonSource {
    fn into_raw(self) -> Vec<String> {
        match self {
            Self::Strings(items) | Self::AllCandidates { all_candidates: items } => items,
            Self::Entries(entries) | Self::Results { results: entries } => {
                entries.into_iter().map(|e| e.body).collect()
            }
        }
    }
}

/// Candidates in canonical order plus the fingerprint of that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Vec<String>,
    fingerprint: SourceFingerprint,
    /// Entries dropped as blank or duplicate after canonicalization.
    pub dropped: usize,
}

impl CandidateSet {
    /// Canonicalize, deduplicate and sort raw entries.
    ///
    /// Malformed entries are kept; the codec rejects them later so they are
    /// recorded rather than silently lost.
    #[must_use]
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = 0usize;
        let unique: BTreeSet<String> = raw
            .into_iter()
            .inspect(|_| seen += 1)
            .map(|s| canonicalize(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        let candidates: Vec<String> = unique.into_iter().collect();
        let fingerprint = fingerprint(&candidates);
        Self {
            dropped: seen - candidates.len(),
            candidates,
            fingerprint,
        }
    }

    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &SourceFingerprint {
        &self.fingerprint
    }
}

fn fingerprint(candidates: &[String]) -> SourceFingerprint {
    let mut hasher = Sha256::new();
    for candidate in candidates {
        hasher.update(candidate.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    SourceFingerprint {
        count: candidates.len(),
        sha256: digest.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

/// Load a candidate file. `.json` files are matched against the known layouts,
/// anything else is read one candidate per line with `#` comments skipped.
pub fn load_candidates(path: &Path) -> Result<CandidateSet, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let raw = if is_json {
        parse_json(path, &content)?
    } else {
        parse_lines(&content)
    };

    let set = CandidateSet::from_raw(raw);
    tracing::info!(
        path = %path.display(),
        candidates = set.len(),
        dropped = set.dropped,
        "Loaded candidate source"
    );
    Ok(set)
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn parse_json(path: &Path, content: &str) -> Result<Vec<String>, SourceError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_value::<JsonSource>(value)
        .map(JsonSource::into_raw)
        .map_err(|_| SourceError::UnrecognizedShape {
            path: path.to_path_buf(),
        })
}
