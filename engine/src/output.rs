//! Final result files and reading them back.
//!
//! Small runs produce one `results.json`. Runs with more valid identities than
//! the shard threshold produce `results_shard_{i}.json` arrays plus a
//! `manifest.json`, which is written last.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sieve_types::{IdentityRecord, InvalidCandidate, RunSummary};
use sieve_utils::{AtomicWriteOptions, write_json_atomic};

pub const RESULTS_FILE: &str = "results.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[must_use]
pub fn shard_file_name(index: usize) -> String {
    format!("results_shard_{index}.json")
}

fn shard_index(name: &str) -> Option<usize> {
    name.strip_prefix("results_shard_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed result file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("manifest lists shard {} but it is missing", path.display())]
    MissingShard { path: PathBuf },
    #[error("result file {} is missing", path.display())]
    MissingResults { path: PathBuf },
    #[error("failed to remove stale output {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no results.json or manifest.json in {}", path.display())]
    NotFound { path: PathBuf },
}

/// Sharding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPolicy {
    pub threshold: usize,
    pub shard_size: usize,
}

/// `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub summary: RunSummary,
    pub results: Vec<IdentityRecord>,
    #[serde(default)]
    pub invalid_candidates: Vec<InvalidCandidate>,
}

/// `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub total_batches: usize,
    pub batch_size: usize,
    pub summary: RunSummary,
    pub shards: Vec<String>,
    #[serde(default)]
    pub invalid_candidates: Vec<InvalidCandidate>,
}

/// What was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLayout {
    Single { path: PathBuf },
    Sharded { manifest: PathBuf, shards: Vec<PathBuf> },
}

impl OutputLayout {
    /// The file a reader should start from.
    #[must_use]
    pub fn entry_point(&self) -> &Path {
        match self {
            Self::Single { path } => path,
            Self::Sharded { manifest, .. } => manifest,
        }
    }
}

fn write<T: Serialize + ?Sized>(path: PathBuf, value: &T) -> Result<PathBuf, OutputError> {
    write_json_atomic(&path, value, AtomicWriteOptions::default())
        .map_err(|source| OutputError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn remove_if_present(path: &Path) -> Result<(), OutputError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(OutputError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove shard files in `dir` numbered `keep` or higher.
fn remove_shards_from(dir: &Path, keep: usize) -> Result<(), OutputError> {
    let entries = std::fs::read_dir(dir).map_err(|source| OutputError::Cleanup {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name
            .to_str()
            .and_then(shard_index)
            .is_some_and(|index| index >= keep)
        {
            remove_if_present(&entry.path())?;
        }
    }
    Ok(())
}

/// Write the run's results into `dir` according to `policy`.
///
/// Files from an earlier run in the other layout are removed, so a reader of
/// `dir` always sees this run. The other layout's entry point goes first.
pub fn write_results(
    dir: &Path,
    summary: &RunSummary,
    records: &[IdentityRecord],
    invalid: &[InvalidCandidate],
    policy: ShardPolicy,
) -> Result<OutputLayout, OutputError> {
    if records.len() <= policy.threshold {
        remove_if_present(&dir.join(MANIFEST_FILE))?;
        let path = write(
            dir.join(RESULTS_FILE),
            &ResultsDocument {
                summary: summary.clone(),
                results: records.to_vec(),
                invalid_candidates: invalid.to_vec(),
            },
        )?;
        remove_shards_from(dir, 0)?;
        tracing::info!(path = %path.display(), records = records.len(), "Results written");
        return Ok(OutputLayout::Single { path });
    }

    remove_if_present(&dir.join(RESULTS_FILE))?;
    let shard_size = policy.shard_size.max(1);
    let mut shards = Vec::new();
    for (index, chunk) in records.chunks(shard_size).enumerate() {
        shards.push(write(dir.join(shard_file_name(index)), chunk)?);
    }

    let manifest = Manifest {
        total_batches: shards.len(),
        batch_size: shard_size,
        summary: summary.clone(),
        shards: (0..shards.len()).map(shard_file_name).collect(),
        invalid_candidates: invalid.to_vec(),
    };
    let manifest_path = write(dir.join(MANIFEST_FILE), &manifest)?;
    remove_shards_from(dir, shards.len())?;
    tracing::info!(
        path = %manifest_path.display(),
        records = records.len(),
        shards = shards.len(),
        "Sharded results written"
    );
    Ok(OutputLayout::Sharded {
        manifest: manifest_path,
        shards,
    })
}

/// A result set read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub summary: RunSummary,
    pub records: Vec<IdentityRecord>,
    pub invalid_candidates: Vec<InvalidCandidate>,
}

/// Read and parse `path`; `missing` builds the error for a file that is gone.
fn read_json<T: for<'de> Deserialize<'de>>(
    path: &Path,
    missing: fn(PathBuf) -> OutputError,
) -> Result<T, OutputError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            missing(path.to_path_buf())
        } else {
            OutputError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|source| OutputError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Read results from a run directory, a `manifest.json` or a `results.json`.
///
/// A manifest prefers its recorded shard list; every listed shard must exist.
pub fn read_results(path: &Path) -> Result<ResultSet, OutputError> {
    let (file, dir) = if path.is_dir() {
        let manifest = path.join(MANIFEST_FILE);
        let single = path.join(RESULTS_FILE);
        if manifest.exists() {
            (manifest, path.to_path_buf())
        } else if single.exists() {
            (single, path.to_path_buf())
        } else {
            return Err(OutputError::NotFound {
                path: path.to_path_buf(),
            });
        }
    } else {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        (path.to_path_buf(), dir)
    };

    if !file.exists() {
        return Err(OutputError::NotFound { path: file });
    }

    let is_manifest = file
        .file_name()
        .is_some_and(|name| name == MANIFEST_FILE);
    if !is_manifest {
        let doc: ResultsDocument = read_json(&file, |path| OutputError::MissingResults { path })?;
        return Ok(ResultSet {
            summary: doc.summary,
            records: doc.results,
            invalid_candidates: doc.invalid_candidates,
        });
    }

    let manifest: Manifest = read_json(&file, |path| OutputError::MissingResults { path })?;
    let names: Vec<String> = if manifest.shards.is_empty() {
        (0..manifest.total_batches).map(shard_file_name).collect()
    } else {
        manifest.shards.clone()
    };

    let mut records = Vec::new();
    for name in names {
        let shard: Vec<IdentityRecord> =
            read_json(&dir.join(name), |path| OutputError::MissingShard { path })?;
        records.extend(shard);
    }
    Ok(ResultSet {
        summary: manifest.summary,
        records,
        invalid_candidates: manifest.invalid_candidates,
    })
}
