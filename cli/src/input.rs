//! Argument parsing and analysis inputs.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use sieve_engine::{MANIFEST_FILE, RESULTS_FILE, read_results};
use sieve_stats::{LabeledIdentity, LabeledSet};
use sieve_types::{IDENTITY_LEN, Identity};

/// A sorted, deduplicated position list from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positions(pub Vec<usize>);

/// Parse `0-59`, `4,27,30` or a mix such as `0-3,27`.
pub fn parse_positions(raw: &str) -> Result<Positions, String> {
    let mut positions = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_position(a)?, parse_position(b)?),
            None => {
                let p = parse_position(part)?;
                (p, p)
            }
        };
        if start > end {
            return Err(format!("range {part:?} is reversed"));
        }
        positions.extend(start..=end);
    }
    if positions.is_empty() {
        return Err("no positions given".to_string());
    }
    Ok(Positions(positions.into_iter().collect()))
}

fn parse_position(raw: &str) -> Result<usize, String> {
    let position: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{raw:?} is not a position"))?;
    if position >= IDENTITY_LEN {
        return Err(format!(
            "position {position} is outside 0..{}",
            IDENTITY_LEN - 1
        ));
    }
    Ok(position)
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    identity: String,
    /// `null` marks an indeterminate check.
    label: Option<bool>,
}

/// Load labeled identities from a run directory, a result file, or a labels
/// file (`[{"identity": "...", "label": true | false | null}]`).
pub fn load_labeled(path: &Path) -> Result<LabeledSet> {
    let is_result_file = path
        .file_name()
        .is_some_and(|name| name == RESULTS_FILE || name == MANIFEST_FILE);

    if path.is_dir() || is_result_file {
        let results = read_results(path)
            .with_context(|| format!("failed to read results from {}", path.display()))?;
        return Ok(LabeledSet::from_records(&results.records));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels from {}", path.display()))?;
    let entries: Vec<LabelEntry> = serde_json::from_str(&content)
        .with_context(|| format!("labels file {} is not a label array", path.display()))?;

    let mut set = LabeledSet::default();
    for (i, entry) in entries.into_iter().enumerate() {
        let Some(label) = entry.label else {
            set.excluded_indeterminate += 1;
            continue;
        };
        let identity = match Identity::parse(&entry.identity) {
            Ok(identity) => identity,
            Err(e) => bail!("labels entry {i}: {e}"),
        };
        set.samples.push(LabeledIdentity { identity, label });
    }
    Ok(set)
}
