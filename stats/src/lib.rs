//! Statistical tests of whether identity character positions predict ledger existence.
//!
//! For each tested position the analyzer builds a character-by-outcome
//! [`ContingencyTable`], runs a Pearson chi-square test where one is defined,
//! and derives Cramér's V, an effect-size class and majority-vote accuracy.
//! Exploratory positions are then corrected as one family (Bonferroni and
//! Benjamini–Hochberg are both reported); pre-specified positions are judged
//! at the uncorrected alpha.

mod analyzer;
mod chi_square;
mod contingency;
mod correction;
mod report;

pub use analyzer::{AnalysisConfig, PositionKind, StatisticalResult, analyze};
pub use chi_square::{
    ChiSquare, EffectSize, NotApplicable, accuracy, applicability, chi_square, cramers_v,
};
pub use contingency::{ContingencyTable, Counts};
pub use correction::{Correction, benjamini_hochberg, bonferroni_alpha};
pub use report::{AnalysisReport, REPORT_JSON, REPORT_MARKDOWN};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sieve_types::{Identity, IdentityRecord};

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("alpha must lie strictly between 0 and 1, got {0}")]
    InvalidAlpha(f64),
    #[error("position {0} is outside the identity (0..60)")]
    PositionOutOfRange(usize),
}

/// An identity with a confirmed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledIdentity {
    pub identity: Identity,
    pub label: bool,
}

/// Samples drawn from a result set.
#[derive(Debug, Clone, Default)]
pub struct LabeledSet {
    pub samples: Vec<LabeledIdentity>,
    /// Records skipped because their check was indeterminate.
    pub excluded_indeterminate: usize,
}

impl LabeledSet {
    /// Keep confirmed outcomes only; an indeterminate check is never read as "absent".
    #[must_use]
    pub fn from_records(records: &[IdentityRecord]) -> Self {
        let mut set = Self::default();
        for record in records {
            match record.validation.label() {
                Some(label) => set.samples.push(LabeledIdentity {
                    identity: record.identity.clone(),
                    label,
                }),
                None => set.excluded_indeterminate += 1,
            }
        }
        set
    }

    /// Run [`analyze`] and record how many samples were excluded.
    pub fn analyze(&self, config: &AnalysisConfig) -> Result<AnalysisReport, StatsError> {
        let mut report = analyze(&self.samples, config)?;
        report.excluded_indeterminate = self.excluded_indeterminate;
        Ok(report)
    }
}
