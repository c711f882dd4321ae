//! Runs the per-position tests and applies the family-wide corrections.

use std::collections::BTreeSet;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use sieve_types::IDENTITY_LEN;

use crate::chi_square::{self, EffectSize, NotApplicable};
use crate::contingency::ContingencyTable;
use crate::correction::{self, Correction};
use crate::report::AnalysisReport;
use crate::{LabeledIdentity, StatsError};

fn default_alpha() -> f64 {
    0.05
}

fn default_positions() -> Vec<usize> {
    (0..IDENTITY_LEN).collect()
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    pub correction: Correction,
    /// Positions to test. Pre-specified positions are always tested.
    #[serde(default = "default_positions")]
    pub positions: Vec<usize>,
    /// Positions named before looking at the data; judged without correction.
    pub pre_specified: Vec<usize>,
    /// Apply Yates' correction to 2x2 tables. Off by default.
    pub continuity_correction: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            correction: Correction::default(),
            positions: default_positions(),
            pre_specified: Vec::new(),
            continuity_correction: false,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(StatsError::InvalidAlpha(self.alpha));
        }
        if let Some(&position) = self
            .positions
            .iter()
            .chain(&self.pre_specified)
            .find(|&&p| p >= IDENTITY_LEN)
        {
            return Err(StatsError::PositionOutOfRange(position));
        }
        Ok(())
    }

    /// Sorted, deduplicated union of `positions` and `pre_specified`.
    #[must_use]
    pub fn tested_positions(&self) -> Vec<usize> {
        self.positions
            .iter()
            .chain(&self.pre_specified)
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    PreSpecified,
    Exploratory,
}

/// Outcome of testing one position.
///
/// Statistic fields are `None` when the position is not applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalResult {
    pub position: usize,
    pub kind: PositionKind,
    pub applicable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_applicable_reason: Option<NotApplicable>,
    pub sample_size: u64,
    pub categories: usize,
    pub chi2: Option<f64>,
    pub p_value: Option<f64>,
    pub dof: Option<usize>,
    pub cramers_v: Option<f64>,
    pub effect_size: Option<EffectSize>,
    pub accuracy: Option<f64>,
    pub uncorrected_significant: bool,
    pub bonferroni_significant: bool,
    pub fdr_adjusted_p: Option<f64>,
    pub fdr_significant: bool,
    /// Final call: uncorrected for pre-specified positions, the configured
    /// correction for exploratory ones.
    pub significant: bool,
    pub table: ContingencyTable,
}

fn test_position(
    position: usize,
    kind: PositionKind,
    samples: &[LabeledIdentity],
    continuity_correction: bool,
) -> StatisticalResult {
    let table = ContingencyTable::build(position, samples);
    let sample_size = table.total();
    let categories = table.row_count();

    let mut result = StatisticalResult {
        position,
        kind,
        applicable: false,
        not_applicable_reason: None,
        sample_size,
        categories,
        chi2: None,
        p_value: None,
        dof: None,
        cramers_v: None,
        effect_size: None,
        accuracy: None,
        uncorrected_significant: false,
        bonferroni_significant: false,
        fdr_adjusted_p: None,
        fdr_significant: false,
        significant: false,
        table,
    };

    match chi_square::chi_square_with(&result.table, continuity_correction) {
        Ok(test) => {
            let v = chi_square::cramers_v(test.chi2, sample_size, categories);
            result.applicable = true;
            result.chi2 = Some(test.chi2);
            result.p_value = Some(test.p_value);
            result.dof = Some(test.dof);
            result.cramers_v = Some(v);
            result.effect_size = Some(EffectSize::from_cramers_v(v));
            result.accuracy = Some(chi_square::accuracy(&result.table));
        }
        Err(reason) => {
            result.not_applicable_reason = Some(reason);
        }
    }
    result
}

/// Test every configured position against `samples`.
///
/// The correction family is every tested position. Positions that cannot be
/// tested count as `p = 1` in the family and are never significant.
pub fn analyze(
    samples: &[LabeledIdentity],
    config: &AnalysisConfig,
) -> Result<AnalysisReport, StatsError> {
    config.validate()?;

    let pre_specified: BTreeSet<usize> = config.pre_specified.iter().copied().collect();
    let positions = config.tested_positions();

    let mut results: Vec<StatisticalResult> = positions
        .par_iter()
        .map(|&position| {
            let kind = if pre_specified.contains(&position) {
                PositionKind::PreSpecified
            } else {
                PositionKind::Exploratory
            };
            test_position(position, kind, samples, config.continuity_correction)
        })
        .collect();
    results.sort_by_key(|r| r.position);

    let family_size = results.len();
    let corrected_alpha = correction::bonferroni_alpha(config.alpha, family_size);

    let raw: Vec<f64> = results.iter().map(|r| r.p_value.unwrap_or(1.0)).collect();
    let adjusted = correction::benjamini_hochberg(&raw);

    for (result, &fdr_p) in results.iter_mut().zip(&adjusted) {
        if !result.applicable {
            continue;
        }
        let p = result.p_value.unwrap_or(1.0);
        result.uncorrected_significant = p < config.alpha;
        result.bonferroni_significant = p < corrected_alpha;
        result.fdr_adjusted_p = Some(fdr_p);
        result.fdr_significant = fdr_p < config.alpha;
        result.significant = match (result.kind, config.correction) {
            (PositionKind::PreSpecified, _) => result.uncorrected_significant,
            (PositionKind::Exploratory, Correction::Bonferroni) => result.bonferroni_significant,
            (PositionKind::Exploratory, Correction::Fdr) => result.fdr_significant,
        };
    }

    let positive_count = samples.iter().filter(|s| s.label).count();
    let negative_count = samples.len() - positive_count;
    let baseline_accuracy = if samples.is_empty() {
        0.0
    } else {
        positive_count.max(negative_count) as f64 / samples.len() as f64
    };

    tracing::info!(
        samples = samples.len(),
        positions = results.len(),
        family_size,
        significant = results.iter().filter(|r| r.significant).count(),
        "Position analysis complete"
    );

    Ok(AnalysisReport {
        generated_at: Utc::now(),
        alpha: config.alpha,
        correction: config.correction,
        family_size,
        corrected_alpha,
        sample_size: samples.len(),
        positive_count,
        negative_count,
        excluded_indeterminate: 0,
        baseline_accuracy,
        results,
    })
}
