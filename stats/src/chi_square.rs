//! Pearson chi-square and derived measures for one contingency table.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::contingency::ContingencyTable;

/// Why a table was not tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotApplicable {
    /// No samples at this position.
    Empty,
    /// Every sample carries the same label, so one column is all zero.
    SingleOutcome,
    /// Only one character occurs, so there are zero degrees of freedom.
    SingleCategory,
}

impl NotApplicable {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::SingleOutcome => "single_outcome",
            Self::SingleCategory => "single_category",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChiSquare {
    pub chi2: f64,
    pub dof: usize,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSize {
    Small,
    Medium,
    Large,
}

impl EffectSize {
    #[must_use]
    pub fn from_cramers_v(v: f64) -> Self {
        if v > 0.5 {
            Self::Large
        } else if v > 0.3 {
            Self::Medium
        } else {
            Self::Small
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

/// Check whether a statistic can be computed at all.
pub fn applicability(table: &ContingencyTable) -> Result<(), NotApplicable> {
    if table.total() == 0 {
        return Err(NotApplicable::Empty);
    }
    if table.total_true() == 0 || table.total_false() == 0 {
        return Err(NotApplicable::SingleOutcome);
    }
    if table.row_count() < 2 {
        return Err(NotApplicable::SingleCategory);
    }
    Ok(())
}

/// Pearson chi-square test of independence, without continuity correction.
///
/// `dof = rows - 1` since the outcome always has two columns. For 2x2 tables
/// this is less conservative than tools that apply Yates by default; see
/// [`chi_square_with`].
pub fn chi_square(table: &ContingencyTable) -> Result<ChiSquare, NotApplicable> {
    chi_square_with(table, false)
}

/// Pearson chi-square, optionally with Yates' continuity correction.
///
/// The correction only applies when `dof == 1`: each `|observed - expected|`
/// shrinks by 0.5, never below zero.
pub fn chi_square_with(
    table: &ContingencyTable,
    continuity_correction: bool,
) -> Result<ChiSquare, NotApplicable> {
    applicability(table)?;

    let yates = continuity_correction && table.row_count() == 2;
    let shrink = |d: f64| {
        if yates {
            (d.abs() - 0.5).max(0.0)
        } else {
            d
        }
    };

    let n = table.total() as f64;
    let col_true = table.total_true() as f64;
    let col_false = table.total_false() as f64;

    let chi2: f64 = table
        .rows
        .values()
        .map(|counts| {
            let row = counts.total() as f64;
            let expected_true = row * col_true / n;
            let expected_false = row * col_false / n;
            let d_true = shrink(counts.count_true as f64 - expected_true);
            let d_false = shrink(counts.count_false as f64 - expected_false);
            d_true * d_true / expected_true + d_false * d_false / expected_false
        })
        .sum();

    let dof = table.row_count() - 1;
    let p_value = ChiSquared::new(dof as f64)
        .map(|dist| dist.sf(chi2))
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);

    Ok(ChiSquare { chi2, dof, p_value })
}

/// Cramér's V for an `r x 2` table: `sqrt(chi2 / (n * (min(r, 2) - 1)))`.
#[must_use]
pub fn cramers_v(chi2: f64, n: u64, rows: usize) -> f64 {
    let k = rows.min(2).saturating_sub(1);
    if n == 0 || k == 0 {
        return 0.0;
    }
    (chi2 / (n as f64 * k as f64)).sqrt()
}

/// Share of samples a per-character majority vote would classify correctly.
#[must_use]
pub fn accuracy(table: &ContingencyTable) -> f64 {
    let n = table.total();
    if n == 0 {
        return 0.0;
    }
    let correct: u64 = table
        .rows
        .values()
        .map(|c| c.count_true.max(c.count_false))
        .sum();
    correct as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contingency::Counts;
    use std::collections::BTreeMap;

    fn table(rows: &[(char, u64, u64)]) -> ContingencyTable {
        ContingencyTable {
            position: 0,
            rows: rows
                .iter()
                .map(|&(c, t, f)| {
                    (
                        c,
                        Counts {
                            count_true: t,
                            count_false: f,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn two_by_two_matches_reference_values() {
        let t = table(&[('A', 10, 20), ('B', 30, 15)]);
        let result = chi_square(&t).unwrap();
        assert_eq!(result.dof, 1);
        assert!((result.chi2 - 8.035_714_285_714_285).abs() < 1e-9);
        assert!((result.p_value - 0.004_586_392_080_253_493).abs() < 1e-6);

        let v = cramers_v(result.chi2, t.total(), t.row_count());
        assert!((v - 0.327_326_835_353_988_5).abs() < 1e-9);
        assert_eq!(EffectSize::from_cramers_v(v), EffectSize::Medium);
    }

    #[test]
    fn yates_correction_shrinks_two_by_two_only() {
        let t = table(&[('A', 10, 20), ('B', 30, 15)]);
        let corrected = chi_square_with(&t, true).unwrap();
        assert!((corrected.chi2 - 6.752_232_142_857_142).abs() < 1e-9);
        assert!((corrected.p_value - 0.009_363_047_637_533_945).abs() < 1e-6);

        let wide = table(&[('A', 12, 3), ('B', 4, 10), ('C', 6, 6)]);
        assert_eq!(chi_square_with(&wide, true), chi_square(&wide));
    }

    #[test]
    fn three_rows_use_two_degrees_of_freedom() {
        let t = table(&[('A', 12, 3), ('B', 4, 10), ('C', 6, 6)]);
        let result = chi_square(&t).unwrap();
        assert_eq!(result.dof, 2);
        assert!((result.chi2 - 7.793_643_198_906_356).abs() < 1e-9);
        // dof = 2 survival function is exp(-x/2)
        assert!((result.p_value - 0.020_306_350_700_845_85).abs() < 1e-6);
    }

    #[test]
    fn all_one_label_is_not_applicable() {
        let t = table(&[('A', 5, 0), ('B', 3, 0)]);
        assert_eq!(chi_square(&t), Err(NotApplicable::SingleOutcome));
    }

    #[test]
    fn single_character_is_not_applicable() {
        let t = table(&[('Q', 5, 4)]);
        assert_eq!(chi_square(&t), Err(NotApplicable::SingleCategory));
        assert_eq!(chi_square(&table(&[])), Err(NotApplicable::Empty));
    }

    #[test]
    fn accuracy_takes_row_majorities() {
        let t = table(&[('A', 10, 20), ('B', 30, 15)]);
        assert!((accuracy(&t) - 50.0 / 75.0).abs() < 1e-12);
    }

    #[test]
    fn effect_size_thresholds() {
        assert_eq!(EffectSize::from_cramers_v(0.3), EffectSize::Small);
        assert_eq!(EffectSize::from_cramers_v(0.31), EffectSize::Medium);
        assert_eq!(EffectSize::from_cramers_v(0.5), EffectSize::Medium);
        assert_eq!(EffectSize::from_cramers_v(0.51), EffectSize::Large);
    }
}
