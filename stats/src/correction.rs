//! Multiple-testing corrections.

use serde::{Deserialize, Serialize};

/// Correction applied to exploratory positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correction {
    #[default]
    Bonferroni,
    /// Benjamini–Hochberg false discovery rate.
    Fdr,
}

impl Correction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bonferroni => "bonferroni",
            Self::Fdr => "fdr",
        }
    }
}

impl std::str::FromStr for Correction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bonferroni" => Ok(Self::Bonferroni),
            "fdr" | "bh" | "benjamini-hochberg" => Ok(Self::Fdr),
            other => Err(format!("unknown correction {other:?} (expected bonferroni or fdr)")),
        }
    }
}

/// Per-test threshold `alpha / family_size`.
#[must_use]
pub fn bonferroni_alpha(alpha: f64, family_size: usize) -> f64 {
    if family_size == 0 {
        alpha
    } else {
        alpha / family_size as f64
    }
}

/// Benjamini–Hochberg adjusted p-values, returned in input order.
///
/// Sort ascending, scale each by `T / rank`, then take running minima from the
/// largest rank down so the adjusted values are monotone. Values are capped at 1.
#[must_use]
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let t = p_values.len();
    if t == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..t).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; t];
    let mut running_min = f64::INFINITY;
    for (rank_idx, &original) in order.iter().enumerate().rev() {
        let rank = rank_idx + 1;
        let scaled = p_values[original] * t as f64 / rank as f64;
        running_min = running_min.min(scaled);
        adjusted[original] = running_min.min(1.0);
    }
    adjusted
}
