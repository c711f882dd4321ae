//! The persisted report pair: `statistical_report.json` and `statistical_report.md`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sieve_utils::{AtomicWriteOptions, atomic_write, write_json_atomic};

use crate::analyzer::{PositionKind, StatisticalResult};
use crate::correction::Correction;

pub const REPORT_JSON: &str = "statistical_report.json";
pub const REPORT_MARKDOWN: &str = "statistical_report.md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub alpha: f64,
    pub correction: Correction,
    /// Number of tested positions; the family for both corrections.
    pub family_size: usize,
    /// Bonferroni per-test threshold.
    pub corrected_alpha: f64,
    pub sample_size: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    /// Samples dropped because their ledger check never resolved.
    pub excluded_indeterminate: usize,
    /// Accuracy of always predicting the majority label.
    pub baseline_accuracy: f64,
    pub results: Vec<StatisticalResult>,
}

impl AnalysisReport {
    #[must_use]
    pub fn significant_positions(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| r.significant)
            .map(|r| r.position)
            .collect()
    }

    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Position significance report\n\n");
        out.push_str(&format!(
            "Generated {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        out.push_str("## Sample\n\n");
        out.push_str(&format!(
            "- Labeled identities: {} ({} on-chain, {} absent)\n",
            self.sample_size, self.positive_count, self.negative_count
        ));
        out.push_str(&format!(
            "- Excluded as indeterminate: {}\n",
            self.excluded_indeterminate
        ));
        out.push_str(&format!(
            "- Baseline accuracy (majority label): {:.1}%\n\n",
            self.baseline_accuracy * 100.0
        ));

        out.push_str("## Method\n\n");
        out.push_str(&format!(
            "- Pearson chi-square per position, alpha = {}\n",
            self.alpha
        ));
        out.push_str(&format!(
            "- Exploratory correction: {} over {} tested positions (Bonferroni threshold {:.6})\n",
            self.correction.as_str(),
            self.family_size,
            self.corrected_alpha
        ));
        out.push_str("- Pre-specified positions are judged at the uncorrected alpha\n\n");

        out.push_str("## Results\n\n");
        out.push_str(
            "| Pos | Kind | n | Chars | chi2 | dof | p | p (FDR) | V | Effect | Accuracy | Significant |\n",
        );
        out.push_str(
            "|----:|------|--:|------:|-----:|----:|--:|--------:|--:|--------|---------:|:-----------:|\n",
        );
        for r in &self.results {
            let kind = match r.kind {
                PositionKind::PreSpecified => "pre-specified",
                PositionKind::Exploratory => "exploratory",
            };
            if !r.applicable {
                let reason = r.not_applicable_reason.map_or("n/a", |n| n.as_str());
                out.push_str(&format!(
                    "| {} | {kind} | {} | {} | - | - | - | - | - | - | - | n/a ({reason}) |\n",
                    r.position, r.sample_size, r.categories
                ));
                continue;
            }
            out.push_str(&format!(
                "| {} | {kind} | {} | {} | {:.3} | {} | {:.3e} | {:.3e} | {:.3} | {} | {:.1}% | {} |\n",
                r.position,
                r.sample_size,
                r.categories,
                r.chi2.unwrap_or_default(),
                r.dof.unwrap_or_default(),
                r.p_value.unwrap_or(1.0),
                r.fdr_adjusted_p.unwrap_or(1.0),
                r.cramers_v.unwrap_or_default(),
                r.effect_size.map_or("-", |e| e.as_str()),
                r.accuracy.unwrap_or_default() * 100.0,
                if r.significant { "yes" } else { "no" },
            ));
        }

        let significant = self.significant_positions();
        out.push_str("\n## Verdict\n\n");
        if significant.is_empty() {
            out.push_str("No position is significant after correction.\n");
        } else {
            let list: Vec<String> = significant.iter().map(ToString::to_string).collect();
            out.push_str(&format!("Significant positions: {}\n", list.join(", ")));
        }
        out
    }

    /// Write both report files into `dir`, returning their paths.
    pub fn write(&self, dir: &Path) -> io::Result<(PathBuf, PathBuf)> {
        let json_path = dir.join(REPORT_JSON);
        let md_path = dir.join(REPORT_MARKDOWN);
        write_json_atomic(&json_path, self, AtomicWriteOptions::default())?;
        atomic_write(&md_path, self.to_markdown().as_bytes())?;
        Ok((json_path, md_path))
    }
}
