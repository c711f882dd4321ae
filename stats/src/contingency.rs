//! Character-by-outcome counts at a single identity position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::LabeledIdentity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub count_true: u64,
    pub count_false: u64,
}

impl Counts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.count_true + self.count_false
    }
}

/// Rows keyed by character, columns are the two outcome labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    pub position: usize,
    pub rows: BTreeMap<char, Counts>,
}

impl ContingencyTable {
    /// Tally `samples` by the character at `position`.
    ///
    /// Identities are always 60 characters; a position past the end is skipped
    /// rather than counted.
    #[must_use]
    pub fn build(position: usize, samples: &[LabeledIdentity]) -> Self {
        let mut rows: BTreeMap<char, Counts> = BTreeMap::new();
        for sample in samples {
            let Some(byte) = sample.identity.char_at(position) else {
                continue;
            };
            let counts = rows.entry(char::from(byte)).or_default();
            if sample.label {
                counts.count_true += 1;
            } else {
                counts.count_false += 1;
            }
        }
        Self { position, rows }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows.values().map(Counts::total).sum()
    }

    #[must_use]
    pub fn total_true(&self) -> u64 {
        self.rows.values().map(|c| c.count_true).sum()
    }

    #[must_use]
    pub fn total_false(&self) -> u64 {
        self.rows.values().map(|c| c.count_false).sum()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_types::Identity;

    fn sample(first: char, label: bool) -> LabeledIdentity {
        let raw = format!("{first}{}", "A".repeat(59));
        LabeledIdentity {
            identity: Identity::parse(&raw).unwrap(),
            label,
        }
    }

    #[test]
    fn build_counts_by_character_and_label() {
        let samples = vec![
            sample('B', true),
            sample('B', false),
            sample('B', true),
            sample('Z', false),
        ];
        let table = ContingencyTable::build(0, &samples);

        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.rows[&'B'],
            Counts {
                count_true: 2,
                count_false: 1
            }
        );
        assert_eq!(table.total(), 4);
        assert_eq!(table.total_true(), 2);
        assert_eq!(table.total_false(), 2);
    }

    #[test]
    fn out_of_range_position_yields_empty_table() {
        let table = ContingencyTable::build(60, &[sample('A', true)]);
        assert_eq!(table.total(), 0);
    }
}
