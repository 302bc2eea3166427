//! Extension analysis: tabulation of the flanking base pairs collected
//! around FDR-significant vector positions.

use crate::alphabet::revcomp;
use crate::fastq::FlankPair;
use crate::gtest::GTest;
use crate::vector::VectorIndex;
use std::collections::{BTreeMap, HashMap};

/// Flank-pair observations per k-mer key.
pub type PairTable = HashMap<String, Vec<FlankPair>>;

/// One reported flanking-pair row.
pub struct OutsideRow {
    /// Left flank, forward-strand orientation
    pub left: String,
    /// Right flank, forward-strand orientation
    pub right: String,
    /// Occurrences in the mutant sample
    pub mutant_count: u32,
    /// Occurrences in the wild-type sample
    pub wild_count: u32,
    /// Williams-corrected G
    pub gval: f64,
    /// Chi-square(1) p-value
    pub pval: f64,
}

/// Rows of one significant position, ordered by descending mutant count.
pub struct PositionRows {
    /// Vector position (0-based)
    pub position: usize,
    /// Flank-pair rows
    pub rows: Vec<OutsideRow>,
}

/// All extension rows, position-ascending, plus the joint row count used for
/// the second-pass corrections.
pub struct OutsideTable {
    pub positions: Vec<PositionRows>,
    pub number_of_extensions: u64,
}

impl OutsideTable {
    /// P-values of every row in emission order.
    pub fn pvals(&self) -> Vec<f64> {
        self.positions
            .iter()
            .flat_map(|p| p.rows.iter().map(|r| r.pval))
            .collect()
    }
}

/// Builds the extension key set: the forward k-mer and its reverse
/// complement for every position at or below the FDR threshold.
pub fn seed_pair_table(
    vector: &VectorIndex,
    fdr: &[f64],
    threshold: f64,
    k: usize,
) -> PairTable {
    let mut table = PairTable::new();
    for (i, fdr_i) in fdr.iter().enumerate() {
        if *fdr_i <= threshold {
            let mer = vector.sequence[i..i + k].to_string();
            let rev = revcomp(&mer);
            table.insert(mer, Vec::new());
            table.insert(rev, Vec::new());
        }
    }
    table
}

/// Counts flank pairs per significant position and queries the G-test for
/// each row. Reverse-strand observations are re-oriented to forward-strand
/// coordinates before counting. The G/p memo is shared across positions.
pub fn tabulate(
    vector: &VectorIndex,
    fdr: &[f64],
    threshold: f64,
    k: usize,
    mutant_pairs: &PairTable,
    wild_pairs: &PairTable,
    gtest: &GTest,
) -> OutsideTable {
    let mut positions = Vec::new();
    let mut number_of_extensions = 0u64;
    let mut stock: HashMap<(u32, u32), (f64, f64)> = HashMap::new();

    for i in 0..vector.sequence.len() - k {
        if fdr[i] > threshold {
            continue;
        }
        let (mer_plus, mer_minus) = &vector.pos_pairs[i];

        let mut mutant_counts: BTreeMap<FlankPair, u32> = BTreeMap::new();
        let mut wild_counts: BTreeMap<FlankPair, u32> = BTreeMap::new();
        count_pairs(&mut mutant_counts, mutant_pairs.get(mer_plus), false);
        count_pairs(&mut wild_counts, wild_pairs.get(mer_plus), false);
        if mer_plus != mer_minus {
            count_pairs(&mut mutant_counts, mutant_pairs.get(mer_minus), true);
            count_pairs(&mut wild_counts, wild_pairs.get(mer_minus), true);
        }

        let mut ordered: Vec<(u32, FlankPair)> = mutant_counts
            .iter()
            .map(|(pair, count)| (*count, pair.clone()))
            .collect();
        ordered.sort_by(|a, b| b.cmp(a));

        let mut rows = Vec::with_capacity(ordered.len());
        for (mutant_count, pair) in ordered {
            let wild_count = wild_counts.get(&pair).copied().unwrap_or(0);
            let (gval, pval) = *stock
                .entry((mutant_count, wild_count))
                .or_insert_with(|| gtest.extension_test(mutant_count, wild_count));
            rows.push(OutsideRow {
                left: pair.0,
                right: pair.1,
                mutant_count,
                wild_count,
                gval,
                pval,
            });
            number_of_extensions += 1;
        }
        positions.push(PositionRows { position: i, rows });
    }

    OutsideTable {
        positions,
        number_of_extensions,
    }
}

fn count_pairs(dest: &mut BTreeMap<FlankPair, u32>, list: Option<&Vec<FlankPair>>, reorient: bool) {
    if let Some(list) = list {
        for (left, right) in list {
            let key = if reorient {
                (revcomp(right), revcomp(left))
            } else {
                (left.clone(), right.clone())
            };
            *dest.entry(key).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::index_sequence;

    fn significant_at(len: usize, positions: &[usize]) -> Vec<f64> {
        let mut fdr = vec![1.0; len];
        for &i in positions {
            fdr[i] = 0.001;
        }
        fdr
    }

    fn gtest() -> GTest {
        let mut g = GTest::new();
        g.set_mer_totals(10_000, 10_000);
        g
    }

    #[test]
    fn test_seed_includes_both_strands() {
        let (vector, _) = index_sequence("GATTACAGATTACA".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[0]);
        let table = seed_pair_table(&vector, &fdr, 0.01, 8);
        assert!(table.contains_key("GATTACAG"));
        assert!(table.contains_key("CTGTAATC"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rows_ordered_by_descending_mutant_count() {
        let (vector, _) = index_sequence("ACGTACGTACGT".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[0]);
        let mut mutant = PairTable::new();
        let mut list = vec![("CC".to_string(), "TT".to_string())];
        for _ in 0..9 {
            list.push(("AA".to_string(), "GG".to_string()));
        }
        mutant.insert("ACGTACGT".to_string(), list);
        let wild = PairTable::new();

        let table = tabulate(&vector, &fdr, 0.01, 8, &mutant, &wild, &gtest());
        assert_eq!(table.positions.len(), 1);
        assert_eq!(table.number_of_extensions, 2);
        let rows = &table.positions[0].rows;
        assert_eq!(rows[0].mutant_count, 9);
        assert_eq!((rows[0].left.as_str(), rows[0].right.as_str()), ("AA", "GG"));
        assert_eq!(rows[1].mutant_count, 1);
        assert_eq!((rows[1].left.as_str(), rows[1].right.as_str()), ("CC", "TT"));
        assert_eq!(rows[0].wild_count, 0);
        assert!(rows[0].gval > 0.0);
    }

    #[test]
    fn test_reverse_strand_pairs_reoriented() {
        let (vector, _) = index_sequence("GATTACAGATTACA".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[0]);
        let mut mutant = PairTable::new();
        // observed on the minus strand under the reverse-complement key
        mutant.insert(
            "CTGTAATC".to_string(),
            vec![("AA".to_string(), "GG".to_string())],
        );
        let wild = PairTable::new();

        let table = tabulate(&vector, &fdr, 0.01, 8, &mutant, &wild, &gtest());
        let rows = &table.positions[0].rows;
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].left.as_str(), rows[0].right.as_str()), ("CC", "TT"));
    }

    #[test]
    fn test_palindromic_mer_not_double_counted() {
        // ACGTACGT is its own reverse complement; the minus-strand pass
        // must be skipped
        let (vector, _) = index_sequence("ACGTACGTACGT".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[0]);
        let mut mutant = PairTable::new();
        mutant.insert(
            "ACGTACGT".to_string(),
            vec![("AA".to_string(), "GG".to_string())],
        );
        let wild = PairTable::new();

        let table = tabulate(&vector, &fdr, 0.01, 8, &mutant, &wild, &gtest());
        assert_eq!(table.positions[0].rows[0].mutant_count, 1);
    }

    #[test]
    fn test_final_position_never_tabulated() {
        let (vector, _) = index_sequence("ACGTACGTACGT".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[vector.length - 1]);
        let table = tabulate(
            &vector,
            &fdr,
            0.01,
            8,
            &PairTable::new(),
            &PairTable::new(),
            &gtest(),
        );
        assert!(table.positions.is_empty());
    }

    #[test]
    fn test_tie_order_is_descending_lexicographic() {
        let (vector, _) = index_sequence("ACGTACGTACGT".to_string(), 8).unwrap();
        let fdr = significant_at(vector.length, &[0]);
        let mut mutant = PairTable::new();
        mutant.insert(
            "ACGTACGT".to_string(),
            vec![
                ("AA".to_string(), "CC".to_string()),
                ("TT".to_string(), "GG".to_string()),
            ],
        );
        let table = tabulate(&vector, &fdr, 0.01, 8, &mutant, &PairTable::new(), &gtest());
        let rows = &table.positions[0].rows;
        assert_eq!(rows[0].left, "TT");
        assert_eq!(rows[1].left, "AA");
    }
}
