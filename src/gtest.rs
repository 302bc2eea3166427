//! Williams-corrected G-test, chi-square p-values and multiple-testing
//! corrections.

use statrs::function::gamma::gamma_ur;
use std::collections::HashMap;

/// Beyond this G the chi-square tail drops under the smallest normal f32
/// (about 1.17e-38) and the incomplete gamma underflows; p is clamped to 0.
const MAX_GVAL: f64 = 170.0;

/// Per-position results of the match-phase test.
pub struct MatchStats {
    /// Williams-corrected G per position
    pub gval: Vec<f64>,
    /// Chi-square(1) p-value per position
    pub pval: Vec<f64>,
    /// Benjamini-Hochberg FDR per position
    pub fdr: Vec<f64>,
    /// Bonferroni-corrected p-value per position
    pub bon: Vec<f64>,
}

/// G-test over the 2x2 table (class x match) for one k-mer position.
pub struct GTest {
    mutant_total: f64,
    wild_total: f64,
}

/// Quantities shared by every table tested against the same totals.
struct Totals {
    mutant_total_log: f64,
    wild_total_log: f64,
    total: f64,
    q3: f64,
    qcomm: f64,
}

impl GTest {
    pub fn new() -> Self {
        Self {
            mutant_total: 0.0,
            wild_total: 0.0,
        }
    }

    /// Sets the scanned-window totals the tables are judged against.
    pub fn set_mer_totals(&mut self, mutant_total: u64, wild_total: u64) {
        self.mutant_total = mutant_total as f64;
        self.wild_total = wild_total as f64;
    }

    /// Tests every vector position. Positions sharing the same
    /// (mutant, wild) count pair reuse the memoised result, so equal pairs
    /// are bit-identical.
    pub fn match_stats(&self, mutant_freq: &[u32], wild_freq: &[u32]) -> MatchStats {
        let totals = self.precompute();
        let n = mutant_freq.len();
        let mut gval = vec![0.0; n];
        let mut pval = vec![0.0; n];
        let mut bon = vec![0.0; n];
        let mut stock: HashMap<(u32, u32), (f64, f64, f64)> = HashMap::new();

        for i in 0..n {
            let target = (mutant_freq[i], wild_freq[i]);
            let (g, p, b) = *stock.entry(target).or_insert_with(|| {
                let mutant_match = mutant_freq[i] as f64;
                let wild_match = wild_freq[i] as f64;
                if mutant_match * self.wild_total > wild_match * self.mutant_total {
                    let g = self.adjusted_g(&totals, mutant_match, wild_match);
                    let p = p_from_g(g);
                    (g, p, (p * n as f64).min(1.0))
                } else {
                    (0.0, 1.0, 1.0)
                }
            });
            gval[i] = g;
            pval[i] = p;
            bon[i] = b;
        }

        let fdr = benjamini_hochberg(&pval);
        MatchStats {
            gval,
            pval,
            fdr,
            bon,
        }
    }

    /// Tests one flanking-pair count table. The extension variant treats a
    /// tied ratio as enriched.
    pub fn extension_test(&self, mutant_count: u32, wild_count: u32) -> (f64, f64) {
        let totals = self.precompute();
        let mutant_match = mutant_count as f64;
        let wild_match = wild_count as f64;
        if mutant_match * self.wild_total >= wild_match * self.mutant_total {
            let g = self.adjusted_g(&totals, mutant_match, wild_match);
            (g, p_from_g(g))
        } else {
            (0.0, 1.0)
        }
    }

    fn precompute(&self) -> Totals {
        let total = self.mutant_total + self.wild_total;
        Totals {
            mutant_total_log: xlogx(self.mutant_total),
            wild_total_log: xlogx(self.wild_total),
            total,
            q3: xlogx(total),
            qcomm: (total / self.mutant_total + total / self.wild_total - 1.0) / (6.0 * total),
        }
    }

    /// G with Williams's correction for a 2x2 table.
    fn adjusted_g(&self, totals: &Totals, mutant_match: f64, wild_match: f64) -> f64 {
        let mutant_notmatch = self.mutant_total - mutant_match;
        let wild_notmatch = self.wild_total - wild_match;
        let matched = mutant_match + wild_match;
        let notmatch = mutant_notmatch + wild_notmatch;

        let q1 = xlogx(mutant_match)
            + xlogx(mutant_notmatch)
            + xlogx(wild_match)
            + xlogx(wild_notmatch);
        let q2 = totals.mutant_total_log + totals.wild_total_log + xlogx(matched) + xlogx(notmatch);
        let g = 2.0 * (q1 - q2 + totals.q3);

        let q = if matched == 0.0 {
            1.0 + (totals.total / notmatch - 1.0) * totals.qcomm
        } else {
            1.0 + (totals.total / matched + totals.total / notmatch - 1.0) * totals.qcomm
        };
        g / q
    }
}

#[inline]
fn xlogx(x: f64) -> f64 {
    if x > 0.0 {
        x.ln() * x
    } else {
        0.0
    }
}

/// Upper-tail chi-square(1) p-value, guarded against igamc underflow.
fn p_from_g(g: f64) -> f64 {
    if g > 0.0 {
        if g < MAX_GVAL {
            // chdtrc(1, g)
            gamma_ur(0.5, 0.5 * g)
        } else {
            0.0
        }
    } else {
        1.0
    }
}

/// Raw Benjamini-Hochberg walk: sort p ascending, rank every element, assign
/// `min(p * n / rank, 1)` at the first occurrence of each distinct p and let
/// ties inherit it. No monotone post-enforcement.
pub fn benjamini_hochberg(pval: &[f64]) -> Vec<f64> {
    if pval.is_empty() {
        return Vec::new();
    }
    let mut order: Vec<(f64, usize)> = pval.iter().copied().enumerate().map(|(i, p)| (p, i)).collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let n = order.len() as f64;
    let mut fdr = vec![0.0; pval.len()];
    let mut rank = 1.0;
    let mut pval_prev = order[0].0;
    let mut fdr_prev = (pval_prev * n).min(1.0);

    for &(p, idx) in &order {
        if p == pval_prev {
            fdr[idx] = fdr_prev;
        } else {
            pval_prev = p;
            fdr[idx] = (p * n / rank).min(1.0);
            fdr_prev = fdr[idx];
        }
        rank += 1.0;
    }
    fdr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_enriched_position_gets_positive_g() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(1000, 1000);
        let stats = gtest.match_stats(&[10], &[0]);
        assert!(stats.gval[0] > 0.0);
        assert!(stats.pval[0] > 0.0 && stats.pval[0] < 1.0);
    }

    #[test]
    fn test_no_enrichment_is_null() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(1000, 1000);
        // equal counts: m * W == w * M, the strict filter rejects
        let stats = gtest.match_stats(&[5, 0], &[5, 0]);
        for i in 0..2 {
            assert_eq!(stats.gval[i], 0.0);
            assert_eq!(stats.pval[i], 1.0);
            assert_eq!(stats.bon[i], 1.0);
            assert_eq!(stats.fdr[i], 1.0);
        }
    }

    #[test]
    fn test_wild_enriched_is_null() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(1000, 1000);
        let stats = gtest.match_stats(&[0], &[10]);
        assert_eq!(stats.gval[0], 0.0);
        assert_eq!(stats.pval[0], 1.0);
    }

    #[test]
    fn test_extension_tie_counts_as_enriched() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(1000, 1000);
        let (g, p) = gtest.extension_test(0, 0);
        // tied at zero: tested, G collapses to 0 and p to 1
        assert_eq!(g, 0.0);
        assert_eq!(p, 1.0);
        // proportional table: G vanishes up to rounding
        let (g, p) = gtest.extension_test(5, 5);
        assert!(g.abs() < 1e-6);
        assert!(p > 0.999);
    }

    #[test]
    fn test_identical_pairs_identical_results() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(5000, 4000);
        let stats = gtest.match_stats(&[7, 3, 7], &[1, 2, 1]);
        assert_eq!(stats.gval[0].to_bits(), stats.gval[2].to_bits());
        assert_eq!(stats.pval[0].to_bits(), stats.pval[2].to_bits());
        assert_eq!(stats.bon[0].to_bits(), stats.bon[2].to_bits());
        let (g0, p0) = gtest.extension_test(7, 1);
        assert_eq!(g0.to_bits(), stats.gval[0].to_bits());
        assert_eq!(p0.to_bits(), stats.pval[0].to_bits());
    }

    #[test]
    fn test_probability_bounds() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(100_000, 90_000);
        let mutant: Vec<u32> = (0..50).map(|i| i * 7 % 23).collect();
        let wild: Vec<u32> = (0..50).map(|i| i * 3 % 11).collect();
        let stats = gtest.match_stats(&mutant, &wild);
        for i in 0..50 {
            assert!(stats.pval[i] >= 0.0 && stats.pval[i] <= 1.0);
            assert!(stats.fdr[i] >= 0.0 && stats.fdr[i] <= 1.0);
            assert!(stats.bon[i] >= 0.0 && stats.bon[i] <= 1.0);
        }
    }

    #[test]
    fn test_huge_g_clamps_p_to_zero() {
        let mut gtest = GTest::new();
        gtest.set_mer_totals(10_000_000, 10_000_000);
        let stats = gtest.match_stats(&[200_000], &[0]);
        assert!(stats.gval[0] >= MAX_GVAL);
        assert_eq!(stats.pval[0], 0.0);
    }

    #[test]
    fn test_williams_correction_shrinks_g() {
        // raw G for (m=10, w=0) with M=W=1000:
        // q1 = 10 ln 10 + 990 ln 990 + 1000 ln 1000
        // q2 = 1000 ln 1000 + 1000 ln 1000 + 10 ln 10 + 1990 ln 1990
        // q3 = 2000 ln 2000
        let m: f64 = 10.0;
        let big = 1000.0f64;
        let q1 = m * m.ln() + 990.0 * 990.0f64.ln() + big * big.ln();
        let q2 = 2.0 * (big * big.ln()) + m * m.ln() + 1990.0 * 1990.0f64.ln();
        let q3 = 2000.0 * 2000.0f64.ln();
        let raw = 2.0 * (q1 - q2 + q3);

        let mut gtest = GTest::new();
        gtest.set_mer_totals(1000, 1000);
        let stats = gtest.match_stats(&[10], &[0]);
        assert!(stats.gval[0] < raw);
        assert!(stats.gval[0] > 0.9 * raw);
    }

    #[test]
    fn test_p_matches_chi_square_tail() {
        // chdtrc(1, 3.841459) ~ 0.05
        let p = p_from_g(3.841_458_820_694_124);
        assert!((p - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_benjamini_hochberg_walk() {
        let fdr = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.04]);
        assert!(close(fdr[0], 0.04)); // rank 1
        assert!(close(fdr[2], 0.06)); // rank 2
        assert!(close(fdr[1], 0.04 * 4.0 / 3.0)); // rank 3
        assert!(close(fdr[3], 0.04 * 4.0 / 3.0)); // tie inherits rank 3
    }

    #[test]
    fn test_benjamini_hochberg_clamps_to_one() {
        let fdr = benjamini_hochberg(&[0.9, 0.8]);
        assert_eq!(fdr[0], 1.0);
        assert_eq!(fdr[1], 1.0);
    }

    #[test]
    fn test_benjamini_hochberg_is_raw() {
        // the raw walk does not enforce monotonicity: a later rank may
        // receive a smaller value than an earlier one
        let fdr = benjamini_hochberg(&[0.010, 0.021, 0.020]);
        assert!(close(fdr[0], 0.03));
        assert!(close(fdr[2], 0.03));
        assert!(close(fdr[1], 0.021));
        assert!(fdr[1] < fdr[2]);
    }

    #[test]
    fn test_benjamini_hochberg_empty() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
