//! The three report files and their single-precision number formatting.

use crate::error::Error;
use crate::extension::OutsideTable;
use crate::gtest::{benjamini_hochberg, MatchStats};
use crate::vector::VectorIndex;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

type Result<T> = std::result::Result<T, Error>;

/// Statistics are reported the way a single-precision C stream prints them:
/// six significant digits, scientific notation outside `1e-4 ..= 1e6` with a
/// two-digit exponent, trailing zeros trimmed.
pub fn fmt_stat(value: f64) -> String {
    let v = value as f32;
    if v == 0.0 {
        return "0".to_string();
    }
    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= 6 {
        let formatted = format!("{:.5e}", v);
        let split = formatted.split('e').collect::<Vec<_>>();
        let exponent: i32 = split[1].parse().unwrap_or(0);
        format!(
            "{}e{}{:02}",
            trim_zeros(split[0]),
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        )
    } else {
        trim_zeros(&format!("{:.*}", (5 - exp) as usize, v))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn create(path: PathBuf) -> Result<BufWriter<File>> {
    let file = File::create(&path).map_err(|source| Error::InputOpen { path, source })?;
    Ok(BufWriter::new(file))
}

/// Writes `<prefix>.statistics.txt`: one row per vector position.
pub fn write_statistics(
    out_prefix: &str,
    k: usize,
    vector: &VectorIndex,
    mutant_freq: &[u32],
    wild_freq: &[u32],
    stats: &MatchStats,
) -> Result<()> {
    let mut out = create(PathBuf::from(format!("{}.statistics.txt", out_prefix)))?;
    writeln!(out, "#K-mer\t{}", k)?;
    writeln!(out, "#Pos\tSeq\tMutant\tWildType\tGval\tPval\tFDR\tBonferroni")?;
    let bases = vector.sequence.as_bytes();
    for i in 0..vector.length {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            i + 1,
            bases[i] as char,
            mutant_freq[i],
            wild_freq[i],
            fmt_stat(stats.gval[i]),
            fmt_stat(stats.pval[i]),
            fmt_stat(stats.fdr[i]),
            fmt_stat(stats.bon[i]),
        )?;
    }
    Ok(())
}

/// Writes `<prefix><class>.merFreq.txt`, lexicographically sorted.
pub fn write_mer_freq(
    out_prefix: &str,
    counts: &HashMap<String, u32>,
    class: &str,
) -> Result<()> {
    let mut out = create(PathBuf::from(format!("{}{}.merFreq.txt", out_prefix, class)))?;
    let sorted: BTreeMap<&str, u32> = counts.iter().map(|(mer, c)| (mer.as_str(), *c)).collect();
    for (mer, count) in sorted {
        writeln!(out, "{}\t{}", mer, count)?;
    }
    Ok(())
}

/// Writes `<prefix>.outside.txt`: a parent row per significant position
/// followed by its flank-pair rows. The second-pass FDR runs jointly over
/// every row; Bonferroni uses the joint row count.
pub fn write_outside(
    out_prefix: &str,
    k: usize,
    threshold_fdr: f64,
    bases_on_each_side: usize,
    vector: &VectorIndex,
    mutant_freq: &[u32],
    wild_freq: &[u32],
    stats: &MatchStats,
    outside: &OutsideTable,
) -> Result<()> {
    let mut out = create(PathBuf::from(format!("{}.outside.txt", out_prefix)))?;
    writeln!(
        out,
        "#K-mer\t{}\tFDR\t{}\tBases\t{}",
        k, threshold_fdr, bases_on_each_side
    )?;

    let fdr_ext = benjamini_hochberg(&outside.pvals());
    let n_ext = outside.number_of_extensions as f64;
    let mut row_index = 0usize;

    for position in &outside.positions {
        let i = position.position;
        let kmer = &vector.sequence[i..i + k];
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            i + 1,
            position.rows.len(),
            kmer,
            mutant_freq[i],
            wild_freq[i],
            fmt_stat(stats.gval[i]),
            fmt_stat(stats.pval[i]),
            fmt_stat(stats.fdr[i]),
            fmt_stat(stats.bon[i]),
        )?;
        for row in &position.rows {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}{}{}\t{}\t{}\t{}\t{}",
                row.left,
                row.right,
                row.mutant_count,
                row.wild_count,
                row.left,
                kmer,
                row.right,
                fmt_stat(row.gval),
                fmt_stat(row.pval),
                fmt_stat(fdr_ext[row_index]),
                fmt_stat((row.pval * n_ext).min(1.0)),
            )?;
            row_index += 1;
        }
    }
    Ok(())
}
