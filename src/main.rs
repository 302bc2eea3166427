#![warn(missing_debug_implementations, rust_2018_idioms)]
//! K-mer analysis tool for detecting integration of a vector sequence into
//! an edited genome. Compares k-mer occurrence statistics between mutant and
//! wild-type FASTQ reads over every position of a circular vector, then
//! inspects the flanking bases around the positions that survive FDR.

mod alphabet;
mod chunk;
mod cli;
mod error;
mod extension;
mod fastq;
mod gtest;
mod report;
mod vector;

use crate::chunk::ChunkSet;
use crate::error::Error;
use crate::extension::PairTable;
use crate::fastq::{ExtensionScanner, MatchScanner, ScanConfig};
use crate::gtest::{GTest, MatchStats};
use crate::vector::VectorIndex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use structopt::StructOpt;

/// Longest prefix the chunk bitset can index (2 bits per base in 32 bits)
pub const MAX_CHUNK_LENGTH: usize = 16;
/// Smallest supported k
pub const MIN_KMER: usize = 8;

const VERSION: &str = concat!("Program version: geneditscan-", env!("CARGO_PKG_VERSION"));

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli::GenEditScan::Kmer(opt) = cli::GenEditScan::from_args();
    opt.set_logging();

    if opt.kmer < MIN_KMER {
        return Err(Error::KmerTooSmall(opt.kmer, MIN_KMER));
    }
    if opt.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(opt.threads)
            .build_global()
            .ok();
    }

    let start = Instant::now();
    opt.echo(VERSION, rayon::current_num_threads());

    let config = ScanConfig {
        k: opt.kmer,
        chunk_length: opt.kmer.min(MAX_CHUNK_LENGTH),
        bases: opt.bases,
        batch_size: opt.read,
        log_interval: opt.interval,
        max_read_length: opt.length,
    };

    println!(
        "\n---------- Match analysis of k-mer (K-mer = {}) ----------",
        opt.kmer
    );
    let (vector, seed) = vector::load(&opt.vector, opt.kmer)?;
    let mut chunk = ChunkSet::new(config.chunk_length);
    chunk.seed(seed.keys().map(|k| k.as_str()));

    let (mutant_counts, wild_counts, mutant_total, wild_total) =
        match_phase(&config, &chunk, &seed, &opt.mutant, &opt.wild)?;
    println!("Count of mutant mer    = {}", mutant_total);
    println!("Count of wild type mer = {}", wild_total);

    let mutant_freq = position_frequencies(&vector, &mutant_counts);
    let wild_freq = position_frequencies(&vector, &wild_counts);
    report::write_mer_freq(&opt.out, &mutant_counts, ".mutant")?;
    report::write_mer_freq(&opt.out, &wild_counts, ".wildtype")?;

    let mut gtest = GTest::new();
    gtest.set_mer_totals(mutant_total, wild_total);
    let stats = gtest.match_stats(&mutant_freq, &wild_freq);
    report::write_statistics(&opt.out, opt.kmer, &vector, &mutant_freq, &wild_freq, &stats)?;

    println!(
        "\n---------- Extension analysis of k-mer (FDR <= {}) ----------",
        opt.fdr
    );
    extension_phase(
        &opt,
        &config,
        &mut chunk,
        &vector,
        &mutant_freq,
        &wild_freq,
        &stats,
        &mut gtest,
    )?;

    println!("\nElapsed time: {} seconds", start.elapsed().as_secs());
    Ok(())
}

/// Scans every FASTQ file (in parallel across files) and folds the per-file
/// local counts into the shared mutant and wild-type tables. The tables keep
/// the seeded key set: absent keys in a local result contribute zero.
fn match_phase(
    config: &ScanConfig,
    chunk: &ChunkSet,
    seed: &HashMap<String, u32>,
    mutant_files: &[PathBuf],
    wild_files: &[PathBuf],
) -> Result<(HashMap<String, u32>, HashMap<String, u32>, u64, u64)> {
    let scanner = MatchScanner {
        config,
        chunk,
        table: seed,
    };
    let tasks: Vec<(bool, &PathBuf)> = mutant_files
        .iter()
        .map(|path| (true, path))
        .chain(wild_files.iter().map(|path| (false, path)))
        .collect();
    let results: Vec<(bool, HashMap<String, u32>, u64)> = tasks
        .par_iter()
        .map(|(is_mutant, path)| {
            scanner
                .scan_file(path)
                .map(|(local, windows)| (*is_mutant, local, windows))
        })
        .collect::<Result<_>>()?;

    let mut mutant_counts = seed.clone();
    let mut wild_counts = seed.clone();
    let mut mutant_total = 0u64;
    let mut wild_total = 0u64;
    for (is_mutant, local, windows) in results {
        let (counts, total) = if is_mutant {
            (&mut mutant_counts, &mut mutant_total)
        } else {
            (&mut wild_counts, &mut wild_total)
        };
        for (mer, count) in counts.iter_mut() {
            *count += local.get(mer.as_str()).copied().unwrap_or(0);
        }
        *total += windows;
    }
    Ok((mutant_counts, wild_counts, mutant_total, wild_total))
}

/// Per-position frequency: count of the forward mer plus count of its
/// reverse complement. Keys were seeded at load time.
fn position_frequencies(vector: &VectorIndex, counts: &HashMap<String, u32>) -> Vec<u32> {
    vector
        .pos_pairs
        .iter()
        .map(|(mer, rev)| counts[mer.as_str()] + counts[rev.as_str()])
        .collect()
}

/// Re-scans the FASTQ files around the FDR-significant positions, tabulates
/// the flanking pairs and writes the outside report.
#[allow(clippy::too_many_arguments)]
fn extension_phase(
    opt: &cli::KmerOpt,
    config: &ScanConfig,
    chunk: &mut ChunkSet,
    vector: &VectorIndex,
    mutant_freq: &[u32],
    wild_freq: &[u32],
    stats: &MatchStats,
    gtest: &mut GTest,
) -> Result<()> {
    let seed = extension::seed_pair_table(vector, &stats.fdr, opt.fdr, config.k);
    println!("Count of target mer    = {}", seed.len());
    if seed.is_empty() {
        return Ok(());
    }
    chunk.seed(seed.keys().map(|k| k.as_str()));

    let scanner = ExtensionScanner {
        config,
        chunk: &*chunk,
        table: &seed,
    };
    let tasks: Vec<(bool, &PathBuf)> = opt
        .mutant
        .iter()
        .map(|path| (true, path))
        .chain(opt.wild.iter().map(|path| (false, path)))
        .collect();
    let results: Vec<(bool, PairTable, u64)> = tasks
        .par_iter()
        .map(|(is_mutant, path)| {
            scanner
                .scan_file(path)
                .map(|(local, windows)| (*is_mutant, local, windows))
        })
        .collect::<Result<_>>()?;

    let mut mutant_pairs = seed.clone();
    let mut wild_pairs = seed.clone();
    let mut mutant_total = 0u64;
    let mut wild_total = 0u64;
    for (is_mutant, local, windows) in results {
        let (pairs, total) = if is_mutant {
            (&mut mutant_pairs, &mut mutant_total)
        } else {
            (&mut wild_pairs, &mut wild_total)
        };
        for (mer, list) in local {
            pairs.entry(mer).or_insert_with(Vec::new).extend(list);
        }
        *total += windows;
    }
    println!("Count of mutant mer    = {}", mutant_total);
    println!("Count of wild type mer = {}", wild_total);

    if opt.fdr >= 0.0 {
        gtest.set_mer_totals(mutant_total, wild_total);
        let outside = extension::tabulate(
            vector,
            &stats.fdr,
            opt.fdr,
            config.k,
            &mutant_pairs,
            &wild_pairs,
            gtest,
        );
        report::write_outside(
            &opt.out,
            config.k,
            opt.fdr,
            opt.bases,
            vector,
            mutant_freq,
            wild_freq,
            stats,
            &outside,
        )?;
    }
    Ok(())
}
