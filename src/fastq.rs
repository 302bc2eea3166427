//! Streaming scan of gzipped FASTQ files.
//!
//! Reads are framed from the four-line layout, batched in memory and swept
//! with a rolling 2-bit window. The chunk bitset prefilters windows before
//! the exact lookup in the caller's k-mer table.

use crate::alphabet::encode;
use crate::chunk::ChunkSet;
use crate::error::Error;
use flate2::read::MultiGzDecoder;
use log::info;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

type Result<T> = std::result::Result<T, Error>;

/// Pair of flanking fragments observed around a k-mer hit.
pub type FlankPair = (String, String);

/// Scan parameters shared by both phases.
pub struct ScanConfig {
    /// K-mer length
    pub k: usize,
    /// Prefix length of the chunk bitset, `min(k, 16)`
    pub chunk_length: usize,
    /// Flank length on each side (extension phase)
    pub bases: usize,
    /// Reads accumulated before a batch is processed in parallel
    pub batch_size: usize,
    /// Progress message interval in reads, 0 disables
    pub log_interval: u64,
    /// Longest sequence line accepted
    pub max_read_length: usize,
}

/// Four-line record framing over a gzip stream. Yields bare sequence lines;
/// a partial record at EOF is dropped.
struct FastqLines {
    reader: BufReader<MultiGzDecoder<File>>,
    max_read_length: usize,
}

impl FastqLines {
    fn open(path: &Path, max_read_length: usize) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::InputOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            reader: BufReader::new(MultiGzDecoder::new(file)),
            max_read_length,
        })
    }

    fn next_line(&mut self, line: &mut String) -> Result<bool> {
        line.clear();
        Ok(self.reader.read_line(line)? > 0)
    }

    /// Next sequence line with the terminator stripped, or `None` at EOF.
    fn next_sequence(&mut self) -> Result<Option<String>> {
        let mut header = String::new();
        if !self.next_line(&mut header)? {
            return Ok(None);
        }
        let mut sequence = String::new();
        let mut plus = String::new();
        let mut quality = String::new();
        if !self.next_line(&mut sequence)?
            || !self.next_line(&mut plus)?
            || !self.next_line(&mut quality)?
        {
            return Ok(None);
        }
        if !header.starts_with('@') || !plus.starts_with('+') {
            return Err(Error::MalformedFastq(
                header.trim_end_matches('\n').to_string(),
            ));
        }
        while sequence.ends_with('\n') || sequence.ends_with('\r') {
            sequence.pop();
        }
        if sequence.len() > self.max_read_length {
            return Err(Error::ReadTooLong {
                len: sequence.len(),
                max: self.max_read_length,
            });
        }
        Ok(Some(sequence))
    }
}

/// Match-phase scanner: counts occurrences of tracked k-mers.
pub struct MatchScanner<'a> {
    pub config: &'a ScanConfig,
    pub chunk: &'a ChunkSet,
    /// Seeded key set; only these k-mers are counted
    pub table: &'a HashMap<String, u32>,
}

impl MatchScanner<'_> {
    /// Scans one file. Returns the local count table and the number of
    /// windows swept.
    pub fn scan_file(&self, path: &Path) -> Result<(HashMap<String, u32>, u64)> {
        let mut lines = FastqLines::open(path, self.config.max_read_length)?;
        let read_counter = AtomicU64::new(0);
        let mut local = HashMap::new();
        let mut windows = 0u64;
        let mut batch: Vec<String> = Vec::new();

        while let Some(sequence) = lines.next_sequence()? {
            if sequence.len() >= self.config.k {
                batch.push(sequence);
                if batch.len() > self.config.batch_size {
                    self.drain(path, &batch, &read_counter, &mut local, &mut windows);
                    batch.clear();
                }
            }
        }
        self.drain(path, &batch, &read_counter, &mut local, &mut windows);
        Ok((local, windows))
    }

    fn drain(
        &self,
        path: &Path,
        batch: &[String],
        read_counter: &AtomicU64,
        local: &mut HashMap<String, u32>,
        windows: &mut u64,
    ) {
        let interval = self.config.log_interval;
        let (counts, swept) = batch
            .par_iter()
            .fold(
                || (HashMap::new(), 0u64),
                |(mut counts, mut swept), sequence| {
                    let n = read_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if interval > 0 && n % interval == 0 {
                        info!("{}: parsing {} reads (k-mer match).", path.display(), n);
                    }
                    self.scan_read(sequence, &mut counts, &mut swept);
                    (counts, swept)
                },
            )
            .reduce(
                || (HashMap::new(), 0u64),
                |(mut a, na), (b, nb)| {
                    for (mer, count) in b {
                        *a.entry(mer).or_insert(0) += count;
                    }
                    (a, na + nb)
                },
            );
        for (mer, count) in counts {
            *local.entry(mer).or_insert(0) += count;
        }
        *windows += swept;
    }

    fn scan_read(&self, sequence: &str, counts: &mut HashMap<String, u32>, windows: &mut u64) {
        let bytes = sequence.as_bytes();
        let k = self.config.k;
        let l = self.config.chunk_length;
        let mask = self.chunk.mask();

        let mut packed = encode(bytes[0]);
        for &b in &bytes[1..l - 1] {
            packed = ((packed << 2) + encode(b)) & mask;
        }
        for j in 0..=bytes.len() - k {
            packed = ((packed << 2) + encode(bytes[l - 1 + j])) & mask;
            if self.chunk.contains(packed) {
                let mer = &sequence[j..j + k];
                if self.table.contains_key(mer) {
                    *counts.entry(mer.to_string()).or_insert(0) += 1;
                }
            }
            *windows += 1;
        }
    }
}

/// Extension-phase scanner: records the flanking fragments around every hit.
pub struct ExtensionScanner<'a> {
    pub config: &'a ScanConfig,
    pub chunk: &'a ChunkSet,
    /// Seeded key set; only hits on these k-mers are recorded
    pub table: &'a HashMap<String, Vec<FlankPair>>,
}

impl ExtensionScanner<'_> {
    /// Scans one file. Returns the flank pairs per k-mer and the number of
    /// windows swept.
    pub fn scan_file(&self, path: &Path) -> Result<(HashMap<String, Vec<FlankPair>>, u64)> {
        let mut lines = FastqLines::open(path, self.config.max_read_length)?;
        let read_counter = AtomicU64::new(0);
        let mut local: HashMap<String, Vec<FlankPair>> = HashMap::new();
        let mut windows = 0u64;
        let mut batch: Vec<String> = Vec::new();
        let min_len = self.config.k + 2 * self.config.bases;

        while let Some(sequence) = lines.next_sequence()? {
            if sequence.len() >= min_len {
                batch.push(sequence);
                if batch.len() > self.config.batch_size {
                    self.drain(path, &batch, &read_counter, &mut local, &mut windows);
                    batch.clear();
                }
            }
        }
        self.drain(path, &batch, &read_counter, &mut local, &mut windows);
        Ok((local, windows))
    }

    fn drain(
        &self,
        path: &Path,
        batch: &[String],
        read_counter: &AtomicU64,
        local: &mut HashMap<String, Vec<FlankPair>>,
        windows: &mut u64,
    ) {
        let interval = self.config.log_interval;
        let (pairs, swept) = batch
            .par_iter()
            .fold(
                || (HashMap::new(), 0u64),
                |(mut pairs, mut swept), sequence| {
                    let n = read_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if interval > 0 && n % interval == 0 {
                        info!("{}: parsing {} reads (k-mer extension).", path.display(), n);
                    }
                    self.scan_read(sequence, &mut pairs, &mut swept);
                    (pairs, swept)
                },
            )
            .reduce(
                || (HashMap::new(), 0u64),
                |(mut a, na), (b, nb): (HashMap<String, Vec<FlankPair>>, u64)| {
                    for (mer, list) in b {
                        a.entry(mer).or_insert_with(Vec::new).extend(list);
                    }
                    (a, na + nb)
                },
            );
        for (mer, list) in pairs {
            local.entry(mer).or_insert_with(Vec::new).extend(list);
        }
        *windows += swept;
    }

    fn scan_read(
        &self,
        sequence: &str,
        pairs: &mut HashMap<String, Vec<FlankPair>>,
        windows: &mut u64,
    ) {
        let bytes = sequence.as_bytes();
        let k = self.config.k;
        let l = self.config.chunk_length;
        let nbase = self.config.bases;
        let mask = self.chunk.mask();

        let mut packed = encode(bytes[0]);
        for &b in &bytes[1..l - 1] {
            packed = ((packed << 2) + encode(b)) & mask;
        }
        // pre-roll the flank offset so the window lines up at j = nbase
        for j in 0..nbase {
            packed = ((packed << 2) + encode(bytes[l - 1 + j])) & mask;
        }
        for j in nbase..=bytes.len() - k - nbase {
            packed = ((packed << 2) + encode(bytes[l - 1 + j])) & mask;
            if self.chunk.contains(packed) {
                let mer = &sequence[j..j + k];
                if self.table.contains_key(mer) {
                    let left = sequence[j - nbase..j].to_string();
                    let right = sequence[j + k..j + k + nbase].to_string();
                    pairs
                        .entry(mer.to_string())
                        .or_insert_with(Vec::new)
                        .push((left, right));
                }
            }
            *windows += 1;
        }
    }
}
