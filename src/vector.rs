//! Loading and indexing of the vector (reference) sequence.

use crate::alphabet::revcomp;
use crate::error::Error;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

type Result<T> = std::result::Result<T, Error>;

/// The circularised vector and its per-position k-mer map.
pub struct VectorIndex {
    /// Upper-case sequence with the first k-1 bases appended
    pub sequence: String,
    /// Length of the sequence before circularisation
    pub length: usize,
    /// Position to (mer, reverse-complement mer), ascending by position
    pub pos_pairs: Vec<(String, String)>,
}

/// Reads the first FASTA record, circularises it and seeds the match count
/// table with every forward and reverse-complement k-mer at count zero.
pub fn load(path: &Path, k: usize) -> Result<(VectorIndex, HashMap<String, u32>)> {
    let file = File::open(path).map_err(|source| Error::InputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = bio::io::fasta::Reader::new(file);
    let record = reader
        .records()
        .next()
        .ok_or_else(|| Error::EmptyVector(path.to_path_buf()))??;
    let sequence = String::from_utf8_lossy(record.seq()).into_owned();
    index_sequence(sequence, k)
}

/// Builds the position map over an in-memory sequence.
pub fn index_sequence(sequence: String, k: usize) -> Result<(VectorIndex, HashMap<String, u32>)> {
    let mut sequence = sequence.to_uppercase();
    let length = sequence.len();
    if length < k {
        return Err(Error::VectorTooShort);
    }
    let head: String = sequence[..k - 1].to_string();
    sequence.push_str(&head);

    let mut counts = HashMap::new();
    let mut pos_pairs = Vec::with_capacity(length);
    for i in 0..length {
        let mer = sequence[i..i + k].to_string();
        let rev = revcomp(&mer);
        counts.insert(mer.clone(), 0);
        counts.insert(rev.clone(), 0);
        pos_pairs.push((mer, rev));
    }

    Ok((
        VectorIndex {
            sequence,
            length,
            pos_pairs,
        },
        counts,
    ))
}
