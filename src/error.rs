use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
/// Lists errors that terminate the analysis
pub enum Error {
    #[error("Could not open ({path}): {source}")]
    /// An input file could not be opened
    InputOpen {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    #[error("Could not get sequence ({0})")]
    /// A FASTQ record does not follow the four-line layout
    MalformedFastq(String),
    #[error("Read of {len} bases exceeds the maximum read length ({max})")]
    /// A sequence line is longer than the configured maximum
    ReadTooLong {
        /// Observed sequence length
        len: usize,
        /// Configured maximum
        max: usize,
    },
    #[error("Vector is shorter than k-mer")]
    /// The vector sequence has fewer bases than k
    VectorTooShort,
    #[error("No sequence record in vector file ({0})")]
    /// The vector FASTA holds no record
    EmptyVector(PathBuf),
    #[error("K-mer ({0}) must be >= {1}")]
    /// K below the supported minimum
    KmerTooSmall(usize, usize),
    #[error("Could not read input")]
    /// I/O failure while streaming an input file
    Io(#[from] std::io::Error),
}
