use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
/// K-mer analysis tool for detecting vector sequence integration
pub(crate) enum GenEditScan {
    /// K-mer match and extension analysis
    Kmer(KmerOpt),
}

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub(crate) struct KmerOpt {
    /// Vector file
    #[structopt(short, long)]
    pub vector: PathBuf,
    /// Mutant files (connect with comma)
    #[structopt(short, long, required = true, use_delimiter = true)]
    pub mutant: Vec<PathBuf>,
    /// Wild type files (connect with comma)
    #[structopt(short, long, required = true, use_delimiter = true)]
    pub wild: Vec<PathBuf>,
    /// K-mer
    #[structopt(short, long, default_value = "20")]
    pub kmer: usize,
    /// Threshold by FDR
    #[structopt(short, long, default_value = "0.01")]
    pub fdr: f64,
    /// Number of bases on each side
    #[structopt(short, long, default_value = "5")]
    pub bases: usize,
    /// Output prefix
    #[structopt(short, long, default_value = "out_prefix")]
    pub out: String,
    /// Number of threads (0 = all)
    #[structopt(short, long, default_value = "0")]
    pub threads: usize,
    /// Maximum read length
    #[structopt(short, long, default_value = "512")]
    pub length: usize,
    /// Number of reads held in memory per batch
    #[structopt(short, long, default_value = "10000000")]
    pub read: usize,
    /// Log output interval
    #[structopt(short, long, default_value = "1000000")]
    pub interval: u64,
    /// Determines verbosity of the processing, can be specified multiple times
    #[structopt(long, parse(from_occurrences))]
    pub verbose: u8,
}

impl KmerOpt {
    pub fn set_logging(&self) {
        use log::LevelFilter::*;

        let log_level = match self.verbose {
            level if level == 1 => Debug,
            level if level > 1 => Trace,
            _ => Info,
        };

        env_logger::builder()
            .format_module_path(false)
            .filter_module("geneditscan", log_level)
            .init();
    }

    /// Echoes the settings the run was started with.
    pub fn echo(&self, version: &str, threads: usize) {
        println!("{}", version);
        println!("\n---------- K-mer analysis settings ----------");
        println!("Vector file = {}", self.vector.display());
        println!("Mutant files:");
        for file in &self.mutant {
            println!("              {}", file.display());
        }
        println!("Wild type files:");
        for file in &self.wild {
            println!("              {}", file.display());
        }
        println!("K-mer                         = {}", self.kmer);
        println!("Threshold by FDR              = {}", self.fdr);
        println!("Number of bases on each side  = {}", self.bases);
        println!("Output prefix                 = {}", self.out);
        println!("Maximum read length           = {}", self.length);
        println!("Number of reads per batch     = {}", self.read);
        println!("Log output interval           = {}", self.interval);
        println!("Number of threads             = {}", threads);
    }
}
