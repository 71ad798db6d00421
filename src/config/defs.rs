use std::path::PathBuf;
use clap::ValueEnum;
use thiserror::Error;
use crate::cli::Arguments;

// Static Filenames
pub const SCRATCH_DIR_NAME: &str = "Assemble_BI";
pub const SHARD_PREFIX: &str = "BI";
pub const SHARD_ID_WIDTH: usize = 8;
pub const READ1_STEM: &str = "sort.1";
pub const READ2_STEM: &str = "sort.2";

// Per-shard assembler outputs
pub const CONTIG_TABLE_FILE: &str = "BI.contig.tsv";
pub const CONTIG_FASTA_FILE: &str = "BI.contig.fasta";
pub const CLIP_FASTA_FILE: &str = "BI.clip.all.fasta";
pub const CLIP_METADATA_FILE: &str = "BI.clip.metadata.tsv";

pub const SUMMARY_PREFIX: &str = "summary.BI";

pub const FASTA_TAG : &str = "fa";
pub const FASTQ_TAG : &str = "fq";
pub const FASTA_PREFIX: u8 = b'>';
pub const FASTQ_PREFIX: u8 = b'@';

pub const BARCODE_DELIMITER: char = '/';
pub const BARCODE_SEPARATOR: char = '_';

// Static Parameters
pub const DEFAULT_ASSEMBLER: &str = "metabbq";
pub const DEFAULT_MODE: &str = "megahit";
pub const SLOTS_PER_WORKER: usize = 2;
pub const SHARD_CHANNEL_CAPACITY: usize = 1;


/// Record layout of both mate files.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum RecordFormat {
    #[default]
    #[value(name = "fq")]
    Fastq,
    #[value(name = "fa")]
    Fasta,
}

impl RecordFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordFormat::Fasta => FASTA_TAG,
            RecordFormat::Fastq => FASTQ_TAG,
        }
    }

    /// Leading byte of every record header.
    pub fn label_prefix(&self) -> u8 {
        match self {
            RecordFormat::Fasta => FASTA_PREFIX,
            RecordFormat::Fastq => FASTQ_PREFIX,
        }
    }
}


/// The four result categories each assembly task leaves behind, in the
/// order they are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    ContigTable,
    ClipFasta,
    ClipMetadata,
    ContigFasta,
}

impl ResultKind {
    pub const ALL: [ResultKind; 4] = [
        ResultKind::ContigTable,
        ResultKind::ClipFasta,
        ResultKind::ClipMetadata,
        ResultKind::ContigFasta,
    ];

    /// File name inside a shard's output directory.
    pub fn shard_file(&self) -> &'static str {
        match self {
            ResultKind::ContigTable => CONTIG_TABLE_FILE,
            ResultKind::ClipFasta => CLIP_FASTA_FILE,
            ResultKind::ClipMetadata => CLIP_METADATA_FILE,
            ResultKind::ContigFasta => CONTIG_FASTA_FILE,
        }
    }

    /// File name of the run-wide aggregate, e.g. `summary.BI.megahit.contig.tsv`.
    pub fn summary_file(&self, mode: &str) -> String {
        let suffix = self.shard_file().trim_start_matches("BI.");
        format!("{}.{}.{}", SUMMARY_PREFIX, mode, suffix)
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse record in {path}: {reason}")]
    RecordParse {
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid index line {line} in {path}: {reason}")]
    IndexParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Barcode {current} follows {previous}; input must be sorted by barcode")]
    OrderingViolation {
        previous: String,
        current: String,
    },

    #[error("Failed to spawn {tool} for shard {shard}: {error}")]
    TaskSpawn {
        tool: String,
        shard: String,
        error: String,
    },

    #[error("Assembly task for shard {shard} failed: {status}")]
    TaskFailed {
        shard: String,
        status: String,
    },

    #[error("Worker task panicked or was cancelled: {0}")]
    Join(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.into(), source }
    }
}


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub scratch_root: PathBuf,
    pub out_dir: PathBuf,
    pub workers: usize,
    pub args: Arguments,
}
