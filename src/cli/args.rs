use clap::Parser;
use crate::config::defs::{RecordFormat, DEFAULT_ASSEMBLER, DEFAULT_MODE};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "bead-asm", version, about = "Per-bead assembly task dispatcher")]
pub struct Arguments {

    #[arg(long = "r1", help = "Read 1 FASTQ/FASTA, sorted by barcode (plain or gzip)")]
    pub file1: String,

    #[arg(long = "r2", help = "Read 2 FASTQ/FASTA, synchronized with read 1")]
    pub file2: String,

    #[arg(short = 'o', long = "out", help = "Output directory for the summary files.")]
    pub out_dir: String,

    #[arg(short = 'd', long = "index", help = "Bead index TSV: bead id, barcode, read count. Must be sorted like the reads.")]
    pub index: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 't', long, default_value_t = 8, help = "Number of assembly tasks run in parallel")]
    pub threads: usize,

    #[arg(short = 'f', long = "format", default_value = "fq", value_enum)]
    pub format: RecordFormat,

    #[arg(short = 'm', long, default_value = DEFAULT_MODE, help = "Assembly mode [megahit | spades | idba]")]
    pub mode: String,

    #[arg(short = 'c', long = "cpu", default_value_t = 1, help = "CPUs per assembly task")]
    pub cpu: usize,

    #[arg(long = "mem", default_value_t = 10_000_000_000, help = "Memory ceiling per assembly task, in bytes")]
    pub mem: u64,

    #[arg(long = "min-contig-len", default_value_t = 500)]
    pub min_contig_len: usize,

    #[arg(long, default_value = DEFAULT_ASSEMBLER, help = "Program run once per bead")]
    pub assembler: String,

    #[arg(long = "assembler-arg", allow_hyphen_values = true, help = "Extra leading argument for the assembler; repeatable")]
    pub assembler_args: Vec<String>,

    #[arg(long, help = "Scratch root for per-bead files. Defaults to /dev/shm when available.")]
    pub scratch_dir: Option<String>,

    #[arg(long, default_value_t = false, help = "Leave leftover scratch directories in place after the run")]
    pub keep_scratch: bool,
}
