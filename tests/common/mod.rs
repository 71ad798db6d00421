#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use bead_asm::cli::Arguments;
use bead_asm::config::defs::{RecordFormat, RunConfig, SCRATCH_DIR_NAME};


const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Synthetic paired reads for a run of beads.
pub struct BeadReads {
    rng: StdRng,
    quality: Normal<f32>,
    read_len: usize,
}

impl BeadReads {
    pub fn new(seed: u64, read_len: usize) -> Self {
        BeadReads {
            rng: StdRng::seed_from_u64(seed),
            quality: Normal::new(35.0, 3.0).unwrap(),
            read_len,
        }
    }

    fn sequence(&mut self) -> Vec<u8> {
        (0..self.read_len).map(|_| *BASES.choose(&mut self.rng).unwrap()).collect()
    }

    fn qualities(&mut self) -> Vec<u8> {
        (0..self.read_len)
            .map(|_| {
                let mut raw = -1.0;
                while !(0.0..=40.0).contains(&raw) {
                    raw = self.quality.sample(&mut self.rng);
                }
                raw as u8 + 33
            })
            .collect()
    }

    /// Writes both mates for `(barcode, pairs)` groups in the order given.
    pub fn write<W: Write>(
        &mut self,
        r1: &mut W,
        r2: &mut W,
        groups: &[(&str, usize)],
        format: RecordFormat,
    ) -> io::Result<()> {
        let mut n = 0;
        for (barcode, pairs) in groups {
            for _ in 0..*pairs {
                n += 1;
                for (mate, out) in [(1, &mut *r1), (2, &mut *r2)] {
                    let seq = self.sequence();
                    match format {
                        RecordFormat::Fastq => {
                            let qual = self.qualities();
                            writeln!(out, "@read{}/{}/{}", n, barcode, mate)?;
                            out.write_all(&seq)?;
                            out.write_all(b"\n+\n")?;
                            out.write_all(&qual)?;
                            out.write_all(b"\n")?;
                        }
                        RecordFormat::Fasta => {
                            writeln!(out, ">read{}/{}/{}", n, barcode, mate)?;
                            out.write_all(&seq)?;
                            out.write_all(b"\n")?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}


/// Writes `r1.<ext>` and `r2.<ext>` into `dir`, gzipped when asked.
pub fn write_reads(
    dir: &Path,
    groups: &[(&str, usize)],
    format: RecordFormat,
    gzip: bool,
) -> io::Result<(PathBuf, PathBuf)> {
    let suffix = if gzip { ".gz" } else { "" };
    let p1 = dir.join(format!("r1.{}{}", format.extension(), suffix));
    let p2 = dir.join(format!("r2.{}{}", format.extension(), suffix));
    let mut reads = BeadReads::new(7, 60);
    if gzip {
        let mut w1 = GzEncoder::new(File::create(&p1)?, Compression::default());
        let mut w2 = GzEncoder::new(File::create(&p2)?, Compression::default());
        reads.write(&mut w1, &mut w2, groups, format)?;
        w1.finish()?;
        w2.finish()?;
    } else {
        let mut w1 = File::create(&p1)?;
        let mut w2 = File::create(&p2)?;
        reads.write(&mut w1, &mut w2, groups, format)?;
    }
    Ok((p1, p2))
}

/// Writes a bead index of `(bead_id, barcode, read_count)` rows.
pub fn write_index(dir: &Path, rows: &[(u32, &str, usize)]) -> io::Result<PathBuf> {
    let path = dir.join("beads.tsv");
    let mut out = File::create(&path)?;
    for (bead_id, barcode, count) in rows {
        writeln!(out, "{}\t{}\t{}", bead_id, barcode, count)?;
    }
    Ok(path)
}

/// A shell script standing in for the assembler. It records each shard it
/// starts under `started/`, exits 2 for the shard named in its first argument,
/// and otherwise sleeps for its second argument in seconds before writing the
/// four result files, tagging every row with the shard id and pair count.
pub fn write_fake_assembler(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join("fake_assembler.sh");
    std::fs::write(
        &path,
        r#"fail="$1"; delay="$2"; shift 2
while [ $# -gt 0 ]; do
  case "$1" in
    --shard) shard="$2"; shift 2 ;;
    --output-dir) out="$2"; shift 2 ;;
    --read1) r1="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$(dirname "$0")/started"
touch "$(dirname "$0")/started/$shard"
if [ "$shard" = "$fail" ]; then
  echo "assembly failed for $shard" >&2
  exit 2
fi
sleep "$delay"
lines=$(wc -l < "$r1")
case "$r1" in
  *.fq) n=$((lines / 4)) ;;
  *) n=$((lines / 2)) ;;
esac
mkdir -p "$out"
printf '%s\t%s\n' "$shard" "$n" > "$out/BI.contig.tsv"
printf '>%s_contig\nACGTACGT\n' "$shard" > "$out/BI.contig.fasta"
printf '>%s_clip\nACGT\n' "$shard" > "$out/BI.clip.all.fasta"
printf '%s\tclip\t%s\n' "$shard" "$n" > "$out/BI.clip.metadata.tsv"
"#,
    )?;
    Ok(path)
}

pub struct Fixture {
    pub r1: PathBuf,
    pub r2: PathBuf,
    pub index: PathBuf,
    pub out_dir: PathBuf,
    pub scratch_root: PathBuf,
    pub script: PathBuf,
}

impl Fixture {
    pub fn new(dir: &Path, groups: &[(&str, usize)], index: &[(u32, &str, usize)]) -> io::Result<Self> {
        Self::with_format(dir, groups, index, RecordFormat::Fastq, false)
    }

    pub fn with_format(
        dir: &Path,
        groups: &[(&str, usize)],
        index: &[(u32, &str, usize)],
        format: RecordFormat,
        gzip: bool,
    ) -> io::Result<Self> {
        let (r1, r2) = write_reads(dir, groups, format, gzip)?;
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&out_dir)?;
        Ok(Fixture {
            r1,
            r2,
            index: write_index(dir, index)?,
            out_dir,
            scratch_root: dir.join("scratch").join(SCRATCH_DIR_NAME),
            script: write_fake_assembler(dir)?,
        })
    }

    /// RunConfig running the fake assembler; `fail_shard` names the shard
    /// whose task exits non-zero.
    pub fn config(&self, workers: usize, format: RecordFormat, fail_shard: &str) -> RunConfig {
        self.config_with_delay(workers, format, fail_shard, 0)
    }

    /// As `config`, but every shard that succeeds takes `delay_secs` seconds.
    pub fn config_with_delay(&self, workers: usize, format: RecordFormat, fail_shard: &str, delay_secs: u64) -> RunConfig {
        let args = Arguments {
            file1: self.r1.to_string_lossy().to_string(),
            file2: self.r2.to_string_lossy().to_string(),
            out_dir: self.out_dir.to_string_lossy().to_string(),
            index: self.index.to_string_lossy().to_string(),
            verbose: false,
            threads: workers,
            format,
            mode: "megahit".to_string(),
            cpu: 1,
            mem: 1_000_000,
            min_contig_len: 500,
            assembler: "sh".to_string(),
            assembler_args: vec![
                self.script.to_string_lossy().to_string(),
                fail_shard.to_string(),
                delay_secs.to_string(),
            ],
            scratch_dir: None,
            keep_scratch: false,
        };
        RunConfig {
            cwd: std::env::current_dir().unwrap(),
            scratch_root: self.scratch_root.clone(),
            out_dir: self.out_dir.clone(),
            workers,
            args,
        }
    }

    /// True if the assembler was ever started for `shard_id`.
    pub fn started(&self, shard_id: &str) -> bool {
        self.script.with_file_name("started").join(shard_id).exists()
    }

    pub fn summary(&self, suffix: &str) -> String {
        std::fs::read_to_string(self.out_dir.join(format!("summary.BI.megahit.{}", suffix))).unwrap()
    }

    /// Rows of the aggregated contig table, sorted.
    pub fn contig_rows(&self) -> Vec<String> {
        let mut rows: Vec<String> = self.summary("contig.tsv").lines().map(str::to_string).collect();
        rows.sort();
        rows
    }
}
