use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::defs::{PipelineError, RecordFormat, READ1_STEM, READ2_STEM};
use crate::utils::fastx::{write_record, Barcode, ReadPair, SeqRecord};
use crate::utils::partition::Shard;


/// Limits handed to every assembly task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpus: usize,
    pub memory_bytes: u64,
    pub mode: String,
    pub min_contig_len: usize,
}

/// Everything a worker needs to run one shard. The files under `input_dir`
/// are complete by the time one of these exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
    pub shard_id: String,
    pub barcode: Barcode,
    pub pairs: usize,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub read1: PathBuf,
    pub read2: PathBuf,
    pub limits: ResourceLimits,
}


pub struct ShardMaterializer {
    scratch_root: PathBuf,
    format: RecordFormat,
    limits: ResourceLimits,
}

impl ShardMaterializer {
    pub fn new(scratch_root: PathBuf, format: RecordFormat, limits: ResourceLimits) -> Self {
        ShardMaterializer { scratch_root, format, limits }
    }

    /// Writes both mate files for a shard into its own scratch directory.
    ///
    /// # Arguments
    ///
    /// * `shard` - Closed shard from the partitioner.
    ///
    /// # Returns
    /// TaskInvocation pointing at the written files. The assembler's output
    /// directory (`<input_dir>/<mode>`) is not created here.
    pub fn materialize(&self, shard: &Shard) -> Result<TaskInvocation, PipelineError> {
        let shard_id = shard.shard_id();
        let input_dir = self.scratch_root.join(&shard_id);
        if input_dir.exists() {
            warn!("Replacing stale scratch directory {}", input_dir.display());
            fs::remove_dir_all(&input_dir).map_err(|e| PipelineError::io(&input_dir, e))?;
        }
        fs::create_dir_all(&input_dir).map_err(|e| PipelineError::io(&input_dir, e))?;

        let ext = self.format.extension();
        let read1 = input_dir.join(format!("{}.{}", READ1_STEM, ext));
        let read2 = input_dir.join(format!("{}.{}", READ2_STEM, ext));
        self.write_mate(&read1, shard, |pair| &pair.r1)?;
        self.write_mate(&read2, shard, |pair| &pair.r2)?;
        debug!("Wrote {} read pairs for {} to {}", shard.pair_count(), shard_id, input_dir.display());

        Ok(TaskInvocation {
            output_dir: input_dir.join(&self.limits.mode),
            shard_id,
            barcode: shard.barcode().clone(),
            pairs: shard.pair_count(),
            input_dir,
            read1,
            read2,
            limits: self.limits.clone(),
        })
    }

    fn write_mate<F>(&self, path: &Path, shard: &Shard, mate: F) -> Result<(), PipelineError>
    where
        F: Fn(&ReadPair) -> &SeqRecord,
    {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for pair in &shard.pairs {
            write_record(&mut writer, mate(pair), self.format).map_err(|e| PipelineError::io(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }
}
