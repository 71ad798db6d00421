use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::config::defs::{PipelineError, ResultKind};
use crate::utils::scheduler::CompletionHandler;
use crate::utils::shard::TaskInvocation;


/// The four run-wide summary files, in `ResultKind::ALL` order.
struct AggregateOutputs {
    writers: Vec<BufWriter<File>>,
}

impl AggregateOutputs {
    async fn append(&mut self, slot: usize, contents: &[u8]) -> std::io::Result<()> {
        let writer = &mut self.writers[slot];
        writer.write_all(contents).await?;
        if contents.last().is_some_and(|b| *b != b'\n') {
            writer.write_all(b"\n").await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        for writer in self.writers.iter_mut() {
            writer.flush().await?;
        }
        Ok(())
    }
}


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregationStats {
    pub collected: u64,
    pub missing_dirs: u64,
    pub failed_files: u64,
}

/// Collects per-shard results into the summary files.
///
/// Writers sit behind one async mutex, so whole files from different shards
/// never interleave no matter how many completions race.
pub struct ResultAggregator {
    outputs: Mutex<AggregateOutputs>,
    paths: Vec<(ResultKind, PathBuf)>,
    collected: AtomicU64,
    missing_dirs: AtomicU64,
    failed_files: AtomicU64,
}

impl ResultAggregator {
    /// Creates (truncating) `summary.BI.<mode>.*` in `out_dir`.
    pub async fn create(out_dir: &Path, mode: &str) -> Result<Self, PipelineError> {
        let mut writers = Vec::with_capacity(ResultKind::ALL.len());
        let mut paths = Vec::with_capacity(ResultKind::ALL.len());
        for kind in ResultKind::ALL {
            let path = out_dir.join(kind.summary_file(mode));
            let file = File::create(&path).await.map_err(|e| PipelineError::io(&path, e))?;
            writers.push(BufWriter::new(file));
            paths.push((kind, path));
        }
        Ok(ResultAggregator {
            outputs: Mutex::new(AggregateOutputs { writers }),
            paths,
            collected: AtomicU64::new(0),
            missing_dirs: AtomicU64::new(0),
            failed_files: AtomicU64::new(0),
        })
    }

    pub fn paths(&self) -> &[(ResultKind, PathBuf)] {
        &self.paths
    }

    pub fn stats(&self) -> AggregationStats {
        AggregationStats {
            collected: self.collected.load(Ordering::Relaxed),
            missing_dirs: self.missing_dirs.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
        }
    }

    /// Appends one shard's result files, then deletes its scratch directory.
    ///
    /// A missing output directory is logged and the scratch directory is left
    /// in place. Unreadable result files are logged and skipped individually.
    pub async fn collect(&self, invocation: &TaskInvocation) {
        let output_dir = &invocation.output_dir;
        if !tokio::fs::try_exists(output_dir).await.unwrap_or(false) {
            warn!("No output directory {} for shard {}", output_dir.display(), invocation.shard_id);
            self.missing_dirs.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut contents = Vec::with_capacity(ResultKind::ALL.len());
        for kind in ResultKind::ALL {
            let path = output_dir.join(kind.shard_file());
            match tokio::fs::read(&path).await {
                Ok(bytes) => contents.push(Some(bytes)),
                Err(e) => {
                    error!("Collection result error, {}: {}", path.display(), e);
                    self.failed_files.fetch_add(1, Ordering::Relaxed);
                    contents.push(None);
                }
            }
        }

        {
            let mut outputs = self.outputs.lock().await;
            for (slot, bytes) in contents.iter().enumerate() {
                let Some(bytes) = bytes else { continue };
                if let Err(e) = outputs.append(slot, bytes).await {
                    error!("Failed to append {} results for {}: {}", self.paths[slot].1.display(), invocation.shard_id, e);
                    self.failed_files.fetch_add(1, Ordering::Relaxed);
                }
            }
            if let Err(e) = outputs.flush().await {
                error!("Failed to flush summary files after {}: {}", invocation.shard_id, e);
            }
        }
        self.collected.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = tokio::fs::remove_dir_all(&invocation.input_dir).await {
            warn!("Failed to remove scratch directory {}: {}", invocation.input_dir.display(), e);
        }
    }

    /// Flushes all summary files.
    pub async fn close(&self) -> Result<AggregationStats, PipelineError> {
        let mut outputs = self.outputs.lock().await;
        for (writer, (_, path)) in outputs.writers.iter_mut().zip(&self.paths) {
            writer.flush().await.map_err(|e| PipelineError::io(path, e))?;
        }
        Ok(self.stats())
    }
}

impl CompletionHandler for ResultAggregator {
    async fn on_success(&self, invocation: &TaskInvocation) {
        info!("Task complete: {} ({} read pairs)", invocation.shard_id, invocation.pairs);
        self.collect(invocation).await;
    }

    fn on_failure(&self, invocation: &TaskInvocation, error: &PipelineError) {
        error!("======== run error: shard {}: {}", invocation.shard_id, error);
    }
}
