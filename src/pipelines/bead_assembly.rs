use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::defs::{PipelineError, RunConfig, SHARD_CHANNEL_CAPACITY};
use crate::utils::aggregate::{AggregationStats, ResultAggregator};
use crate::utils::command::AssemblerCommand;
use crate::utils::fastx::PairedReader;
use crate::utils::file::{absolute_path, sweep_scratch};
use crate::utils::index::BarcodeIndex;
use crate::utils::partition::{PartitionStats, Partitioner};
use crate::utils::scheduler::{SchedulerStats, TaskScheduler};
use crate::utils::shard::{ResourceLimits, ShardMaterializer, TaskInvocation};


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub partition: PartitionStats,
    pub scheduler: SchedulerStats,
    pub aggregation: AggregationStats,
    pub leftover_dirs: usize,
}


/// Reads both mate files, cuts them into shards and writes each shard to
/// scratch on a blocking thread. Each invocation is sent only after its files
/// are complete. Stops early when the receiving side goes away.
fn spawn_shard_producer(
    config: Arc<RunConfig>,
    index: Arc<BarcodeIndex>,
    tx: mpsc::Sender<TaskInvocation>,
) -> JoinHandle<Result<PartitionStats, PipelineError>> {
    task::spawn_blocking(move || {
        let args = &config.args;
        let r1 = absolute_path(Path::new(&args.file1), &config.cwd);
        let r2 = absolute_path(Path::new(&args.file2), &config.cwd);
        let reader = PairedReader::open(&r1, &r2, args.format)?;
        let materializer = ShardMaterializer::new(
            config.scratch_root.clone(),
            args.format,
            ResourceLimits {
                cpus: args.cpu,
                memory_bytes: args.mem,
                mode: args.mode.clone(),
                min_contig_len: args.min_contig_len,
            },
        );

        let mut partitioner = Partitioner::new(reader, index);
        while let Some(shard) = partitioner.next_shard()? {
            let invocation = materializer.materialize(&shard)?;
            if tx.blocking_send(invocation).is_err() {
                debug!("Scheduler closed; no further shards will be produced");
                break;
            }
        }
        Ok(partitioner.stats())
    })
}


/// Runs one assembly per bead and merges the results.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// RunSummary of the partitioning, scheduling and aggregation, or the first
/// fatal error: an unsorted input, a failed assembly task, or setup I/O.
pub async fn run(config: Arc<RunConfig>) -> Result<RunSummary, PipelineError> {
    let args = &config.args;

    let index_path = absolute_path(Path::new(&args.index), &config.cwd);
    let index = Arc::new(BarcodeIndex::load(&index_path).await?);
    if index.is_empty() {
        warn!("Index {} lists no beads; every read pair will be skipped", index_path.display());
    }

    tokio::fs::create_dir_all(&config.scratch_root)
        .await
        .map_err(|e| PipelineError::io(&config.scratch_root, e))?;
    info!("Scratch directory: {}", config.scratch_root.display());

    let aggregator = Arc::new(ResultAggregator::create(&config.out_dir, &args.mode).await?);
    for (_, path) in aggregator.paths() {
        debug!("Summary output: {}", path.display());
    }
    let runner = Arc::new(AssemblerCommand::new(args.assembler.clone(), args.assembler_args.clone()));
    let mut scheduler = TaskScheduler::new(config.workers, runner, aggregator.clone())?;
    info!(
        "Running up to {} assembly tasks ({} outstanding) with {} in {} mode",
        config.workers,
        scheduler.capacity(),
        args.assembler,
        args.mode
    );

    let (tx, rx) = mpsc::channel(SHARD_CHANNEL_CAPACITY);
    let producer = spawn_shard_producer(config.clone(), index, tx);
    let mut shards = ReceiverStream::new(rx);

    // Finished tasks are settled while waiting on the producer too, so a
    // failure stops the run even when no shard is ready to submit.
    let mut submitted = Ok(());
    loop {
        tokio::select! {
            next = shards.next() => match next {
                Some(invocation) => {
                    if let Err(e) = scheduler.submit(invocation).await {
                        submitted = Err(e);
                        break;
                    }
                }
                None => break,
            },
            Some(finished) = scheduler.wait_finished(), if scheduler.has_outstanding() => {
                if let Err(e) = scheduler.settle(finished).await {
                    submitted = Err(e);
                    break;
                }
            }
        }
    }
    drop(shards);

    let produced = match producer.await {
        Ok(result) => result,
        Err(e) => Err(PipelineError::Join(e.to_string())),
    };

    let (partition, scheduler_stats) = match (submitted, produced) {
        (Err(e), _) => return Err(e),
        (Ok(()), Err(e)) => {
            let stats = scheduler.abort().await;
            error!("Input stopped after {} submitted shards: {}", stats.submitted, e);
            return Err(e);
        }
        (Ok(()), Ok(partition)) => (partition, scheduler.finish().await?),
    };

    let aggregation = aggregator.close().await?;

    let leftover_dirs = if args.keep_scratch {
        info!("Keeping scratch directory {}", config.scratch_root.display());
        0
    } else {
        let root = config.scratch_root.clone();
        task::spawn_blocking(move || sweep_scratch(&root))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
            .map_err(|e| PipelineError::io(&config.scratch_root, e))?
    };

    let summary = RunSummary { partition, scheduler: scheduler_stats, aggregation, leftover_dirs };
    log_summary(&summary);
    Ok(summary)
}


fn log_summary(summary: &RunSummary) {
    let p = &summary.partition;
    info!(
        "Read {} pairs into {} shards ({} short, {} pairs skipped, {} surplus pairs dropped)",
        p.pairs_read, p.shards, p.short_shards, p.skipped_pairs, p.surplus_pairs
    );
    let s = &summary.scheduler;
    info!(
        "Assembly tasks: {} submitted, {} succeeded, peak {} outstanding",
        s.submitted, s.succeeded, s.peak_outstanding
    );
    let a = &summary.aggregation;
    info!(
        "Collected {} shards ({} result files unreadable, {} shards without output)",
        a.collected, a.failed_files, a.missing_dirs
    );
    if summary.leftover_dirs > 0 {
        warn!("Swept {} leftover shard directories from scratch", summary.leftover_dirs);
    }
}
