//! Building and running the per-shard assembler command line.

use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tokio::process::Command;

use crate::config::defs::PipelineError;
use crate::utils::shard::TaskInvocation;

pub const TASK_LOG_FILE: &str = "task.log";
const LOG_TAIL_LINES: usize = 5;


/// Runs one materialized shard to completion.
///
/// Ok means the task finished cleanly and its output directory may be
/// collected. Dropping the returned future must stop the task.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(&self, invocation: &TaskInvocation) -> impl Future<Output = Result<(), PipelineError>> + Send;
}


/// Spawns an external assembler per shard.
#[derive(Debug, Clone)]
pub struct AssemblerCommand {
    program: String,
    leading_args: Vec<String>,
}

impl AssemblerCommand {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        AssemblerCommand { program: program.into(), leading_args }
    }
}

impl TaskRunner for AssemblerCommand {
    async fn run(&self, invocation: &TaskInvocation) -> Result<(), PipelineError> {
        let args = arg_generator(&self.leading_args, invocation);
        let log_path = invocation.input_dir.join(TASK_LOG_FILE);
        let log_file = std::fs::File::create(&log_path).map_err(|e| PipelineError::io(&log_path, e))?;
        let log_err = log_file.try_clone().map_err(|e| PipelineError::io(&log_path, e))?;

        info!("Shard {} ({} read pairs) started", invocation.shard_id, invocation.pairs);
        debug!("{} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&invocation.input_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::TaskSpawn {
                tool: self.program.clone(),
                shard: invocation.shard_id.clone(),
                error: e.to_string(),
            })?;

        let status = child.wait().await.map_err(|e| PipelineError::TaskSpawn {
            tool: self.program.clone(),
            shard: invocation.shard_id.clone(),
            error: e.to_string(),
        })?;

        if status.success() {
            return Ok(());
        }
        let exit = match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let tail = log_tail(&log_path, LOG_TAIL_LINES).await;
        Err(PipelineError::TaskFailed {
            shard: invocation.shard_id.clone(),
            status: format!("{} (log: {}){}", exit, log_path.display(), tail),
        })
    }
}


/// Command-line arguments for one assembler run.
///
/// # Arguments
///
/// * `leading_args` - User supplied arguments placed before the generated ones.
/// * `invocation` - Materialized shard.
///
/// # Returns
/// Vec<String> of arguments, program name excluded.
pub fn arg_generator(leading_args: &[String], invocation: &TaskInvocation) -> Vec<String> {
    let mut args_vec: Vec<String> = leading_args.to_vec();
    let limits = &invocation.limits;
    args_vec.push("--mode".to_string());
    args_vec.push(limits.mode.clone());
    args_vec.push("--shard".to_string());
    args_vec.push(invocation.shard_id.clone());
    args_vec.push("--barcode".to_string());
    args_vec.push(invocation.barcode.to_string());
    args_vec.push("--input-dir".to_string());
    args_vec.push(invocation.input_dir.to_string_lossy().to_string());
    args_vec.push("--output-dir".to_string());
    args_vec.push(invocation.output_dir.to_string_lossy().to_string());
    args_vec.push("--read1".to_string());
    args_vec.push(invocation.read1.to_string_lossy().to_string());
    args_vec.push("--read2".to_string());
    args_vec.push(invocation.read2.to_string_lossy().to_string());
    args_vec.push("--cpus".to_string());
    args_vec.push(limits.cpus.to_string());
    args_vec.push("--memory".to_string());
    args_vec.push(limits.memory_bytes.to_string());
    args_vec.push("--min-contig-len".to_string());
    args_vec.push(limits.min_contig_len.to_string());
    args_vec
}


/// Resolves a program the way the shell would: paths are checked directly,
/// bare names are searched on PATH.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}


async fn log_tail(path: &Path, n: usize) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(n);
            if lines.is_empty() {
                String::new()
            } else {
                format!("\n{}", lines[start..].join("\n"))
            }
        }
        Err(_) => String::new(),
    }
}
