use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use env_logger::Builder;
use log::{LevelFilter, debug, error, info, warn};

use bead_asm::cli::{self, Arguments};
use bead_asm::config::defs::{RunConfig, SCRATCH_DIR_NAME};
use bead_asm::pipelines::bead_assembly;
use bead_asm::utils::command::find_program;
use bead_asm::utils::file::absolute_path;
use bead_asm::utils::system::{check_resources, get_ram_temp_dir, ResourceDemand};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = cli::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Bead Assembly\n-------------\n");

    let run_config = match setup(args).await {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Setup failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    };

    if let Err(e) = bead_assembly::run(run_config).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Validates arguments, resolves paths and probes the host.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
///
/// # Returns
/// RunConfig for the pipeline.
async fn setup(args: Arguments) -> Result<RunConfig> {
    if args.threads == 0 {
        return Err(anyhow!("--threads must be at least 1"));
    }
    if args.cpu == 0 {
        return Err(anyhow!("--cpu must be at least 1"));
    }

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    for input in [&args.file1, &args.file2, &args.index] {
        let path = absolute_path(Path::new(input), &dir);
        if !path.is_file() {
            return Err(anyhow!("Cannot find input file {}", path.display()));
        }
    }

    match find_program(&args.assembler) {
        Some(path) => debug!("Assembler: {}", path.display()),
        None => return Err(anyhow!("Assembler '{}' not found on PATH", args.assembler)),
    }

    let scratch_base = match &args.scratch_dir {
        Some(d) => absolute_path(Path::new(d), &dir),
        None => get_ram_temp_dir(),
    };
    let scratch_root = scratch_base.join(SCRATCH_DIR_NAME);
    info!("The scratch directory is {:?}", scratch_root);

    let demand = ResourceDemand {
        workers: args.threads,
        cpus_per_task: args.cpu,
        memory_per_task: args.mem,
    };
    if let Err(e) = check_resources(demand).await {
        warn!("Could not probe system resources: {}", e);
    }

    let out_dir = setup_output_dir(&args, &dir)?;

    Ok(RunConfig {
        cwd: dir,
        scratch_root,
        out_dir,
        workers: args.threads,
        args,
    })
}


/// Resolves the output directory against `cwd` and makes sure it exists.
fn setup_output_dir(args: &Arguments, cwd: &Path) -> Result<PathBuf> {
    let out_dir = absolute_path(Path::new(&args.out_dir), cwd);
    std::fs::create_dir_all(&out_dir)?;
    info!("The output directory is {:?}", out_dir);
    Ok(out_dir)
}
