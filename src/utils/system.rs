// src/utils/system.rs: System probing

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines number of physical cores and the current cpu load.
///
/// # Returns
///
/// Result<(usize, f32)> physical cores, current cpu usage
pub async fn detect_cores_and_load() -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    sleep(Duration::from_millis(100)).await;
    let cpu_load = system.global_cpu_usage();
    Ok((physical_cores, cpu_load))
}


/// Finds the amount of total and available RAM, keyed to OS
///
/// # Returns
///
/// Result<(u64, u64)> total ram, available ram
pub fn detect_ram() -> Result<(u64, u64)> {
    let (total_ram, available_ram) = if cfg!(target_os = "macos") {
        let refresh_kind = RefreshKind::nothing().with_memory(Default::default());
        let mut system = System::new_with_specifics(refresh_kind);
        system.refresh_memory_specifics(MemoryRefreshKind::everything());
        let total = system.total_memory();
        let used = system.used_memory();
        (total, total.saturating_sub(used))
    } else {
        let mut system = System::new_all();
        system.refresh_memory();
        (system.total_memory(), system.available_memory())
    };

    if total_ram == 0 || available_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }

    Ok((total_ram, available_ram))
}


/// Worst-case demand of a run: every worker busy at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDemand {
    pub workers: usize,
    pub cpus_per_task: usize,
    pub memory_per_task: u64,
}

/// Compares a run's demand against the host and returns one message per
/// oversubscribed resource. Oversubscription is allowed, only reported.
pub fn oversubscription(demand: ResourceDemand, physical_cores: usize, available_ram: u64) -> Vec<String> {
    let mut messages = Vec::new();
    let cpus = demand.workers.saturating_mul(demand.cpus_per_task);
    if cpus > physical_cores {
        messages.push(format!(
            "{} workers x {} cpus = {} cpus requested, {} physical cores available",
            demand.workers, demand.cpus_per_task, cpus, physical_cores
        ));
    }
    let memory = (demand.workers as u64).saturating_mul(demand.memory_per_task);
    if memory > available_ram {
        messages.push(format!(
            "{} workers x {} GiB = {} GiB requested, {} GiB RAM available",
            demand.workers,
            demand.memory_per_task / 1_073_741_824,
            memory / 1_073_741_824,
            available_ram / 1_073_741_824
        ));
    }
    messages
}


/// Logs the host resources and warns if the run could oversubscribe them.
pub async fn check_resources(demand: ResourceDemand) -> Result<()> {
    let (cores, cpu_load) = detect_cores_and_load().await?;
    let (total_ram, available_ram) = detect_ram()?;
    info!(
        "Host: {} physical cores ({:.1}% load), {} GiB RAM ({} GiB available)",
        cores,
        cpu_load,
        total_ram / 1_073_741_824,
        available_ram / 1_073_741_824
    );
    for message in oversubscription(demand, cores, available_ram) {
        warn!("Oversubscribed: {}", message);
    }
    Ok(())
}


/// Searches for a directory for RAM temp files.
/// Prefers /dev/shm (RAM disk) for linux, otherwise returns the standard temp dir.
///
/// # Returns
/// PathBuf: temp dir for RAM files.
pub fn get_ram_temp_dir() -> PathBuf {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        if let Ok(metadata) = fs::metadata("/dev/shm") {
            if metadata.is_dir() {
                return PathBuf::from("/dev/shm");
            }
        }
        std::env::temp_dir()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        std::env::temp_dir()
    }
}
