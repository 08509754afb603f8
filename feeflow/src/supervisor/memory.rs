//! Resident memory sampling.

/// Reports the resident memory of a running child.
///
/// Children are spawned as process-group leaders, so `pid` is also the
/// group id. `None` means the sample could not be taken (the process
/// already exited, or the platform has no probe).
#[cfg_attr(test, mockall::automock)]
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes of the group led by `pid`.
    fn resident_bytes(&self, pid: u32) -> Option<u64>;
}

/// Reads RSS from `/proc`, summed over the child's process group.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsProbe;

#[cfg(target_os = "linux")]
impl MemoryProbe for ProcfsProbe {
    fn resident_bytes(&self, pid: u32) -> Option<u64> {
        let leader = i32::try_from(pid).ok()?;
        let page_size = procfs::page_size();

        // The leader must still be readable; a vanished leader is no sample.
        let leader_stat = procfs::process::Process::new(leader).ok()?.stat().ok()?;
        let mut total = leader_stat.rss * page_size;

        if let Ok(all) = procfs::process::all_processes() {
            for stat in all.flatten().filter_map(|p| p.stat().ok()) {
                if stat.pgrp == leader && stat.pid != leader {
                    total += stat.rss * page_size;
                }
            }
        }

        Some(total)
    }
}

/// Never produces a sample. Memory ceilings are not enforced with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl MemoryProbe for NullProbe {
    fn resident_bytes(&self, _pid: u32) -> Option<u64> {
        None
    }
}

/// The best probe available on this platform.
#[must_use]
pub fn default_probe() -> std::sync::Arc<dyn MemoryProbe> {
    #[cfg(target_os = "linux")]
    {
        std::sync::Arc::new(ProcfsProbe)
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("No memory probe on this platform; memory limits will not be enforced");
        std::sync::Arc::new(NullProbe)
    }
}
