use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Samples the resident memory of this process plus its direct children
/// (local Chrome instances) against a threshold.
pub struct MemoryGuard {
    threshold_mb: u64,
    pid: Pid,
    system: Mutex<System>,
}

impl MemoryGuard {
    /// A threshold of 0 disables the guard.
    pub fn new(threshold_mb: u64) -> Self {
        Self {
            threshold_mb,
            pid: Pid::from_u32(std::process::id()),
            system: Mutex::new(System::new()),
        }
    }

    pub fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    pub fn resident_mb(&self) -> u64 {
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes(ProcessesToUpdate::All);

        let own = sys.process(self.pid).map_or(0, |p| p.memory());
        let children: u64 = sys
            .processes()
            .values()
            .filter(|p| p.parent() == Some(self.pid))
            .map(|p| p.memory())
            .sum();
        (own + children) / BYTES_PER_MB
    }

    /// Current usage if it exceeds the threshold.
    pub fn check(&self) -> Option<u64> {
        if self.threshold_mb == 0 {
            return None;
        }
        let used = self.resident_mb();
        debug!(used_mb = used, threshold_mb = self.threshold_mb, "memory: sampled");
        (used > self.threshold_mb).then_some(used)
    }
}
