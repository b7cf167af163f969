//! Best-effort resource snapshot for the liveness probe
//!
//! Collection must never fail the probe: anything that cannot be read is
//! simply left out.

use serde::Serialize;

/// Process memory usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    /// Resident set size in bytes
    pub rss_bytes: u64,
    /// Virtual memory size in bytes
    pub virtual_bytes: u64,
}

/// Read the current process memory usage, if the platform exposes it
#[cfg(target_os = "linux")]
pub fn memory_snapshot() -> Option<MemorySnapshot> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_proc_status(&status)
}

#[cfg(not(target_os = "linux"))]
pub fn memory_snapshot() -> Option<MemorySnapshot> {
    None
}

/// Extract VmRSS / VmSize (reported in kB) from `/proc/<pid>/status`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_status(status: &str) -> Option<MemorySnapshot> {
    let field = |name: &str| -> Option<u64> {
        let line = status.lines().find(|l| l.starts_with(name))?;
        let kb = line[name.len()..].split_whitespace().next()?;
        kb.parse::<u64>().ok().map(|v| v * 1024)
    };

    Some(MemorySnapshot {
        rss_bytes: field("VmRSS:")?,
        virtual_bytes: field("VmSize:")?,
    })
}
