/// Kernel process name length, including the null terminator.
pub const TASK_COMM_LEN: usize = 16;

/// One process-exit accounting record.
///
/// Field order and widths are the wire contract between the probe and the
/// user-space reader; the reader decodes perf samples by reinterpreting the
/// raw bytes as this struct. Time-like fields are centiseconds, memory fields
/// are page counts, I/O fields are cumulative per-process totals.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ExitEvent {
    pub pid: i32,
    pub ppid: i32,
    /// Low byte of (raw accounting status >> 8).
    pub exit_code: u32,
    pub comm: [u8; TASK_COMM_LEN],
    pub utime: u64,
    pub stime: u64,
    /// Centiseconds since boot, comparable with `end_time`.
    pub start_time: u64,
    pub end_time: u64,
    pub num_threads: i32,
    pub on_cpu: u64,
    /// Signed semantics, stored as wrapped u64 like the kernel does.
    pub priority: u64,
    pub nice: u64,
    /// Block I/O delay plus swap-in delay, centiseconds.
    pub delayacct_blkio_ticks: u64,
    pub min_flt: u64,
    pub maj_flt: u64,
    /// Zero when the task has no memory descriptor.
    pub vss_pages: u64,
    /// file + anon + shmem resident counters, summed.
    pub rss_pages: u64,
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub cancelled_write_bytes: u64,
}

impl ExitEvent {
    /// All-zero record. Extraction starts from this so unreadable fields
    /// stay zero instead of carrying garbage.
    pub fn zeroed() -> Self {
        // Safe: every field is a plain integer or byte array.
        unsafe { core::mem::zeroed() }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ExitEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_size_is_pinned() {
        // 28 bytes of identity + 4 padding, 4 timestamps, num_threads + 4
        // padding, 15 trailing u64 counters.
        assert_eq!(core::mem::size_of::<ExitEvent>(), 192);
    }

    #[test]
    fn zeroed_is_fully_zero() {
        let ev = ExitEvent::zeroed();
        assert_eq!(ev.pid, 0);
        assert_eq!(ev.comm, [0u8; TASK_COMM_LEN]);
        assert_eq!(ev.cancelled_write_bytes, 0);
    }
}
