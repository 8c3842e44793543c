//! Byte-offset table for the kernel structures the probe reads.
//!
//! The probe carries no compiled-in offsets. The loader resolves this table
//! against the running kernel's BTF and patches it into the probe's rodata
//! before load, so one probe binary works across kernel builds with
//! differing structure layouts.

/// Sentinel for a field the running kernel's layout does not carry.
/// Reads through an unresolved offset yield zero.
pub const UNRESOLVED: u32 = u32::MAX;

/// `mm_rss_stat.count[]` indexes for the resident-set categories.
pub const MM_FILEPAGES: u32 = 0;
pub const MM_ANONPAGES: u32 = 1;
pub const MM_SHMEMPAGES: u32 = 3;

/// Stride of one `atomic_long_t` element in `mm_rss_stat.count[]`.
pub const RSS_COUNTER_STRIDE: u32 = 8;

/// Resolved field offsets, one per read the extraction performs.
///
/// Nested offsets (e.g. `pacct.ac_exitcode` inside `signal_struct`) are
/// pre-combined by the resolver; `io_*` offsets are relative to a
/// `task_io_accounting` base and apply to both the per-task and the
/// thread-group copy.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskLayout {
    // task_struct
    pub task_real_parent: u32,
    pub task_tgid: u32,
    pub task_group_leader: u32,
    pub task_start_time: u32,
    pub task_signal: u32,
    pub task_prio: u32,
    pub task_static_prio: u32,
    pub task_delays: u32,
    pub task_mm: u32,
    pub task_ioac: u32,
    // signal_struct (pacct_* pre-combined through the embedded pacct_struct)
    pub signal_nr_threads: u32,
    pub signal_pacct_exitcode: u32,
    pub signal_pacct_utime: u32,
    pub signal_pacct_stime: u32,
    pub signal_pacct_minflt: u32,
    pub signal_pacct_majflt: u32,
    pub signal_ioac: u32,
    // task_delay_info
    pub delays_blkio_delay: u32,
    pub delays_swapin_delay: u32,
    // mm_struct (rss offsets pre-combined through rss_stat.count[i].counter)
    pub mm_total_vm: u32,
    pub mm_rss_file: u32,
    pub mm_rss_anon: u32,
    pub mm_rss_shmem: u32,
    // task_io_accounting, relative to the embedding structure's ioac member
    pub io_rchar: u32,
    pub io_wchar: u32,
    pub io_syscr: u32,
    pub io_syscw: u32,
    pub io_read_bytes: u32,
    pub io_write_bytes: u32,
    pub io_cancelled_write_bytes: u32,
}

impl TaskLayout {
    /// Layout with every offset unresolved; the probe's compiled-in default.
    /// A loader that skips patching gets all-zero records, not garbage.
    pub const fn unresolved() -> Self {
        Self {
            task_real_parent: UNRESOLVED,
            task_tgid: UNRESOLVED,
            task_group_leader: UNRESOLVED,
            task_start_time: UNRESOLVED,
            task_signal: UNRESOLVED,
            task_prio: UNRESOLVED,
            task_static_prio: UNRESOLVED,
            task_delays: UNRESOLVED,
            task_mm: UNRESOLVED,
            task_ioac: UNRESOLVED,
            signal_nr_threads: UNRESOLVED,
            signal_pacct_exitcode: UNRESOLVED,
            signal_pacct_utime: UNRESOLVED,
            signal_pacct_stime: UNRESOLVED,
            signal_pacct_minflt: UNRESOLVED,
            signal_pacct_majflt: UNRESOLVED,
            signal_ioac: UNRESOLVED,
            delays_blkio_delay: UNRESOLVED,
            delays_swapin_delay: UNRESOLVED,
            mm_total_vm: UNRESOLVED,
            mm_rss_file: UNRESOLVED,
            mm_rss_anon: UNRESOLVED,
            mm_rss_shmem: UNRESOLVED,
            io_rchar: UNRESOLVED,
            io_wchar: UNRESOLVED,
            io_syscr: UNRESOLVED,
            io_syscw: UNRESOLVED,
            io_read_bytes: UNRESOLVED,
            io_write_bytes: UNRESOLVED,
            io_cancelled_write_bytes: UNRESOLVED,
        }
    }
}

/// Combine a base offset with a relative one, propagating the unresolved
/// sentinel from either side.
pub const fn combine(base: u32, relative: u32) -> u32 {
    if base == UNRESOLVED || relative == UNRESOLVED {
        UNRESOLVED
    } else {
        base + relative
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for TaskLayout {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_propagates_sentinel() {
        assert_eq!(combine(64, 8), 72);
        assert_eq!(combine(UNRESOLVED, 8), UNRESOLVED);
        assert_eq!(combine(64, UNRESOLVED), UNRESOLVED);
    }

    #[test]
    fn layout_is_padding_free() {
        // 30 offsets, nothing else; required for patching it as raw bytes.
        assert_eq!(core::mem::size_of::<TaskLayout>(), 30 * 4);
    }
}
