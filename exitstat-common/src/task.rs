//! Resolved-field access capability over the exiting task.
//!
//! The extraction logic never touches kernel memory directly; it goes
//! through [`TaskView`], whose in-kernel implementation reads through the
//! patched [`crate::TaskLayout`] offsets and whose test implementations read
//! synthetic layouts. Every accessor is total: a field the kernel cannot
//! provide reads as zero (or `None` for a whole missing substructure).

use crate::event::TASK_COMM_LEN;

/// One `task_io_accounting` worth of counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub cancelled_write_bytes: u64,
}

impl IoCounters {
    /// Dual-source summation: per-task accounting resets across thread
    /// lifetimes while the thread-group copy accumulates at process level,
    /// so both must be added or the totals undercount.
    pub fn combined(task: Self, group: Self) -> Self {
        Self {
            rchar: task.rchar.wrapping_add(group.rchar),
            wchar: task.wchar.wrapping_add(group.wchar),
            syscr: task.syscr.wrapping_add(group.syscr),
            syscw: task.syscw.wrapping_add(group.syscw),
            read_bytes: task.read_bytes.wrapping_add(group.read_bytes),
            write_bytes: task.write_bytes.wrapping_add(group.write_bytes),
            cancelled_write_bytes: task
                .cancelled_write_bytes
                .wrapping_add(group.cancelled_write_bytes),
        }
    }
}

/// Per-category memory counters from the task's memory descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MmCounters {
    pub total_vm: u64,
    pub file_pages: u64,
    pub anon_pages: u64,
    pub shmem_pages: u64,
}

/// Read access to the currently exiting task's control structures.
pub trait TaskView {
    /// Combined tgid/pid word; the process id is the high 32 bits.
    fn pid_tgid(&self) -> u64;
    /// Executable short name, truncated and zero-padded.
    fn comm(&self) -> [u8; TASK_COMM_LEN];
    /// Thread-group id of the parent process.
    fn parent_tgid(&self) -> i32;
    /// Raw combined status+signal word from process accounting.
    fn raw_exit_code(&self) -> u32;
    /// Accumulated user CPU time, nanosecond ticks.
    fn acct_utime_ns(&self) -> u64;
    /// Accumulated system CPU time, nanosecond ticks.
    fn acct_stime_ns(&self) -> u64;
    fn acct_min_flt(&self) -> u64;
    fn acct_maj_flt(&self) -> u64;
    /// Thread-group leader's start timestamp, nanoseconds since boot.
    fn leader_start_time_ns(&self) -> u64;
    fn num_threads(&self) -> i32;
    /// Raw scheduling priority (kernel range, not user-visible).
    fn prio(&self) -> u64;
    /// Raw static priority the nice value derives from.
    fn static_prio(&self) -> u64;
    fn blkio_delay_ns(&self) -> u64;
    fn swapin_delay_ns(&self) -> u64;
    /// `None` when the task has no memory descriptor (kernel threads,
    /// zombies past mm teardown).
    fn mm_counters(&self) -> Option<MmCounters>;
    /// Per-task I/O accounting.
    fn io_task(&self) -> IoCounters;
    /// Thread-group-shared I/O accounting.
    fn io_group(&self) -> IoCounters;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_adds_each_counter() {
        let task = IoCounters {
            rchar: 1,
            wchar: 2,
            syscr: 3,
            syscw: 4,
            read_bytes: 5,
            write_bytes: 6,
            cancelled_write_bytes: 7,
        };
        let group = IoCounters {
            rchar: 10,
            wchar: 20,
            syscr: 30,
            syscw: 40,
            read_bytes: 50,
            write_bytes: 60,
            cancelled_write_bytes: 70,
        };
        let sum = IoCounters::combined(task, group);
        assert_eq!(
            sum,
            IoCounters {
                rchar: 11,
                wchar: 22,
                syscr: 33,
                syscw: 44,
                read_bytes: 55,
                write_bytes: 66,
                cancelled_write_bytes: 77,
            }
        );
    }
}
