use exitstat_common::{ExitEvent, TASK_COMM_LEN};
use serde::Serialize;

/// Decoded, owned form of a wire record, shaped like a procfs stat/io row
/// for the exited process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitSample {
    pub pid: i32,
    pub ppid: i32,
    pub exit_code: u32,
    pub comm: String,
    pub utime: u64,
    pub stime: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub num_threads: i32,
    pub on_cpu: u64,
    pub priority: i64,
    pub nice: i64,
    pub delayacct_blkio_ticks: u64,
    pub min_flt: u64,
    pub maj_flt: u64,
    pub vsize_bytes: u64,
    pub rss_pages: u64,
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub cancelled_write_bytes: u64,
}

impl ExitSample {
    /// `page_size` scales the virtual size from pages to bytes; priority
    /// and nice come back from their wrapped u64 wire form to signed.
    pub fn from_event(event: &ExitEvent, page_size: u64) -> Self {
        Self {
            pid: event.pid,
            ppid: event.ppid,
            exit_code: event.exit_code,
            comm: comm_str(&event.comm),
            utime: event.utime,
            stime: event.stime,
            start_time: event.start_time,
            end_time: event.end_time,
            num_threads: event.num_threads,
            on_cpu: event.on_cpu,
            priority: event.priority as i64,
            nice: event.nice as i64,
            delayacct_blkio_ticks: event.delayacct_blkio_ticks,
            min_flt: event.min_flt,
            maj_flt: event.maj_flt,
            vsize_bytes: event.vss_pages.wrapping_mul(page_size),
            rss_pages: event.rss_pages,
            rchar: event.rchar,
            wchar: event.wchar,
            syscr: event.syscr,
            syscw: event.syscw,
            io_read_bytes: event.io_read_bytes,
            io_write_bytes: event.io_write_bytes,
            cancelled_write_bytes: event.cancelled_write_bytes,
        }
    }
}

fn comm_str(comm: &[u8; TASK_COMM_LEN]) -> String {
    let end = comm.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
    String::from_utf8_lossy(&comm[..end]).into_owned()
}

pub fn page_size() -> u64 {
    // sysconf cannot fail for _SC_PAGESIZE on Linux.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}
