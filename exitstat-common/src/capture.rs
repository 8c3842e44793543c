//! Exit-event extraction and emission.
//!
//! `capture` is the whole hot path: a straight-line sequence of reads and
//! arithmetic with no loops, allocation or locks, so it stays provable for
//! the in-kernel verifier and reproducible on the host. It is total — it
//! never fails, and any field the view cannot provide lands as zero.

use crate::event::ExitEvent;
use crate::task::{IoCounters, TaskView};

/// Nanosecond ticks per centisecond; the unit every time-like field is
/// normalized to.
pub const NSEC_PER_CENTISEC: u64 = 10_000_000;

/// Offset between kernel priority and the user-visible range.
pub const MAX_RT_PRIO: u64 = 100;

const NICE_RANGE: i64 = 19 - (-20) + 1;

/// Static priority of nice 0: `100 + (19 - (-20) + 1) / 2`. The expression
/// is kept verbatim; the nice mapping is easy to get off by one.
pub const NICE_BASE: u64 = MAX_RT_PRIO + (NICE_RANGE / 2) as u64;

#[inline]
pub fn centiseconds(ns: u64) -> u64 {
    ns / NSEC_PER_CENTISEC
}

/// Conventional exit-status byte out of the combined status+signal word.
#[inline]
pub fn exit_status(raw: u32) -> u32 {
    (raw >> 8) & 0xff
}

/// Kernel priority shifted into the user-visible range. Wrapping keeps the
/// signed semantics of the u64 representation.
#[inline]
pub fn user_priority(prio: u64) -> u64 {
    prio.wrapping_sub(MAX_RT_PRIO)
}

/// Nice value (-20..19) derived from static priority.
#[inline]
pub fn user_nice(static_prio: u64) -> u64 {
    static_prio.wrapping_sub(NICE_BASE)
}

/// Build the complete exit record for the task behind `view`.
///
/// `now_ns` is the monotonic timestamp of the invocation, `cpu` the logical
/// CPU executing it. The record starts zeroed and is then populated field by
/// field; absent substructures leave their fields at zero.
pub fn capture<T: TaskView>(view: &T, now_ns: u64, cpu: u32) -> ExitEvent {
    let mut ev = ExitEvent::zeroed();

    // The accounting path runs on the thread-group leader, so the high half
    // of the pid/tgid word is the process id.
    ev.pid = (view.pid_tgid() >> 32) as i32;
    ev.ppid = view.parent_tgid();
    ev.exit_code = exit_status(view.raw_exit_code());
    ev.comm = view.comm();

    ev.utime = centiseconds(view.acct_utime_ns());
    ev.stime = centiseconds(view.acct_stime_ns());
    ev.start_time = centiseconds(view.leader_start_time_ns());
    ev.end_time = centiseconds(now_ns);

    ev.num_threads = view.num_threads();
    ev.on_cpu = cpu as u64;
    ev.priority = user_priority(view.prio());
    ev.nice = user_nice(view.static_prio());
    ev.delayacct_blkio_ticks =
        centiseconds(view.blkio_delay_ns().wrapping_add(view.swapin_delay_ns()));

    ev.min_flt = view.acct_min_flt();
    ev.maj_flt = view.acct_maj_flt();

    if let Some(mm) = view.mm_counters() {
        ev.vss_pages = mm.total_vm;
        ev.rss_pages = mm
            .file_pages
            .wrapping_add(mm.anon_pages)
            .wrapping_add(mm.shmem_pages);
    }

    let io = IoCounters::combined(view.io_task(), view.io_group());
    ev.rchar = io.rchar;
    ev.wchar = io.wchar;
    ev.syscr = io.syscr;
    ev.syscw = io.syscw;
    ev.io_read_bytes = io.read_bytes;
    ev.io_write_bytes = io.write_bytes;
    ev.cancelled_write_bytes = io.cancelled_write_bytes;

    ev
}

/// Raised by a sink whose buffer has no room for the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkFull;

/// Destination for finished records; one per-CPU ring in the kernel,
/// anything bounded in tests.
pub trait RecordSink {
    fn publish(&mut self, event: &ExitEvent) -> Result<(), SinkFull>;
}

/// Fire-and-forget emission. A full sink drops the record silently; the
/// producer sees no error and never retries.
#[inline]
pub fn emit<S: RecordSink>(sink: &mut S, event: &ExitEvent) {
    let _ = sink.publish(event);
}
