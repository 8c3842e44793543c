//! Extraction properties checked against synthetic kernel layouts: the same
//! logical task must produce byte-identical records regardless of where the
//! fields sit, and concurrent captures must not observe each other.

use exitstat_common::{
    capture, combine, ExitEvent, IoCounters, MmCounters, TaskLayout, TaskView, TASK_COMM_LEN,
    UNRESOLVED,
};

/// Flat memory standing in for kernel structures. "Pointers" are u64
/// indexes into the buffer; index 0 plays the null pointer.
struct SyntheticKernel {
    mem: Vec<u8>,
    layout: TaskLayout,
    task: u64,
    pid_tgid: u64,
    comm: [u8; TASK_COMM_LEN],
}

impl SyntheticKernel {
    fn read_u64(&self, base: u64, offset: u32) -> u64 {
        if base == 0 || offset == UNRESOLVED {
            return 0;
        }
        let at = base as usize + offset as usize;
        u64::from_le_bytes(self.mem[at..at + 8].try_into().unwrap())
    }

    fn read_u32(&self, base: u64, offset: u32) -> u32 {
        if base == 0 || offset == UNRESOLVED {
            return 0;
        }
        let at = base as usize + offset as usize;
        u32::from_le_bytes(self.mem[at..at + 4].try_into().unwrap())
    }

    fn read_ptr(&self, base: u64, offset: u32) -> u64 {
        self.read_u64(base, offset)
    }

    fn signal(&self) -> u64 {
        self.read_ptr(self.task, self.layout.task_signal)
    }

    fn io_at(&self, base: u64, ioac: u32) -> IoCounters {
        let l = &self.layout;
        IoCounters {
            rchar: self.read_u64(base, combine(ioac, l.io_rchar)),
            wchar: self.read_u64(base, combine(ioac, l.io_wchar)),
            syscr: self.read_u64(base, combine(ioac, l.io_syscr)),
            syscw: self.read_u64(base, combine(ioac, l.io_syscw)),
            read_bytes: self.read_u64(base, combine(ioac, l.io_read_bytes)),
            write_bytes: self.read_u64(base, combine(ioac, l.io_write_bytes)),
            cancelled_write_bytes: self.read_u64(base, combine(ioac, l.io_cancelled_write_bytes)),
        }
    }
}

impl TaskView for SyntheticKernel {
    fn pid_tgid(&self) -> u64 {
        self.pid_tgid
    }
    fn comm(&self) -> [u8; TASK_COMM_LEN] {
        self.comm
    }
    fn parent_tgid(&self) -> i32 {
        let parent = self.read_ptr(self.task, self.layout.task_real_parent);
        self.read_u32(parent, self.layout.task_tgid) as i32
    }
    fn raw_exit_code(&self) -> u32 {
        self.read_u32(self.signal(), self.layout.signal_pacct_exitcode)
    }
    fn acct_utime_ns(&self) -> u64 {
        self.read_u64(self.signal(), self.layout.signal_pacct_utime)
    }
    fn acct_stime_ns(&self) -> u64 {
        self.read_u64(self.signal(), self.layout.signal_pacct_stime)
    }
    fn acct_min_flt(&self) -> u64 {
        self.read_u64(self.signal(), self.layout.signal_pacct_minflt)
    }
    fn acct_maj_flt(&self) -> u64 {
        self.read_u64(self.signal(), self.layout.signal_pacct_majflt)
    }
    fn leader_start_time_ns(&self) -> u64 {
        let leader = self.read_ptr(self.task, self.layout.task_group_leader);
        self.read_u64(leader, self.layout.task_start_time)
    }
    fn num_threads(&self) -> i32 {
        self.read_u32(self.signal(), self.layout.signal_nr_threads) as i32
    }
    fn prio(&self) -> u64 {
        self.read_u32(self.task, self.layout.task_prio) as u64
    }
    fn static_prio(&self) -> u64 {
        self.read_u32(self.task, self.layout.task_static_prio) as u64
    }
    fn blkio_delay_ns(&self) -> u64 {
        let delays = self.read_ptr(self.task, self.layout.task_delays);
        self.read_u64(delays, self.layout.delays_blkio_delay)
    }
    fn swapin_delay_ns(&self) -> u64 {
        let delays = self.read_ptr(self.task, self.layout.task_delays);
        self.read_u64(delays, self.layout.delays_swapin_delay)
    }
    fn mm_counters(&self) -> Option<MmCounters> {
        let mm = self.read_ptr(self.task, self.layout.task_mm);
        if mm == 0 {
            return None;
        }
        let l = &self.layout;
        Some(MmCounters {
            total_vm: self.read_u64(mm, l.mm_total_vm),
            file_pages: self.read_u64(mm, l.mm_rss_file),
            anon_pages: self.read_u64(mm, l.mm_rss_anon),
            shmem_pages: self.read_u64(mm, l.mm_rss_shmem),
        })
    }
    fn io_task(&self) -> IoCounters {
        self.io_at(self.task, self.layout.task_ioac)
    }
    fn io_group(&self) -> IoCounters {
        self.io_at(self.signal(), self.layout.signal_ioac)
    }
}

/// Logical task contents, independent of any layout.
#[derive(Clone)]
struct Task {
    pid: u64,
    parent_tgid: u32,
    raw_exit_code: u32,
    comm: &'static [u8],
    utime_ns: u64,
    stime_ns: u64,
    min_flt: u64,
    maj_flt: u64,
    start_time_ns: u64,
    num_threads: u32,
    prio: u32,
    static_prio: u32,
    blkio_delay_ns: u64,
    swapin_delay_ns: u64,
    has_mm: bool,
    total_vm: u64,
    rss_file: u64,
    rss_anon: u64,
    rss_shmem: u64,
    io_task: [u64; 7],
    io_group: [u64; 7],
}

fn compact_layout() -> TaskLayout {
    TaskLayout {
        task_real_parent: 0,
        task_tgid: 8,
        task_group_leader: 16,
        task_start_time: 24,
        task_signal: 32,
        task_prio: 40,
        task_static_prio: 44,
        task_delays: 48,
        task_mm: 56,
        task_ioac: 64,
        signal_nr_threads: 0,
        signal_pacct_exitcode: 8,
        signal_pacct_utime: 16,
        signal_pacct_stime: 24,
        signal_pacct_minflt: 32,
        signal_pacct_majflt: 40,
        signal_ioac: 48,
        delays_blkio_delay: 0,
        delays_swapin_delay: 8,
        mm_total_vm: 0,
        mm_rss_file: 8,
        mm_rss_anon: 16,
        mm_rss_shmem: 24,
        io_rchar: 0,
        io_wchar: 8,
        io_syscr: 16,
        io_syscw: 24,
        io_read_bytes: 32,
        io_write_bytes: 40,
        io_cancelled_write_bytes: 48,
    }
}

/// Same fields shuffled to different offsets, as a differently configured
/// kernel build would lay them out.
fn shuffled_layout() -> TaskLayout {
    TaskLayout {
        task_real_parent: 120,
        task_tgid: 4,
        task_group_leader: 72,
        task_start_time: 200,
        task_signal: 96,
        task_prio: 12,
        task_static_prio: 132,
        task_delays: 144,
        task_mm: 160,
        task_ioac: 240,
        signal_nr_threads: 60,
        signal_pacct_exitcode: 100,
        signal_pacct_utime: 112,
        signal_pacct_stime: 16,
        signal_pacct_minflt: 152,
        signal_pacct_majflt: 24,
        signal_ioac: 320,
        delays_blkio_delay: 40,
        delays_swapin_delay: 16,
        mm_total_vm: 80,
        mm_rss_file: 32,
        mm_rss_anon: 136,
        mm_rss_shmem: 64,
        io_rchar: 16,
        io_wchar: 0,
        io_syscr: 48,
        io_syscw: 8,
        io_read_bytes: 40,
        io_write_bytes: 24,
        io_cancelled_write_bytes: 32,
    }
}

const TASK_BASE: u64 = 64;
const SIGNAL_BASE: u64 = 1024;
const DELAYS_BASE: u64 = 1536;
const MM_BASE: u64 = 2048;
const LEADER_BASE: u64 = 2560;
const PARENT_BASE: u64 = 3072;

fn build(layout: TaskLayout, task: &Task) -> SyntheticKernel {
    let mut mem = vec![0u8; 4096];
    // Offsets the layout does not resolve have nowhere to be written,
    // exactly like fields a kernel build does not carry.
    let mut put_u64 = |base: u64, offset: u32, value: u64| {
        if offset == UNRESOLVED {
            return;
        }
        let at = base as usize + offset as usize;
        mem[at..at + 8].copy_from_slice(&value.to_le_bytes());
    };

    put_u64(TASK_BASE, layout.task_real_parent, PARENT_BASE);
    put_u64(TASK_BASE, layout.task_group_leader, LEADER_BASE);
    put_u64(TASK_BASE, layout.task_signal, SIGNAL_BASE);
    put_u64(TASK_BASE, layout.task_delays, DELAYS_BASE);
    if task.has_mm {
        put_u64(TASK_BASE, layout.task_mm, MM_BASE);
    }

    put_u64(LEADER_BASE, layout.task_start_time, task.start_time_ns);
    put_u64(DELAYS_BASE, layout.delays_blkio_delay, task.blkio_delay_ns);
    put_u64(DELAYS_BASE, layout.delays_swapin_delay, task.swapin_delay_ns);
    put_u64(SIGNAL_BASE, layout.signal_pacct_utime, task.utime_ns);
    put_u64(SIGNAL_BASE, layout.signal_pacct_stime, task.stime_ns);
    put_u64(SIGNAL_BASE, layout.signal_pacct_minflt, task.min_flt);
    put_u64(SIGNAL_BASE, layout.signal_pacct_majflt, task.maj_flt);
    put_u64(MM_BASE, layout.mm_total_vm, task.total_vm);
    put_u64(MM_BASE, layout.mm_rss_file, task.rss_file);
    put_u64(MM_BASE, layout.mm_rss_anon, task.rss_anon);
    put_u64(MM_BASE, layout.mm_rss_shmem, task.rss_shmem);

    let io_offsets = [
        layout.io_rchar,
        layout.io_wchar,
        layout.io_syscr,
        layout.io_syscw,
        layout.io_read_bytes,
        layout.io_write_bytes,
        layout.io_cancelled_write_bytes,
    ];
    for (relative, value) in io_offsets.iter().zip(task.io_task) {
        put_u64(TASK_BASE, combine(layout.task_ioac, *relative), value);
    }
    for (relative, value) in io_offsets.iter().zip(task.io_group) {
        put_u64(SIGNAL_BASE, combine(layout.signal_ioac, *relative), value);
    }

    let mut put_u32 = |base: u64, offset: u32, value: u32| {
        if offset == UNRESOLVED {
            return;
        }
        let at = base as usize + offset as usize;
        mem[at..at + 4].copy_from_slice(&value.to_le_bytes());
    };
    put_u32(PARENT_BASE, layout.task_tgid, task.parent_tgid);
    put_u32(TASK_BASE, layout.task_prio, task.prio);
    put_u32(TASK_BASE, layout.task_static_prio, task.static_prio);
    put_u32(SIGNAL_BASE, layout.signal_pacct_exitcode, task.raw_exit_code);
    put_u32(SIGNAL_BASE, layout.signal_nr_threads, task.num_threads);

    let mut comm = [0u8; TASK_COMM_LEN];
    comm[..task.comm.len()].copy_from_slice(task.comm);

    SyntheticKernel {
        mem,
        layout,
        task: TASK_BASE,
        pid_tgid: task.pid << 32 | task.pid,
        comm,
    }
}

fn sample_task() -> Task {
    Task {
        pid: 4321,
        parent_tgid: 1,
        raw_exit_code: 0x1200,
        comm: b"worker",
        utime_ns: 250_000_000,
        stime_ns: 30_000_000,
        min_flt: 15,
        maj_flt: 2,
        start_time_ns: 1_000_000_000,
        num_threads: 4,
        prio: 120,
        static_prio: 120,
        blkio_delay_ns: 20_000_000,
        swapin_delay_ns: 10_000_000,
        has_mm: true,
        total_vm: 5000,
        rss_file: 300,
        rss_anon: 40,
        rss_shmem: 5,
        io_task: [1, 2, 3, 4, 5, 6, 7],
        io_group: [10, 20, 30, 40, 50, 60, 70],
    }
}

fn event_bytes(ev: &ExitEvent) -> Vec<u8> {
    let ptr = ev as *const ExitEvent as *const u8;
    unsafe { std::slice::from_raw_parts(ptr, std::mem::size_of::<ExitEvent>()) }.to_vec()
}

const NOW_NS: u64 = 2_000_000_000;

#[test]
fn records_are_identical_across_layouts() {
    let task = sample_task();
    let a = capture(&build(compact_layout(), &task), NOW_NS, 1);
    let b = capture(&build(shuffled_layout(), &task), NOW_NS, 1);
    assert_eq!(event_bytes(&a), event_bytes(&b));

    // And the values are the expected ones, not coincidentally equal zeros.
    assert_eq!(a.pid, 4321);
    assert_eq!(a.ppid, 1);
    assert_eq!(a.exit_code, 0x12);
    assert_eq!(&a.comm[..6], b"worker");
    assert_eq!(a.utime, 25);
    assert_eq!(a.stime, 3);
    assert_eq!(a.start_time, 100);
    assert_eq!(a.end_time, 200);
    assert_eq!(a.num_threads, 4);
    assert_eq!(a.priority, 20);
    assert_eq!(a.nice, 0);
    assert_eq!(a.delayacct_blkio_ticks, 3);
    assert_eq!(a.min_flt, 15);
    assert_eq!(a.maj_flt, 2);
    assert_eq!(a.vss_pages, 5000);
    assert_eq!(a.rss_pages, 345);
    assert_eq!(a.rchar, 11);
    assert_eq!(a.cancelled_write_bytes, 77);
}

#[test]
fn null_memory_descriptor_zeroes_memory_fields_only() {
    let mut task = sample_task();
    task.has_mm = false;
    let ev = capture(&build(compact_layout(), &task), NOW_NS, 0);
    assert_eq!(ev.vss_pages, 0);
    assert_eq!(ev.rss_pages, 0);
    // The rest of the record is still populated.
    assert_eq!(ev.pid, 4321);
    assert_eq!(ev.rchar, 11);
}

#[test]
fn unresolved_layout_degrades_every_field_to_zero() {
    let ev = capture(&build(TaskLayout::unresolved(), &sample_task()), NOW_NS, 2);
    assert_eq!(ev.ppid, 0);
    assert_eq!(ev.utime, 0);
    assert_eq!(ev.rss_pages, 0);
    assert_eq!(ev.rchar, 0);
    // Fields that come from the invocation context survive.
    assert_eq!(ev.pid, 4321);
    assert_eq!(ev.on_cpu, 2);
    assert_eq!(ev.end_time, 200);
}

#[test]
fn concurrent_captures_on_two_cpus_stay_isolated() {
    let first = sample_task();
    let mut second = sample_task();
    second.pid = 9999;
    second.raw_exit_code = 0xFF00;
    second.io_task = [100, 0, 0, 0, 0, 0, 0];
    second.io_group = [1000, 0, 0, 0, 0, 0, 0];

    let a = std::thread::spawn(move || capture(&build(compact_layout(), &first), NOW_NS, 0));
    let b = std::thread::spawn(move || capture(&build(shuffled_layout(), &second), NOW_NS, 1));
    let a = a.join().unwrap();
    let b = b.join().unwrap();

    assert_eq!((a.pid, a.on_cpu, a.exit_code, a.rchar), (4321, 0, 0x12, 11));
    assert_eq!((b.pid, b.on_cpu, b.exit_code, b.rchar), (9999, 1, 0xFF, 1100));
}

#[test]
fn wire_decode_round_trips_through_raw_bytes() {
    // The user-space reader decodes perf samples with an unaligned read of
    // the raw bytes; that must reproduce the record exactly.
    let ev = capture(&build(compact_layout(), &sample_task()), NOW_NS, 5);
    let bytes = event_bytes(&ev);
    let decoded = unsafe { (bytes.as_ptr() as *const ExitEvent).read_unaligned() };
    assert_eq!(event_bytes(&decoded), bytes);
    assert_eq!(decoded.pid, ev.pid);
    assert_eq!(decoded.on_cpu, 5);
}
