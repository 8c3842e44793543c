#![cfg_attr(feature = "build-ebpf", no_std)]
#![cfg_attr(feature = "build-ebpf", no_main)]

// Keep the eBPF code in one cfg module instead of scattering #[cfg(...)].
#[cfg(feature = "build-ebpf")]
mod probe {
    use core::ffi::c_void;
    use core::ptr;

    use aya_ebpf::{
        helpers::{
            bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_task,
            bpf_get_smp_processor_id, bpf_ktime_get_ns, bpf_probe_read_kernel,
        },
        macros::{kprobe, map},
        maps::PerfEventArray,
        programs::ProbeContext,
    };
    use exitstat_common::{
        capture, combine, emit, ExitEvent, IoCounters, MmCounters, RecordSink, SinkFull,
        TaskLayout, TaskView, TASK_COMM_LEN, UNRESOLVED,
    };

    // Precondition for attaching: the loader checks this string against the
    // helpers the program uses.
    #[link_section = "license"]
    #[used]
    static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

    // Patched by the loader with the running kernel's resolved offsets
    // before the program is handed to the verifier.
    #[no_mangle]
    static TASK_LAYOUT: TaskLayout = TaskLayout::unresolved();

    #[map]
    static EVENTS: PerfEventArray<ExitEvent> = PerfEventArray::new(0);

    #[inline(always)]
    fn layout() -> TaskLayout {
        // Volatile so the compiler cannot fold the unpatched default.
        unsafe { ptr::read_volatile(&TASK_LAYOUT) }
    }

    /// Read one field at `base + offset`, `None` on a null base, an
    /// unresolved offset or a faulting access.
    #[inline(always)]
    unsafe fn read_field<T>(base: *const c_void, offset: u32) -> Option<T> {
        if base.is_null() || offset == UNRESOLVED {
            return None;
        }
        bpf_probe_read_kernel((base as *const u8).add(offset as usize) as *const T).ok()
    }

    #[inline(always)]
    unsafe fn read_u64(base: *const c_void, offset: u32) -> u64 {
        read_field::<u64>(base, offset).unwrap_or(0)
    }

    #[inline(always)]
    unsafe fn read_u32(base: *const c_void, offset: u32) -> u32 {
        read_field::<u32>(base, offset).unwrap_or(0)
    }

    #[inline(always)]
    unsafe fn read_i32(base: *const c_void, offset: u32) -> i32 {
        read_field::<i32>(base, offset).unwrap_or(0)
    }

    #[inline(always)]
    unsafe fn read_ptr(base: *const c_void, offset: u32) -> *const c_void {
        read_field::<*const c_void>(base, offset).unwrap_or(ptr::null())
    }

    /// The live task_struct behind the `TaskView` capability. Substructure
    /// pointers are chased once up front; a null pointer leaves every field
    /// it guards at zero.
    struct KernelTask {
        layout: TaskLayout,
        task: *const c_void,
        signal: *const c_void,
        delays: *const c_void,
        mm: *const c_void,
        leader: *const c_void,
    }

    impl KernelTask {
        #[inline(always)]
        unsafe fn current(layout: TaskLayout) -> Self {
            let task = bpf_get_current_task() as *const c_void;
            Self {
                layout,
                task,
                signal: read_ptr(task, layout.task_signal),
                delays: read_ptr(task, layout.task_delays),
                mm: read_ptr(task, layout.task_mm),
                leader: read_ptr(task, layout.task_group_leader),
            }
        }

        #[inline(always)]
        unsafe fn read_io(&self, base: *const c_void, ioac: u32) -> IoCounters {
            let l = &self.layout;
            IoCounters {
                rchar: read_u64(base, combine(ioac, l.io_rchar)),
                wchar: read_u64(base, combine(ioac, l.io_wchar)),
                syscr: read_u64(base, combine(ioac, l.io_syscr)),
                syscw: read_u64(base, combine(ioac, l.io_syscw)),
                read_bytes: read_u64(base, combine(ioac, l.io_read_bytes)),
                write_bytes: read_u64(base, combine(ioac, l.io_write_bytes)),
                cancelled_write_bytes: read_u64(base, combine(ioac, l.io_cancelled_write_bytes)),
            }
        }
    }

    impl TaskView for KernelTask {
        #[inline(always)]
        fn pid_tgid(&self) -> u64 {
            bpf_get_current_pid_tgid()
        }

        #[inline(always)]
        fn comm(&self) -> [u8; TASK_COMM_LEN] {
            bpf_get_current_comm().unwrap_or([0; TASK_COMM_LEN])
        }

        #[inline(always)]
        fn parent_tgid(&self) -> i32 {
            unsafe {
                let parent = read_ptr(self.task, self.layout.task_real_parent);
                read_i32(parent, self.layout.task_tgid)
            }
        }

        #[inline(always)]
        fn raw_exit_code(&self) -> u32 {
            unsafe { read_u32(self.signal, self.layout.signal_pacct_exitcode) }
        }

        #[inline(always)]
        fn acct_utime_ns(&self) -> u64 {
            unsafe { read_u64(self.signal, self.layout.signal_pacct_utime) }
        }

        #[inline(always)]
        fn acct_stime_ns(&self) -> u64 {
            unsafe { read_u64(self.signal, self.layout.signal_pacct_stime) }
        }

        #[inline(always)]
        fn acct_min_flt(&self) -> u64 {
            unsafe { read_u64(self.signal, self.layout.signal_pacct_minflt) }
        }

        #[inline(always)]
        fn acct_maj_flt(&self) -> u64 {
            unsafe { read_u64(self.signal, self.layout.signal_pacct_majflt) }
        }

        #[inline(always)]
        fn leader_start_time_ns(&self) -> u64 {
            unsafe { read_u64(self.leader, self.layout.task_start_time) }
        }

        #[inline(always)]
        fn num_threads(&self) -> i32 {
            unsafe { read_i32(self.signal, self.layout.signal_nr_threads) }
        }

        #[inline(always)]
        fn prio(&self) -> u64 {
            unsafe { read_i32(self.task, self.layout.task_prio) as u64 }
        }

        #[inline(always)]
        fn static_prio(&self) -> u64 {
            unsafe { read_i32(self.task, self.layout.task_static_prio) as u64 }
        }

        #[inline(always)]
        fn blkio_delay_ns(&self) -> u64 {
            unsafe { read_u64(self.delays, self.layout.delays_blkio_delay) }
        }

        #[inline(always)]
        fn swapin_delay_ns(&self) -> u64 {
            unsafe { read_u64(self.delays, self.layout.delays_swapin_delay) }
        }

        #[inline(always)]
        fn mm_counters(&self) -> Option<MmCounters> {
            if self.mm.is_null() {
                return None;
            }
            let l = &self.layout;
            unsafe {
                Some(MmCounters {
                    total_vm: read_u64(self.mm, l.mm_total_vm),
                    file_pages: read_u64(self.mm, l.mm_rss_file),
                    anon_pages: read_u64(self.mm, l.mm_rss_anon),
                    shmem_pages: read_u64(self.mm, l.mm_rss_shmem),
                })
            }
        }

        #[inline(always)]
        fn io_task(&self) -> IoCounters {
            unsafe { self.read_io(self.task, self.layout.task_ioac) }
        }

        #[inline(always)]
        fn io_group(&self) -> IoCounters {
            unsafe { self.read_io(self.signal, self.layout.signal_ioac) }
        }
    }

    struct PerfSink<'a> {
        ctx: &'a ProbeContext,
    }

    impl RecordSink for PerfSink<'_> {
        #[inline(always)]
        fn publish(&mut self, event: &ExitEvent) -> Result<(), SinkFull> {
            // Ring-full drops happen inside the helper and are invisible
            // here, matching the fire-and-forget contract.
            EVENTS.output(self.ctx, event, 0);
            Ok(())
        }
    }

    // Attached to acct_process: entered exactly once per exiting process,
    // on the CPU finalizing its accounting.
    #[kprobe]
    pub fn exitstat_exit(ctx: ProbeContext) -> u32 {
        let (task, now_ns, cpu) = unsafe {
            (
                KernelTask::current(layout()),
                bpf_ktime_get_ns(),
                bpf_get_smp_processor_id(),
            )
        };
        let event = capture(&task, now_ns, cpu);
        let mut sink = PerfSink { ctx: &ctx };
        emit(&mut sink, &event);
        0
    }

    #[cfg(not(test))]
    #[panic_handler]
    fn panic(_info: &core::panic::PanicInfo) -> ! {
        loop {}
    }
}

// Without the eBPF feature, provide an empty std main so host builds of the
// workspace do not break.
#[cfg(not(feature = "build-ebpf"))]
fn main() {
    eprintln!("exitstat-ebpf built without the 'build-ebpf' feature; skipping the eBPF program");
}
