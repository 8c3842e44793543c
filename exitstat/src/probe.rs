use crate::sample::ExitSample;
use anyhow::{anyhow, Context, Result};
use aya::maps::PerfEventArray;
use aya::programs::KProbe;
use aya::util::online_cpus;
use aya::{include_bytes_aligned, Ebpf, EbpfLoader};
use bytes::BytesMut;
use exitstat_common::{ExitEvent, TaskLayout};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Kernel symbol for process accounting finalization; entered exactly once
/// per exiting process.
pub const ATTACH_SYMBOL: &str = "acct_process";

const PER_READ_BUFFERS: usize = 8;

/// Loaded probe plus the per-CPU perf reader tasks feeding decoded samples
/// into an mpsc channel.
pub struct ExitProbe {
    // Keeps the maps and the kprobe link alive.
    _bpf: Ebpf,
    shutdown: Arc<AtomicBool>,
    readers: Vec<tokio::task::JoinHandle<()>>,
}

impl ExitProbe {
    /// Load the embedded probe with `layout` patched in, attach it, and
    /// start one reader task per online CPU.
    pub fn load(
        layout: TaskLayout,
        perf_pages: usize,
        page_size: u64,
        tx: mpsc::Sender<ExitSample>,
    ) -> Result<Self> {
        bump_memlock_rlimit();

        let mut bpf = EbpfLoader::new()
            .set_global("TASK_LAYOUT", &layout, true)
            .load(include_bytes_aligned!(concat!(env!("OUT_DIR"), "/exitstat")))
            .context("loading eBPF object")?;

        let program: &mut KProbe = bpf
            .program_mut("exitstat_exit")
            .ok_or_else(|| anyhow!("program 'exitstat_exit' not found"))?
            .try_into()?;
        program.load().context("verifier rejected the probe")?;
        program
            .attach(ATTACH_SYMBOL, 0)
            .with_context(|| format!("attaching kprobe to {ATTACH_SYMBOL}"))?;
        info!(symbol = ATTACH_SYMBOL, "kprobe attached");

        let events_map = bpf
            .take_map("EVENTS")
            .ok_or_else(|| anyhow!("failed to take ownership of the 'EVENTS' map"))?;
        let mut events = PerfEventArray::try_from(events_map)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut readers = Vec::new();
        for cpu_id in online_cpus().map_err(|(_, e)| anyhow!("listing online cpus: {e}"))? {
            let perf_buf = events.open(cpu_id, Some(perf_pages))?;
            let async_fd = AsyncFd::new(perf_buf.as_raw_fd())?;
            let shutdown = Arc::clone(&shutdown);
            let tx = tx.clone();

            readers.push(tokio::spawn(async move {
                debug!(cpu = cpu_id, "perf reader started");
                let mut perf_buf = perf_buf;
                let mut bufs: Vec<BytesMut> = (0..PER_READ_BUFFERS)
                    .map(|_| BytesMut::with_capacity(512))
                    .collect();

                while !shutdown.load(Ordering::SeqCst) {
                    // The 1s timeout bounds how long shutdown can lag.
                    match timeout(Duration::from_secs(1), async_fd.readable()).await {
                        Ok(Ok(mut guard)) => {
                            match perf_buf.read_events(&mut bufs) {
                                Ok(events_read) => {
                                    if events_read.lost > 0 {
                                        warn!(
                                            cpu = cpu_id,
                                            lost = events_read.lost,
                                            "perf ring dropped samples"
                                        );
                                    }
                                    for buf in bufs.iter().take(events_read.read) {
                                        let event = unsafe {
                                            (buf.as_ptr() as *const ExitEvent).read_unaligned()
                                        };
                                        let sample = ExitSample::from_event(&event, page_size);
                                        if tx.send(sample).await.is_err() {
                                            debug!(cpu = cpu_id, "sample channel closed");
                                            return;
                                        }
                                    }
                                }
                                Err(e) => {
                                    debug!(cpu = cpu_id, error = %e, "perf read failed, continuing");
                                }
                            }
                            guard.clear_ready();
                        }
                        Ok(Err(e)) => {
                            warn!(cpu = cpu_id, error = %e, "perf fd wait failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        Err(_) => continue,
                    }
                }
                debug!(cpu = cpu_id, "perf reader stopped");
            }));
        }
        info!(readers = readers.len(), "all perf readers dispatched");

        Ok(Self {
            _bpf: bpf,
            shutdown,
            readers,
        })
    }

    /// Stop the readers and detach by dropping the program. Readers get a
    /// bounded grace period each.
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for reader in self.readers.drain(..) {
            if timeout(Duration::from_secs(3), reader).await.is_err() {
                warn!("perf reader did not stop within the grace period");
            }
        }
        info!("probe shut down");
    }
}

impl Drop for ExitProbe {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Older kernels account perf/map memory against RLIMIT_MEMLOCK; lift it so
/// loading does not fail there. Failure only matters on those kernels, so
/// log and move on.
fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!(ret, "removing memlock limit failed");
    }
}
