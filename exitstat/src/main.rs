mod config;
mod layout;
mod logger;
mod probe;
mod sample;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use config::AppConfig;
use layout::BtfResolver;
use probe::ExitProbe;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::ExitStore;
use tokio::sync::mpsc;
use tracing::info;

/// Command line options for exitstat
#[derive(Debug, Parser)]
#[command(author, version, about = "Per-exit process accounting telemetry", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML). If not provided, search order applies.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit each exit sample as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// BTF blob to resolve the kernel layout from (default: /sys/kernel/btf/vmlinux)
    #[arg(long)]
    btf: Option<PathBuf>,

    /// Stop after SECS seconds instead of running until ctrl-c
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,
}

fn candidate_config_paths() -> Vec<PathBuf> {
    let mut cands = Vec::new();
    if let Ok(p) = env::var("EXITSTAT_CONFIG") {
        cands.push(PathBuf::from(p));
    }
    cands.push(PathBuf::from("./exitstat.yaml"));
    cands.push(PathBuf::from("/etc/exitstat/config.yaml"));
    if let Ok(home) = env::var("XDG_CONFIG_HOME") {
        cands.push(PathBuf::from(home).join("exitstat/config.yaml"));
    }
    if let Some(home_dir) = dirs_next::home_dir() {
        cands.push(home_dir.join(".config/exitstat/config.yaml"));
    }
    cands
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    if let Some(explicit) = &cli.config {
        return AppConfig::load_from_file(explicit);
    }
    for cand in candidate_config_paths() {
        if cand.exists() {
            return AppConfig::load_from_file(&cand);
        }
    }
    Ok(AppConfig::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(&cli)?;
    if cli.json {
        cfg.json = true;
    }
    if let Some(btf) = cli.btf.clone() {
        cfg.btf_path = btf;
    }

    let _log_guard = logger::init(cfg.log_level.as_deref(), cfg.log_directory.as_deref())?;

    let resolver = BtfResolver::from_file(&cfg.btf_path)?;
    let task_layout = layout::resolve_task_layout(&resolver);

    let (tx, mut rx) = mpsc::channel(1024);
    let probe = ExitProbe::load(task_layout, cfg.perf_pages, sample::page_size(), tx)
        .context("starting the exit probe")?;

    let store = Arc::new(ExitStore::new());
    let consumer = {
        let store = Arc::clone(&store);
        let json = cfg.json;
        tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                if json {
                    match serde_json::to_string(&sample) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "serializing sample"),
                    }
                } else {
                    info!(
                        pid = sample.pid,
                        ppid = sample.ppid,
                        comm = %sample.comm,
                        exit_code = sample.exit_code,
                        cpu = sample.on_cpu,
                        utime = sample.utime,
                        stime = sample.stime,
                        rss_pages = sample.rss_pages,
                        "process exited"
                    );
                }
                store.insert(sample);
            }
        })
    };

    match cli.duration {
        Some(secs) => {
            info!(secs, "collecting for a fixed duration");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            info!("collecting until ctrl-c");
            tokio::signal::ctrl_c().await?;
        }
    }

    probe.shutdown().await;
    // With the readers gone every sender is dropped and the consumer drains.
    let _ = consumer.await;
    info!(samples = store.len(), "done");
    Ok(())
}
