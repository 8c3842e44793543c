use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration. Everything has a default so the tool also runs
/// with no config file at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Log filter used when RUST_LOG is not set, e.g. "info" or
    /// "exitstat=debug".
    pub log_level: Option<String>,
    /// When set, logs go to a daily-rolling file there instead of stderr.
    pub log_directory: Option<PathBuf>,
    /// BTF blob the kernel layout is resolved from.
    #[serde(default = "default_btf_path")]
    pub btf_path: PathBuf,
    /// Pages per CPU in each perf ring. Larger rings drop fewer records
    /// under exit storms.
    #[serde(default = "default_perf_pages")]
    pub perf_pages: usize,
    /// Emit each sample as a JSON line on stdout.
    #[serde(default)]
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_directory: None,
            btf_path: default_btf_path(),
            perf_pages: default_perf_pages(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

fn default_btf_path() -> PathBuf {
    PathBuf::from("/sys/kernel/btf/vmlinux")
}

fn default_perf_pages() -> usize {
    64
}
