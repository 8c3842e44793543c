//! Kernel structure layout resolution.
//!
//! The probe binary carries no field offsets. At startup the running
//! kernel's BTF is walked and every offset in [`TaskLayout`] is resolved by
//! member name, then patched into the probe before load. A member the
//! kernel does not carry degrades to the unresolved sentinel, which the
//! probe reads as zero — matching the field-unavailable policy.

use anyhow::{bail, Context, Result};
use btf_rs::{Btf, Struct, Type};
use exitstat_common::{
    combine, TaskLayout, MM_ANONPAGES, MM_FILEPAGES, MM_SHMEMPAGES, RSS_COUNTER_STRIDE, UNRESOLVED,
};
use std::path::Path;
use tracing::{debug, warn};

/// Byte-offset lookup for a named field of a named kernel structure.
/// Abstracted as a trait so the layout builder is testable without a real
/// BTF blob.
pub trait FieldResolver {
    fn offset_of(&self, structure: &str, field: &str) -> Option<u32>;
}

/// Resolver backed by a parsed BTF blob, normally
/// `/sys/kernel/btf/vmlinux`.
pub struct BtfResolver {
    btf: Btf,
}

impl BtfResolver {
    pub fn from_file(path: &Path) -> Result<Self> {
        let btf = Btf::from_file(path)
            .with_context(|| format!("parsing BTF from {}", path.display()))?;
        Ok(Self { btf })
    }

    fn struct_by_name(&self, name: &str) -> Result<Struct> {
        match self.btf.resolve_types_by_name(name)?.into_iter().next() {
            Some(Type::Struct(s) | Type::Union(s)) => Ok(s),
            Some(_) => bail!("BTF type '{name}' is not a struct or union"),
            None => bail!("BTF type '{name}' not found"),
        }
    }

    /// Depth-first member search, descending into anonymous struct/union
    /// members (e.g. the unnamed cacheline group inside mm_struct).
    fn search(&self, s: &Struct, field: &str, base: u32) -> Option<u32> {
        for member in s.members.iter() {
            let offset = base + member.bit_offset() / 8;
            let name = self.btf.resolve_name(member).unwrap_or_default();
            if name == field {
                return Some(offset);
            }
            if name.is_empty() {
                if let Ok(Type::Struct(inner) | Type::Union(inner)) =
                    self.btf.resolve_chained_type(member)
                {
                    if let Some(found) = self.search(&inner, field, offset) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }
}

impl FieldResolver for BtfResolver {
    fn offset_of(&self, structure: &str, field: &str) -> Option<u32> {
        let s = self.struct_by_name(structure).ok()?;
        self.search(&s, field, 0)
    }
}

fn direct<R: FieldResolver>(resolver: &R, structure: &str, field: &str) -> u32 {
    match resolver.offset_of(structure, field) {
        Some(offset) => {
            debug!(structure, field, offset, "resolved kernel field");
            offset
        }
        None => {
            warn!(structure, field, "field missing from kernel layout, it will read as zero");
            UNRESOLVED
        }
    }
}

fn nested<R: FieldResolver>(
    resolver: &R,
    outer: (&str, &str),
    inner: (&str, &str),
) -> u32 {
    combine(
        direct(resolver, outer.0, outer.1),
        direct(resolver, inner.0, inner.1),
    )
}

/// Per-category resident counter: `rss_stat.count[index].counter`. The
/// array elements are `atomic_long_t`, whose value sits at the start of
/// each [`RSS_COUNTER_STRIDE`]-byte slot.
fn rss_counter<R: FieldResolver>(resolver: &R, index: u32) -> u32 {
    combine(
        nested(resolver, ("mm_struct", "rss_stat"), ("mm_rss_stat", "count")),
        index * RSS_COUNTER_STRIDE,
    )
}

/// Resolve the full offset table the probe needs.
pub fn resolve_task_layout<R: FieldResolver>(resolver: &R) -> TaskLayout {
    TaskLayout {
        task_real_parent: direct(resolver, "task_struct", "real_parent"),
        task_tgid: direct(resolver, "task_struct", "tgid"),
        task_group_leader: direct(resolver, "task_struct", "group_leader"),
        task_start_time: direct(resolver, "task_struct", "start_time"),
        task_signal: direct(resolver, "task_struct", "signal"),
        task_prio: direct(resolver, "task_struct", "prio"),
        task_static_prio: direct(resolver, "task_struct", "static_prio"),
        task_delays: direct(resolver, "task_struct", "delays"),
        task_mm: direct(resolver, "task_struct", "mm"),
        task_ioac: direct(resolver, "task_struct", "ioac"),
        signal_nr_threads: direct(resolver, "signal_struct", "nr_threads"),
        signal_pacct_exitcode: nested(
            resolver,
            ("signal_struct", "pacct"),
            ("pacct_struct", "ac_exitcode"),
        ),
        signal_pacct_utime: nested(
            resolver,
            ("signal_struct", "pacct"),
            ("pacct_struct", "ac_utime"),
        ),
        signal_pacct_stime: nested(
            resolver,
            ("signal_struct", "pacct"),
            ("pacct_struct", "ac_stime"),
        ),
        signal_pacct_minflt: nested(
            resolver,
            ("signal_struct", "pacct"),
            ("pacct_struct", "ac_minflt"),
        ),
        signal_pacct_majflt: nested(
            resolver,
            ("signal_struct", "pacct"),
            ("pacct_struct", "ac_majflt"),
        ),
        signal_ioac: direct(resolver, "signal_struct", "ioac"),
        delays_blkio_delay: direct(resolver, "task_delay_info", "blkio_delay"),
        delays_swapin_delay: direct(resolver, "task_delay_info", "swapin_delay"),
        mm_total_vm: direct(resolver, "mm_struct", "total_vm"),
        mm_rss_file: rss_counter(resolver, MM_FILEPAGES),
        mm_rss_anon: rss_counter(resolver, MM_ANONPAGES),
        mm_rss_shmem: rss_counter(resolver, MM_SHMEMPAGES),
        io_rchar: direct(resolver, "task_io_accounting", "rchar"),
        io_wchar: direct(resolver, "task_io_accounting", "wchar"),
        io_syscr: direct(resolver, "task_io_accounting", "syscr"),
        io_syscw: direct(resolver, "task_io_accounting", "syscw"),
        io_read_bytes: direct(resolver, "task_io_accounting", "read_bytes"),
        io_write_bytes: direct(resolver, "task_io_accounting", "write_bytes"),
        io_cancelled_write_bytes: direct(resolver, "task_io_accounting", "cancelled_write_bytes"),
    }
}
