#![no_std]

mod capture;
mod event;
mod layout;
mod task;

pub use capture::{capture, emit, RecordSink, SinkFull};
pub use capture::{centiseconds, exit_status, user_nice, user_priority};
pub use capture::{MAX_RT_PRIO, NICE_BASE, NSEC_PER_CENTISEC};
pub use event::{ExitEvent, TASK_COMM_LEN};
pub use layout::{combine, TaskLayout, MM_ANONPAGES, MM_FILEPAGES, MM_SHMEMPAGES, RSS_COUNTER_STRIDE, UNRESOLVED};
pub use task::{IoCounters, MmCounters, TaskView};
