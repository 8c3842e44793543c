use crate::sample::ExitSample;
use std::collections::HashMap;
use std::sync::Mutex;

/// Samples collected from the probe, keyed by pid. The probe stream and a
/// snapshot consumer touch it from different tasks, hence the mutex.
#[derive(Default)]
pub struct ExitStore {
    samples: Mutex<HashMap<i32, ExitSample>>,
}

impl ExitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins: pid reuse between two snapshots leaves the most
    /// recent exit.
    pub fn insert(&self, sample: ExitSample) {
        self.samples.lock().unwrap().insert(sample.pid, sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().unwrap().is_empty()
    }

    /// Move everything into `snapshot`, leaving the store empty. Pids
    /// already present in the snapshot keep their existing entry — a live
    /// sample beats the exit record for the same pid.
    pub fn drain_into(&self, snapshot: &mut HashMap<i32, ExitSample>) {
        let mut samples = self.samples.lock().unwrap();
        for (pid, sample) in samples.drain() {
            snapshot.entry(pid).or_insert(sample);
        }
    }
}
