//! Deterministic clocks shared by the unit tests.

use crate::TimeSource;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub(crate) struct ManualTime {
    millis: AtomicU64,
}

impl ManualTime {
    pub(crate) fn at(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(millis),
        })
    }

    pub(crate) fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// A clock whose n-th reading is `script(n)`, counting every read.
pub(crate) struct ScriptedTime {
    reads: AtomicUsize,
    script: Box<dyn Fn(usize) -> u64 + Send + Sync>,
}

impl ScriptedTime {
    pub(crate) fn new(script: impl Fn(usize) -> u64 + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reads: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    /// Replays `values` in order, then sticks to the last one.
    pub(crate) fn sequence(values: &[u64]) -> Arc<Self> {
        let values = values.to_vec();
        Self::new(move |n| values[n.min(values.len() - 1)])
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TimeSource for ScriptedTime {
    fn current_millis(&self) -> u64 {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        (self.script)(n)
    }
}
