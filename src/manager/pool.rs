//! Adaptive pool of additional sender workers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use log::warn;
use parking_lot::Mutex;

use crate::config::ShipperConfig;

/// Thresholds deciding when additional workers start and retire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ScalingPolicy {
    pub upper: usize,
    pub lower: usize,
    pub max_additional: usize,
    pub cooldown: Duration,
}

impl ScalingPolicy {
    /// Upper threshold at 80% of the queue capacity, lower at 40%.
    pub(crate) fn from_config(config: &ShipperConfig) -> Self {
        let capacity = config.queue_capacity;
        Self {
            upper: (capacity * 8 / 10).max(1),
            lower: capacity * 4 / 10,
            max_additional: config.max_additional_workers,
            cooldown: config.scale_up_cooldown,
        }
    }

    pub(crate) fn should_scale_up(
        &self,
        depth: usize,
        active: usize,
        last_scale_up: Option<Instant>,
        now: Instant,
    ) -> bool {
        depth >= self.upper
            && active < self.max_additional
            && last_scale_up.is_none_or(|last| now.saturating_duration_since(last) >= self.cooldown)
    }

    pub(crate) fn should_retire(&self, depth: usize, closing: bool) -> bool {
        closing || depth <= self.lower
    }
}

/// Claim on one additional-worker slot, released on drop.
///
/// Held by the worker for its whole life, so the active count falls however
/// the worker exits.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct WorkerPool {
    policy: ScalingPolicy,
    active: Arc<AtomicUsize>,
    last_scale_up: Mutex<Option<Instant>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(policy: ScalingPolicy) -> Self {
        Self {
            policy,
            active: Arc::new(AtomicUsize::new(0)),
            last_scale_up: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Number of additional workers currently alive.
    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Reserve a slot for a new worker when the policy allows one.
    ///
    /// The cheap threshold check runs unlocked; the full decision is
    /// repeated under the spawn guard so racing callers reserve at most one
    /// slot per cooldown window.
    pub(crate) fn try_reserve(&self, depth: usize, now: Instant) -> Option<WorkerSlot> {
        if !self.policy.should_scale_up(depth, self.active(), None, now) {
            return None;
        }
        let mut last = self.last_scale_up.lock();
        if !self.policy.should_scale_up(depth, self.active(), *last, now) {
            return None;
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        *last = Some(now);
        Some(WorkerSlot {
            active: Arc::clone(&self.active),
        })
    }

    /// Track a spawned worker so shutdown can join it.
    pub(crate) fn adopt(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Join every adopted worker, including ones adopted while joining.
    pub(crate) fn join_all(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("logship: additional worker panicked");
                }
            }
        }
    }
}
