//! Bounded drain queue shared by every step-spread work loop.

use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
};

use crate::{ScheduleError, StepScheduler, TaskHandle};

/// Outcome of finishing one drain pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainStatus {
    /// Work remains; a continuation was armed for the next step.
    Rearmed {
        /// Entries still pending after the pass.
        remaining: usize,
    },
    /// The queue is empty and the loop cancelled itself.
    Finished,
}

/// Deduplicated work queue drained a bounded slice per step.
///
/// A key sits in the queue at most once while in flight. The queue tracks
/// the single continuation task that drains it: starting a second drain
/// while one is armed is refused, and a continuation the queue no longer
/// owns is rejected instead of processed twice.
#[derive(Debug)]
pub struct BatchQueue<K> {
    label: &'static str,
    pending: VecDeque<K>,
    queued: HashSet<K>,
    drain: Option<TaskHandle>,
}

impl<K: Clone + Eq + Hash> BatchQueue<K> {
    /// Creates an empty queue. `label` names the loop in diagnostics.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            pending: VecDeque::new(),
            queued: HashSet::new(),
            drain: None,
        }
    }

    /// Appends `key` unless it is already queued. Returns whether it was added.
    pub fn push(&mut self, key: K) -> bool {
        if !self.queued.insert(key.clone()) {
            return false;
        }
        self.pending.push_back(key);
        true
    }

    /// Drops a queued key. Returns whether it was present.
    pub fn purge(&mut self, key: &K) -> bool {
        if !self.queued.remove(key) {
            return false;
        }
        self.pending.retain(|pending| pending != key);
        true
    }

    /// Reports whether `key` is waiting in the queue.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.queued.contains(key)
    }

    /// Number of pending keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Reports whether no keys are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Handle of the armed continuation, if a drain is in flight.
    #[must_use]
    pub const fn drain_handle(&self) -> Option<TaskHandle> {
        self.drain
    }

    /// Arms the drain loop so its first pass runs on the next step.
    pub fn start_drain<T>(
        &mut self,
        scheduler: &mut StepScheduler<T>,
        continuation: T,
    ) -> Result<TaskHandle, ScheduleError> {
        if let Some(handle) = self.drain {
            return Err(ScheduleError::DrainInFlight {
                label: self.label,
                handle,
            });
        }
        let handle = scheduler.schedule_once(1, continuation);
        self.drain = Some(handle);
        Ok(handle)
    }

    /// Pops up to `limit` keys for the pass run by continuation `handle`.
    pub fn take_batch(&mut self, handle: TaskHandle, limit: usize) -> Result<Vec<K>, ScheduleError> {
        if self.drain != Some(handle) {
            return Err(ScheduleError::StaleContinuation {
                label: self.label,
                handle,
            });
        }

        let count = limit.min(self.pending.len());
        let batch: Vec<K> = self.pending.drain(..count).collect();
        for key in &batch {
            let _ = self.queued.remove(key);
        }
        Ok(batch)
    }

    /// Ends a pass: re-arms a single continuation if keys remain, otherwise
    /// cancels the loop.
    pub fn finish_pass<T>(&mut self, scheduler: &mut StepScheduler<T>, continuation: T) -> DrainStatus {
        if let Some(handle) = self.drain.take() {
            let _ = scheduler.cancel(handle);
        }

        if self.pending.is_empty() {
            return DrainStatus::Finished;
        }

        self.drain = Some(scheduler.schedule_once(1, continuation));
        DrainStatus::Rearmed {
            remaining: self.pending.len(),
        }
    }

    /// Cancels the armed continuation, leaving pending keys in place.
    pub fn cancel<T>(&mut self, scheduler: &mut StepScheduler<T>) -> bool {
        match self.drain.take() {
            Some(handle) => scheduler.cancel(handle),
            None => false,
        }
    }
}
