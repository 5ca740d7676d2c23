//! Step-based task scheduling.
//!
//! The host advances the simulation one discrete step at a time. Deferred
//! work is queued here as plain task values keyed by the step on which it
//! becomes due, and [`StepScheduler::advance`] hands back everything that
//! came due. Nothing ever sleeps: a delay is always "run again after N steps".

use std::collections::{BTreeMap, HashMap};

/// Discrete simulation step counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Step(u64);

impl Step {
    /// The first step of a simulation.
    pub const ZERO: Self = Self(0);

    /// Creates a step marker from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the step.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the step `steps` later, saturating at the maximum.
    #[must_use]
    pub const fn saturating_add(self, steps: u64) -> Self {
        Self(self.0.saturating_add(steps))
    }

    /// Number of steps elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub const fn steps_since(self, earlier: Step) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Cancelable handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct ScheduledTask<T> {
    task: T,
    slot: (Step, u64),
    interval: Option<u64>,
}

/// Single-threaded scheduler that releases tasks on the step they fall due.
///
/// Delays are clamped to at least one step, so a task scheduled while the
/// current step's tasks are being dispatched always runs on a later step.
/// Tasks due on the same step are released in the order they were queued.
#[derive(Debug)]
pub struct StepScheduler<T> {
    now: Step,
    next_handle: u64,
    next_sequence: u64,
    due: BTreeMap<(Step, u64), TaskHandle>,
    tasks: HashMap<TaskHandle, ScheduledTask<T>>,
}

impl<T> Default for StepScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StepScheduler<T> {
    /// Creates an empty scheduler positioned at [`Step::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Step::ZERO,
            next_handle: 0,
            next_sequence: 0,
            due: BTreeMap::new(),
            tasks: HashMap::new(),
        }
    }

    /// Step most recently released by [`StepScheduler::advance`].
    #[must_use]
    pub const fn now(&self) -> Step {
        self.now
    }

    /// Queues `task` to run once, `delay` steps from now.
    pub fn schedule_once(&mut self, delay: u64, task: T) -> TaskHandle {
        self.insert(delay, None, task)
    }

    /// Queues `task` to run `delay` steps from now and then every `interval`
    /// steps until cancelled.
    pub fn schedule_repeating(&mut self, delay: u64, interval: u64, task: T) -> TaskHandle {
        self.insert(delay, Some(interval.max(1)), task)
    }

    /// Cancels a pending task. Returns `false` if it already ran or was
    /// cancelled before.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some(scheduled) => {
                let _ = self.due.remove(&scheduled.slot);
                true
            }
            None => false,
        }
    }

    /// Reports whether the handle still refers to a pending task.
    #[must_use]
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle)
    }

    /// Number of pending tasks, repeating ones counted once.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels every pending task.
    pub fn clear(&mut self) {
        self.due.clear();
        self.tasks.clear();
    }

    fn insert(&mut self, delay: u64, interval: Option<u64>, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        let slot = self.next_slot(delay);
        let _ = self.due.insert(slot, handle);
        let _ = self.tasks.insert(
            handle,
            ScheduledTask {
                task,
                slot,
                interval,
            },
        );
        handle
    }

    fn next_slot(&mut self, delay: u64) -> (Step, u64) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        (self.now.saturating_add(delay.max(1)), sequence)
    }
}

impl<T: Clone> StepScheduler<T> {
    /// Moves to the next step and releases every task due on it.
    ///
    /// One-shot tasks are forgotten once released; repeating tasks are queued
    /// again under the same handle.
    pub fn advance(&mut self) -> Vec<(TaskHandle, T)> {
        self.now = self.now.saturating_add(1);
        let mut released = Vec::new();

        while let Some(entry) = self.due.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let handle = entry.remove();

            let Some(interval) = self.tasks.get(&handle).map(|scheduled| scheduled.interval) else {
                continue;
            };

            match interval {
                Some(interval) => {
                    let slot = self.next_slot(interval);
                    if let Some(scheduled) = self.tasks.get_mut(&handle) {
                        scheduled.slot = slot;
                        released.push((handle, scheduled.task.clone()));
                    }
                    let _ = self.due.insert(slot, handle);
                }
                None => {
                    if let Some(scheduled) = self.tasks.remove(&handle) {
                        released.push((handle, scheduled.task));
                    }
                }
            }
        }

        released
    }
}
