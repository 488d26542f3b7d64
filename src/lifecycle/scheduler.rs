//! Simulated-clock task registry.
//!
//! Every delayed behavior (stabilization, auto-connection, ping completion)
//! is a task keyed by `(due, sequence)`, so tasks due at the same instant run
//! in the order they were scheduled. An owner index allows all tasks of one
//! network function to be cancelled in one step.

use crate::diagnostics::ping::ProbeId;
use crate::topology::types::NfId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// Ordering key of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    /// Simulated time at which the task fires
    pub due: Duration,
    /// FIFO tie-breaker for tasks due at the same time
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Promote a `starting` network function to `stable`
    BecomeStable,
    /// Run the auto-connection rules for a freshly stable network function
    AutoConnect,
    /// Deliver the report of an in-flight ping
    ProbeComplete(ProbeId),
}

impl TaskKind {
    /// Tasks that belong to the status state machine, as opposed to probes
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, TaskKind::BecomeStable | TaskKind::AutoConnect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub key: TaskKey,
    pub owner: NfId,
    pub kind: TaskKind,
}

/// Deterministic single-threaded timer wheel driven by explicit `advance` calls
#[derive(Debug, Default)]
pub struct TaskScheduler {
    now: Duration,
    next_sequence: u64,
    queue: BTreeMap<TaskKey, ScheduledTask>,
    by_owner: HashMap<NfId, BTreeSet<TaskKey>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `kind` for `owner` to fire `delay` after the current time
    pub fn schedule(&mut self, delay: Duration, owner: NfId, kind: TaskKind) -> TaskKey {
        let key = TaskKey {
            due: self.now + delay,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        self.by_owner.entry(owner.clone()).or_default().insert(key);
        self.queue.insert(key, ScheduledTask { key, owner, kind });
        key
    }

    /// Cancel one task; returns it if it was still pending
    pub fn cancel(&mut self, key: TaskKey) -> Option<ScheduledTask> {
        let task = self.queue.remove(&key)?;
        self.forget_owner_key(&task.owner, &key);
        Some(task)
    }

    /// Cancel every pending task owned by `owner`
    pub fn cancel_owner(&mut self, owner: &NfId) -> Vec<ScheduledTask> {
        self.cancel_owner_where(owner, |_| true)
    }

    /// Cancel the pending tasks of `owner` whose kind matches `filter`
    pub fn cancel_owner_where(
        &mut self,
        owner: &NfId,
        filter: impl Fn(&TaskKind) -> bool,
    ) -> Vec<ScheduledTask> {
        let keys: Vec<TaskKey> = match self.by_owner.get(owner) {
            Some(keys) => keys
                .iter()
                .filter(|key| self.queue.get(key).is_some_and(|task| filter(&task.kind)))
                .copied()
                .collect(),
            None => return Vec::new(),
        };

        keys.into_iter().filter_map(|key| self.cancel(key)).collect()
    }

    /// Pending tasks of `owner`, earliest first
    pub fn pending_for(&self, owner: &NfId) -> Vec<&ScheduledTask> {
        self.by_owner
            .get(owner)
            .map(|keys| keys.iter().filter_map(|key| self.queue.get(key)).collect())
            .unwrap_or_default()
    }

    /// Due time of the earliest pending task
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(|key| key.due)
    }

    /// Remove and return the earliest task due at or before `deadline`,
    /// moving the clock forward to its due time
    pub fn pop_due(&mut self, deadline: Duration) -> Option<ScheduledTask> {
        let key = *self.queue.keys().next()?;
        if key.due > deadline {
            return None;
        }
        let task = self.cancel(key)?;
        if task.key.due > self.now {
            self.now = task.key.due;
        }
        Some(task)
    }

    /// Move the clock forward; it never moves backwards
    pub fn advance_to(&mut self, time: Duration) {
        if time > self.now {
            self.now = time;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending task; the clock keeps its value
    pub fn clear(&mut self) {
        self.queue.clear();
        self.by_owner.clear();
    }

    fn forget_owner_key(&mut self, owner: &NfId, key: &TaskKey) {
        if let Some(keys) = self.by_owner.get_mut(owner) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_pop_in_time_order() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(secs(5), NfId::from("a"), TaskKind::BecomeStable);
        scheduler.schedule(secs(2), NfId::from("b"), TaskKind::BecomeStable);

        assert_eq!(scheduler.next_due(), Some(secs(2)));
        assert!(scheduler.pop_due(secs(1)).is_none());

        let first = scheduler.pop_due(secs(10)).unwrap();
        assert_eq!(first.owner, NfId::from("b"));
        assert_eq!(scheduler.now(), secs(2));

        let second = scheduler.pop_due(secs(10)).unwrap();
        assert_eq!(second.owner, NfId::from("a"));
        assert_eq!(scheduler.now(), secs(5));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_fifo_at_equal_times() {
        let mut scheduler = TaskScheduler::new();
        for name in ["a", "b", "c"] {
            scheduler.schedule(secs(1), NfId::from(name), TaskKind::AutoConnect);
        }
        let order: Vec<String> = std::iter::from_fn(|| scheduler.pop_due(secs(1)))
            .map(|task| task.owner.to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cancel_owner() {
        let mut scheduler = TaskScheduler::new();
        let a = NfId::from("a");
        scheduler.schedule(secs(1), a.clone(), TaskKind::BecomeStable);
        scheduler.schedule(secs(2), a.clone(), TaskKind::ProbeComplete(ProbeId(1)));
        scheduler.schedule(secs(3), NfId::from("b"), TaskKind::BecomeStable);

        assert_eq!(scheduler.pending_for(&a).len(), 2);
        let cancelled = scheduler.cancel_owner(&a);
        assert_eq!(cancelled.len(), 2);
        assert!(scheduler.pending_for(&a).is_empty());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cancel_lifecycle_tasks_only() {
        let mut scheduler = TaskScheduler::new();
        let a = NfId::from("a");
        scheduler.schedule(secs(1), a.clone(), TaskKind::AutoConnect);
        scheduler.schedule(secs(2), a.clone(), TaskKind::ProbeComplete(ProbeId(7)));

        let cancelled = scheduler.cancel_owner_where(&a, TaskKind::is_lifecycle);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].kind, TaskKind::AutoConnect);

        let remaining = scheduler.pending_for(&a);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, TaskKind::ProbeComplete(ProbeId(7)));
    }

    #[test]
    fn test_schedule_is_relative_to_now() {
        let mut scheduler = TaskScheduler::new();
        scheduler.advance_to(secs(10));
        let key = scheduler.schedule(secs(5), NfId::from("a"), TaskKind::BecomeStable);
        assert_eq!(key.due, secs(15));

        // Clock never moves backwards
        scheduler.advance_to(secs(3));
        assert_eq!(scheduler.now(), secs(10));

        assert!(scheduler.cancel(key).is_some());
        assert!(scheduler.cancel(key).is_none());
    }
}
