use std::time::Duration;

use indexmap::IndexMap;

use crate::core::ChartId;

use super::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    NextFrame,
    At(Duration),
}

#[derive(Debug)]
struct ScheduledTask<T> {
    owner: Option<ChartId>,
    token: CancellationToken,
    trigger: Trigger,
    payload: T,
}

/// A continuation whose trigger fired, handed back to the caller to run.
#[derive(Debug)]
pub struct DueTask<T> {
    pub id: TaskId,
    pub owner: Option<ChartId>,
    pub token: CancellationToken,
    pub payload: T,
}

/// Frame-paced cooperative scheduler.
///
/// Two kinds of continuations are queued: frame callbacks, released together
/// at the next paint opportunity, and timers, released once their deadline
/// has passed. Paint opportunities are spaced by at least `frame_interval`.
/// Every continuation records its owning chart so teardown can cancel them in
/// bulk.
#[derive(Debug)]
pub struct FrameScheduler<T> {
    tasks: IndexMap<TaskId, ScheduledTask<T>>,
    next_id: u64,
    frame_interval: Duration,
    last_frame_at: Option<Duration>,
    frames_run: u64,
}

impl<T> FrameScheduler<T> {
    #[must_use]
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            tasks: IndexMap::new(),
            next_id: 1,
            frame_interval,
            last_frame_at: None,
            frames_run: 0,
        }
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    #[must_use]
    pub fn frames_run(&self) -> u64 {
        self.frames_run
    }

    pub fn request_frame(
        &mut self,
        owner: Option<ChartId>,
        token: CancellationToken,
        payload: T,
    ) -> TaskId {
        self.push(owner, token, Trigger::NextFrame, payload)
    }

    pub fn set_timer(
        &mut self,
        owner: Option<ChartId>,
        token: CancellationToken,
        due_at: Duration,
        payload: T,
    ) -> TaskId {
        self.push(owner, token, Trigger::At(due_at), payload)
    }

    /// Removes one pending continuation. Returns `true` when it was pending.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.shift_remove(&id).is_some()
    }

    #[must_use]
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    #[must_use]
    pub fn pending_for(&self, owner: ChartId) -> usize {
        self.tasks
            .values()
            .filter(|task| task.owner == Some(owner))
            .count()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn has_frame_work(&self) -> bool {
        self.tasks
            .values()
            .any(|task| task.trigger == Trigger::NextFrame)
    }

    /// Whether a paint opportunity is available at `now` and work awaits it.
    #[must_use]
    pub fn frame_due(&self, now: Duration) -> bool {
        if !self.has_frame_work() {
            return false;
        }
        match self.last_frame_at {
            Some(last) => now >= last.saturating_add(self.frame_interval),
            None => true,
        }
    }

    /// Earliest instant at which a timer or frame becomes runnable.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        let next_timer = self
            .tasks
            .values()
            .filter_map(|task| match task.trigger {
                Trigger::At(due) => Some(due),
                Trigger::NextFrame => None,
            })
            .min();
        let next_frame = self.has_frame_work().then(|| {
            self.last_frame_at
                .map_or(Duration::ZERO, |last| last.saturating_add(self.frame_interval))
        });
        match (next_timer, next_frame) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Releases timers whose deadline is `<= now`, earliest first.
    pub fn take_due_timers(&mut self, now: Duration) -> Vec<DueTask<T>> {
        let mut due_ids: Vec<(Duration, TaskId)> = self
            .tasks
            .iter()
            .filter_map(|(id, task)| match task.trigger {
                Trigger::At(due) if due <= now => Some((due, *id)),
                _ => None,
            })
            .collect();
        due_ids.sort();
        due_ids
            .into_iter()
            .filter_map(|(_, id)| self.take(id))
            .collect()
    }

    /// Opens a paint opportunity at `now` and releases every frame callback
    /// queued before it, in request order. Callbacks requested while the
    /// returned batch runs wait for the next opportunity.
    pub fn take_frame(&mut self, now: Duration) -> Vec<DueTask<T>> {
        self.last_frame_at = Some(now);
        self.frames_run = self.frames_run.saturating_add(1);
        let frame_ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.trigger == Trigger::NextFrame)
            .map(|(id, _)| *id)
            .collect();
        frame_ids
            .into_iter()
            .filter_map(|id| self.take(id))
            .collect()
    }

    fn take(&mut self, id: TaskId) -> Option<DueTask<T>> {
        let task = self.tasks.shift_remove(&id)?;
        Some(DueTask {
            id,
            owner: task.owner,
            token: task.token,
            payload: task.payload,
        })
    }

    fn push(
        &mut self,
        owner: Option<ChartId>,
        token: CancellationToken,
        trigger: Trigger,
        payload: T,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.tasks.insert(
            id,
            ScheduledTask {
                owner,
                token,
                trigger,
                payload,
            },
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::FrameScheduler;
    use crate::scheduler::CancellationToken;

    #[test]
    fn frames_are_paced_by_interval() {
        let mut scheduler = FrameScheduler::new(Duration::from_millis(16));
        let token = CancellationToken::new();
        scheduler.request_frame(None, token.clone(), "a");
        assert!(scheduler.frame_due(Duration::ZERO));
        assert_eq!(scheduler.take_frame(Duration::ZERO).len(), 1);

        scheduler.request_frame(None, token, "b");
        assert!(!scheduler.frame_due(Duration::from_millis(10)));
        assert!(scheduler.frame_due(Duration::from_millis(16)));
    }

    #[test]
    fn timers_release_in_deadline_order() {
        let mut scheduler = FrameScheduler::new(Duration::from_millis(16));
        let token = CancellationToken::new();
        scheduler.set_timer(None, token.clone(), Duration::from_millis(30), 3);
        scheduler.set_timer(None, token.clone(), Duration::from_millis(10), 1);
        scheduler.set_timer(None, token, Duration::from_millis(50), 5);
        let due: Vec<i32> = scheduler
            .take_due_timers(Duration::from_millis(40))
            .into_iter()
            .map(|task| task.payload)
            .collect();
        assert_eq!(due, vec![1, 3]);
        assert_eq!(scheduler.pending_len(), 1);
    }
}
