use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::core::{ChartId, ContainerId, Viewport};
use crate::error::{OverlayError, OverlayResult};
use crate::scheduler::{CancellationToken, TaskId};

use super::{DisposalState, MountPolicy, ResizeDebouncer, ResizeFlush};

/// Next step after a failed container lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountRetry {
    RetryAfter(Duration),
    Abandon { attempts: u32 },
}

#[derive(Debug)]
struct ChartLifecycle {
    state: DisposalState,
    token: CancellationToken,
    container: ContainerId,
    mount_attempts: u32,
    abandoned: bool,
    tasks: Vec<TaskId>,
    debouncer: ResizeDebouncer,
    resize_timer: Option<TaskId>,
}

/// Per-chart disposal state, cancellation tokens and tracked tasks.
#[derive(Debug)]
pub struct LifecycleManager {
    charts: IndexMap<ChartId, ChartLifecycle>,
    policy: MountPolicy,
    resize_window: Duration,
    resize_max_wait: Duration,
    next_chart: u64,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(policy: MountPolicy, resize_window: Duration, resize_max_wait: Duration) -> Self {
        Self {
            charts: IndexMap::new(),
            policy,
            resize_window,
            resize_max_wait,
            next_chart: 1,
        }
    }

    #[must_use]
    pub fn policy(&self) -> MountPolicy {
        self.policy
    }

    /// Allocates an identity for a chart about to mount into `container`.
    pub fn register(&mut self, container: ContainerId) -> ChartId {
        let chart = ChartId::new(self.next_chart);
        self.next_chart = self.next_chart.saturating_add(1);
        self.charts.insert(
            chart,
            ChartLifecycle {
                state: DisposalState::Mounting,
                token: CancellationToken::new(),
                container,
                mount_attempts: 0,
                abandoned: false,
                tasks: Vec::new(),
                debouncer: ResizeDebouncer::new(self.resize_window, self.resize_max_wait),
                resize_timer: None,
            },
        );
        chart
    }

    #[must_use]
    pub fn state(&self, chart: ChartId) -> Option<DisposalState> {
        self.charts.get(&chart).map(|entry| entry.state)
    }

    #[must_use]
    pub fn is_live(&self, chart: ChartId) -> bool {
        self.state(chart).is_some_and(DisposalState::is_live)
    }

    #[must_use]
    pub fn is_ready(&self, chart: ChartId) -> bool {
        self.state(chart).is_some_and(DisposalState::is_ready)
    }

    #[must_use]
    pub fn is_abandoned(&self, chart: ChartId) -> bool {
        self.charts.get(&chart).is_some_and(|entry| entry.abandoned)
    }

    /// Token handed to every continuation scheduled for `chart`.
    #[must_use]
    pub fn token(&self, chart: ChartId) -> Option<CancellationToken> {
        self.charts.get(&chart).map(|entry| entry.token.clone())
    }

    #[must_use]
    pub fn container(&self, chart: ChartId) -> Option<&ContainerId> {
        self.charts.get(&chart).map(|entry| &entry.container)
    }

    #[must_use]
    pub fn mount_attempts(&self, chart: ChartId) -> u32 {
        self.charts.get(&chart).map_or(0, |entry| entry.mount_attempts)
    }

    pub fn charts(&self) -> impl Iterator<Item = (ChartId, DisposalState)> + '_ {
        self.charts.iter().map(|(chart, entry)| (*chart, entry.state))
    }

    /// Counts a failed container lookup and decides whether to try again.
    pub fn record_mount_failure(&mut self, chart: ChartId) -> OverlayResult<MountRetry> {
        let policy = self.policy;
        let entry = self.entry_mut(chart)?;
        if entry.state != DisposalState::Mounting {
            return Err(OverlayError::InvalidTransition {
                chart,
                from: entry.state,
                to: DisposalState::Mounting,
            });
        }
        entry.mount_attempts = entry.mount_attempts.saturating_add(1);
        let attempts = entry.mount_attempts;
        if policy.has_attempts_left(attempts) {
            let delay = policy.delay_after(attempts);
            debug!(chart_id = %chart, attempts, delay_ms = delay.as_millis() as u64, "container not ready, retrying mount");
            Ok(MountRetry::RetryAfter(delay))
        } else {
            Ok(MountRetry::Abandon { attempts })
        }
    }

    pub fn mark_ready(&mut self, chart: ChartId) -> OverlayResult<()> {
        let entry = self.entry_mut(chart)?;
        entry.mount_attempts = entry.mount_attempts.saturating_add(1);
        transition(chart, entry, DisposalState::Ready)
    }

    pub fn track(&mut self, chart: ChartId, task: TaskId) {
        if let Some(entry) = self.charts.get_mut(&chart) {
            entry.tasks.push(task);
        }
    }

    pub fn complete(&mut self, chart: ChartId, task: TaskId) {
        if let Some(entry) = self.charts.get_mut(&chart) {
            entry.tasks.retain(|tracked| *tracked != task);
            if entry.resize_timer == Some(task) {
                entry.resize_timer = None;
            }
        }
    }

    #[must_use]
    pub fn tracked_tasks(&self, chart: ChartId) -> usize {
        self.charts.get(&chart).map_or(0, |entry| entry.tasks.len())
    }

    /// Records a resize notification. Returns the flush deadline together
    /// with the previously armed timer, which the caller must cancel.
    pub fn record_resize(
        &mut self,
        chart: ChartId,
        now: Duration,
        size: Option<Viewport>,
    ) -> Option<(Duration, Option<TaskId>)> {
        let entry = self.charts.get_mut(&chart)?;
        if !entry.state.is_ready() {
            return None;
        }
        let previous_deadline = entry.debouncer.deadline();
        let deadline = entry.debouncer.record(now, size);
        if previous_deadline == Some(deadline) && entry.resize_timer.is_some() {
            return None;
        }
        let previous = entry.resize_timer.take();
        if let Some(previous) = previous {
            entry.tasks.retain(|tracked| *tracked != previous);
        }
        Some((deadline, previous))
    }

    pub fn arm_resize_timer(&mut self, chart: ChartId, task: TaskId) {
        if let Some(entry) = self.charts.get_mut(&chart) {
            entry.resize_timer = Some(task);
            entry.tasks.push(task);
        }
    }

    pub fn flush_resize(&mut self, chart: ChartId, now: Duration) -> Option<ResizeFlush> {
        let entry = self.charts.get_mut(&chart)?;
        if !entry.state.is_ready() {
            return None;
        }
        entry.debouncer.flush(now)
    }

    /// `Mounting | Ready -> Disposing`: cancels the chart's token and hands
    /// back every tracked task for cancellation.
    pub fn begin_dispose(&mut self, chart: ChartId) -> OverlayResult<Vec<TaskId>> {
        let entry = self.entry_mut(chart)?;
        transition(chart, entry, DisposalState::Disposing)?;
        entry.token.cancel();
        entry.debouncer.reset();
        entry.resize_timer = None;
        Ok(std::mem::take(&mut entry.tasks))
    }

    /// `Disposing -> Disposed`.
    pub fn finish_dispose(&mut self, chart: ChartId) -> OverlayResult<()> {
        let entry = self.entry_mut(chart)?;
        transition(chart, entry, DisposalState::Disposed)
    }

    /// Gives up on a chart whose container never appeared.
    pub fn abandon(&mut self, chart: ChartId) -> OverlayResult<Vec<TaskId>> {
        let tasks = self.begin_dispose(chart)?;
        self.finish_dispose(chart)?;
        let entry = self.entry_mut(chart)?;
        entry.abandoned = true;
        let error = OverlayError::MountTimeout {
            chart,
            attempts: entry.mount_attempts,
        };
        warn!(chart_id = %chart, container = %entry.container, error = %error, "mount abandoned");
        Ok(tasks)
    }

    /// Why an abandoned chart never mounted.
    #[must_use]
    pub fn mount_error(&self, chart: ChartId) -> Option<OverlayError> {
        self.charts
            .get(&chart)
            .filter(|entry| entry.abandoned)
            .map(|entry| OverlayError::MountTimeout {
                chart,
                attempts: entry.mount_attempts,
            })
    }

    /// Drops bookkeeping for disposed charts.
    pub fn purge_disposed(&mut self) -> usize {
        let before = self.charts.len();
        self.charts
            .retain(|_, entry| entry.state != DisposalState::Disposed);
        before - self.charts.len()
    }

    fn entry_mut(&mut self, chart: ChartId) -> OverlayResult<&mut ChartLifecycle> {
        self.charts
            .get_mut(&chart)
            .ok_or(OverlayError::UnknownChart(chart))
    }
}

fn transition(chart: ChartId, entry: &mut ChartLifecycle, to: DisposalState) -> OverlayResult<()> {
    if !entry.state.can_transition_to(to) {
        return Err(OverlayError::InvalidTransition {
            chart,
            from: entry.state,
            to,
        });
    }
    debug!(chart_id = %chart, from = ?entry.state, to = ?to, "lifecycle transition");
    entry.state = to;
    Ok(())
}
