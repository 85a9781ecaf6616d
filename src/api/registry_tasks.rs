use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::binder::PositionBinder;
use crate::core::ChartId;
use crate::host::Container;
use crate::lifecycle::{DisposalState, MountRetry};
use crate::overlay::PrimitiveRenderer;
use crate::scheduler::DueTask;
use crate::snapshot::SnapshotKey;

use super::registry::{ChartInstance, RegistryEvent, apply_directive, request_repaint};
use super::ChartRegistry;

/// Continuation queued on the registry's frame scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryTask {
    MountRetry { chart: ChartId },
    ComputeSnapshot { key: SnapshotKey },
    Repaint { chart: ChartId },
    ResizeFlush { chart: ChartId },
    CacheSweep,
}

impl RegistryTask {
    /// Order inside one paint opportunity: snapshots before repaints.
    #[must_use]
    pub fn phase(&self) -> u8 {
        match self {
            Self::ComputeSnapshot { .. } => 0,
            Self::Repaint { .. } => 1,
            Self::MountRetry { .. } | Self::ResizeFlush { .. } | Self::CacheSweep => 2,
        }
    }
}

/// Work performed by one [`ChartRegistry::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub events: usize,
    pub timers_run: usize,
    pub frame_tasks_run: usize,
    pub stale_skipped: usize,
    pub paints: usize,
}

impl TickReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.events == 0 && self.timers_run == 0 && self.frame_tasks_run == 0
    }
}

impl ChartRegistry {
    /// Processes pending notifications, due timers, and the paint
    /// opportunity if one is available at the current clock time.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            events: self.pump_events(),
            ..TickReport::default()
        };
        let now = self.clock.now();

        for task in self.scheduler.take_due_timers(now) {
            if self.run_due(task, now, &mut report) {
                report.timers_run += 1;
            }
        }

        if self.scheduler.frame_due(now) {
            let mut batch = self.scheduler.take_frame(now);
            batch.sort_by_key(|task| task.payload.phase());
            for task in batch {
                if self.run_due(task, now, &mut report) {
                    report.frame_tasks_run += 1;
                }
            }
        }
        report
    }

    /// Earliest clock time at which [`Self::tick`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    #[must_use]
    pub fn frames_run(&self) -> u64 {
        self.scheduler.frames_run()
    }

    /// Runs one continuation unless its chart went away after scheduling.
    fn run_due(&mut self, task: DueTask<RegistryTask>, now: Duration, report: &mut TickReport) -> bool {
        if let Some(owner) = task.owner {
            self.lifecycle.complete(owner, task.id);
        }
        if task.token.is_cancelled() {
            report.stale_skipped += 1;
            trace!(task = ?task.payload, "skipping stale continuation");
            return false;
        }
        match task.payload {
            RegistryTask::MountRetry { chart } => {
                if self.lifecycle.state(chart) == Some(DisposalState::Mounting) {
                    self.try_mount(chart);
                }
            }
            RegistryTask::ComputeSnapshot { key } => {
                let Some(instance) = self.instances.get(&key.chart) else {
                    report.stale_skipped += 1;
                    return false;
                };
                self.snapshots.resolve(
                    &key,
                    &task.token,
                    instance.host.as_ref(),
                    &instance.container,
                    now,
                );
            }
            RegistryTask::Repaint { chart } => {
                if self.repaint(chart, now) {
                    report.paints += 1;
                }
            }
            RegistryTask::ResizeFlush { chart } => self.flush_resize(chart, now),
            RegistryTask::CacheSweep => {
                self.snapshots.sweep(now);
                self.sweep_task = None;
                self.arm_cache_sweep();
            }
        }
        true
    }

    fn repaint(&mut self, chart: ChartId, now: Duration) -> bool {
        let Some(instance) = self.instances.get_mut(&chart) else {
            return false;
        };
        if !self.lifecycle.is_ready(chart) {
            instance.renderer.cancel_pending();
            return false;
        }
        let key = SnapshotKey::new(chart, instance.container.id.clone());
        let snapshot =
            self.snapshots
                .snapshot_for_paint(&key, instance.host.as_ref(), &instance.container, now);
        if let Err(err) = instance.renderer.paint(instance.host.as_ref(), &snapshot) {
            self.paint_failures = self.paint_failures.saturating_add(1);
            warn!(chart_id = %chart, error = %err, "overlay paint failed");
            return false;
        }
        true
    }

    fn flush_resize(&mut self, chart: ChartId, now: Duration) {
        let Some(flush) = self.lifecycle.flush_resize(chart, now) else {
            return;
        };
        let Some(instance) = self.instances.get_mut(&chart) else {
            return;
        };
        if let Some(size) = flush.size {
            instance.container.size = size;
        }
        debug!(chart_id = %chart, notifications = flush.notifications, "resize burst flushed");
        self.snapshots.invalidate_chart(chart);
        request_repaint(chart, instance, &mut self.scheduler, &mut self.lifecycle);
    }

    pub(super) fn arm_cache_sweep(&mut self) {
        if self.sweep_task.is_some() {
            return;
        }
        let due = self.clock.now() + self.config.cache_sweep_interval();
        let task = self
            .scheduler
            .set_timer(None, self.registry_token.clone(), due, RegistryTask::CacheSweep);
        self.sweep_task = Some(task);
    }

    /// One container lookup; on success the chart becomes Ready.
    pub(super) fn try_mount(&mut self, chart: ChartId) {
        let Some(container_id) = self.lifecycle.container(chart).cloned() else {
            return;
        };
        let mounted = match self.locator.locate(&container_id) {
            Some(size) => {
                let container = Container::new(container_id.clone(), size);
                let config = self.mounting.get(&chart).cloned().unwrap_or_default();
                match self.factory.create(chart, &container, &config) {
                    Ok(mounted) => Some((container, config, mounted)),
                    Err(err) => {
                        warn!(chart_id = %chart, error = %err, "host chart creation failed");
                        None
                    }
                }
            }
            None => None,
        };

        let Some((container, config, mounted)) = mounted else {
            self.schedule_mount_retry(chart);
            return;
        };

        if let Err(err) = self.lifecycle.mark_ready(chart) {
            warn!(chart_id = %chart, error = %err, "discarding late mount");
            let mut host = mounted.host;
            host.dispose();
            return;
        }
        self.mounting.remove(&chart);

        let binder = PositionBinder::new(config.legends, config.series).unwrap_or_else(|err| {
            warn!(chart_id = %chart, error = %err, "ignoring invalid legend bindings");
            PositionBinder::default()
        });
        let mut instance = ChartInstance {
            host: mounted.host,
            container,
            renderer: PrimitiveRenderer::attach(chart, mounted.surface),
            binder,
        };
        let directive = instance.renderer.set_primitives(config.primitives);
        apply_directive(chart, directive, &mut instance, &mut self.scheduler, &mut self.lifecycle);
        self.instances.insert(chart, instance);

        for membership in config.sync {
            self.sync.join_with_flags(membership.group, chart, membership.flags);
        }
        debug!(chart_id = %chart, attempts = self.lifecycle.mount_attempts(chart), "chart mounted");
        self.emit(&RegistryEvent::Mounted { chart });
    }

    fn schedule_mount_retry(&mut self, chart: ChartId) {
        match self.lifecycle.record_mount_failure(chart) {
            Ok(MountRetry::RetryAfter(delay)) => {
                let Some(token) = self.lifecycle.token(chart) else {
                    return;
                };
                let due = self.clock.now() + delay;
                let task = self.scheduler.set_timer(
                    Some(chart),
                    token,
                    due,
                    RegistryTask::MountRetry { chart },
                );
                self.lifecycle.track(chart, task);
            }
            Ok(MountRetry::Abandon { attempts }) => {
                match self.lifecycle.abandon(chart) {
                    Ok(tasks) => {
                        for task in tasks {
                            self.scheduler.cancel(task);
                        }
                    }
                    Err(err) => warn!(chart_id = %chart, error = %err, "abandon failed"),
                }
                self.mounting.remove(&chart);
                self.emit(&RegistryEvent::MountAbandoned { chart, attempts });
            }
            Err(err) => debug!(chart_id = %chart, error = %err, "mount retry dropped"),
        }
    }
}
