use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::core::{ChartId, Viewport};
use crate::error::{OverlayError, OverlayResult};
use crate::host::{HostEvent, ViewportChangeReason};
use crate::lifecycle::LifecycleManager;
use crate::scheduler::FrameScheduler;
use crate::snapshot::SnapshotBuilder;
use crate::sync::{Applied, RelayOutcome, SyncTargets, SyncUpdate, sibling_crosshair_point};

use super::registry::{ChartInstance, RegistryEvent, request_repaint};
use super::{ChartRegistry, RegistryTask};

impl ChartRegistry {
    /// Drains every Ready host's notifications and handles them in arrival
    /// order. Returns how many notifications were handled.
    pub fn pump_events(&mut self) -> usize {
        let externally_disposed: Vec<ChartId> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.host.is_disposed())
            .map(|(chart, _)| *chart)
            .collect();
        for chart in externally_disposed {
            debug!(chart_id = %chart, "host disposed externally, tearing chart down");
            if let Err(err) = self.dispose(chart) {
                debug!(chart_id = %chart, error = %err, "teardown after external dispose failed");
            }
        }

        for (chart, instance) in &mut self.instances {
            self.backlog
                .extend(instance.host.take_notifications().into_iter().map(|event| (*chart, event)));
        }

        let mut handled = 0;
        while let Some((chart, event)) = self.backlog.pop_front() {
            self.handle_host_event(chart, event);
            handled += 1;
        }
        handled
    }

    /// Handles one notification from `chart`: local invalidation, debounced
    /// resize, click forwarding, then the sync relay.
    pub fn handle_host_event(&mut self, chart: ChartId, event: HostEvent) -> RelayOutcome {
        if !self.lifecycle.is_ready(chart) {
            trace!(chart_id = %chart, "ignoring notification from chart that is not ready");
            return RelayOutcome::default();
        }

        match &event {
            HostEvent::ViewportChanged(change) => match change.reason {
                ViewportChangeReason::Resize => self.record_resize(chart, change.size),
                ViewportChangeReason::Pan
                | ViewportChangeReason::Zoom
                | ViewportChangeReason::RangeSet => self.invalidate(chart),
            },
            HostEvent::CrosshairMoved(_) => {}
            HostEvent::Clicked(position) => self.emit(&RegistryEvent::Clicked {
                chart,
                position: position.clone(),
            }),
        }

        let mut targets = RelayTargets {
            instances: &mut self.instances,
            lifecycle: &mut self.lifecycle,
            scheduler: &mut self.scheduler,
            snapshots: &mut self.snapshots,
            backlog: &mut self.backlog,
        };
        self.sync.on_event(chart, &event, &mut targets)
    }

    /// Page-side container resize; the host's own notification is debounced.
    pub fn notify_container_resized(&mut self, chart: ChartId, size: Viewport) -> OverlayResult<()> {
        self.require_known(chart)?;
        let Some(instance) = self.instances.get_mut(&chart) else {
            return Ok(());
        };
        if let Err(err) = instance.host.resize(size) {
            debug!(chart_id = %chart, error = %err, "host refused resize");
        }
        Ok(())
    }

    fn record_resize(&mut self, chart: ChartId, size: Option<Viewport>) {
        let now = self.clock.now();
        let Some((deadline, previous)) = self.lifecycle.record_resize(chart, now, size) else {
            return;
        };
        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }
        let Some(token) = self.lifecycle.token(chart) else {
            return;
        };
        let task = self
            .scheduler
            .set_timer(Some(chart), token, deadline, RegistryTask::ResizeFlush { chart });
        self.lifecycle.arm_resize_timer(chart, task);
    }
}

/// The registry's Ready charts as seen by the sync controller.
struct RelayTargets<'a> {
    instances: &'a mut IndexMap<ChartId, ChartInstance>,
    lifecycle: &'a mut LifecycleManager,
    scheduler: &'a mut FrameScheduler<RegistryTask>,
    snapshots: &'a mut SnapshotBuilder,
    backlog: &'a mut VecDeque<(ChartId, HostEvent)>,
}

impl SyncTargets for RelayTargets<'_> {
    fn is_ready(&self, chart: ChartId) -> bool {
        self.lifecycle.is_ready(chart)
            && self
                .instances
                .get(&chart)
                .is_some_and(|instance| !instance.host.is_disposed())
    }

    fn apply(&mut self, chart: ChartId, update: &SyncUpdate) -> OverlayResult<Applied> {
        let instance = self
            .instances
            .get_mut(&chart)
            .ok_or(OverlayError::UnknownChart(chart))?;
        if update.is_shown_by(instance.host.as_ref()) {
            return Ok(Applied::Unchanged);
        }

        // Notifications queued before the relay are the sibling's own.
        let queued = instance.host.take_notifications();
        self.backlog
            .extend(queued.into_iter().map(|event| (chart, event)));

        match update {
            SyncUpdate::TimeRange(range) => {
                instance.host.set_visible_time_range(*range)?;
                self.snapshots.invalidate_chart(chart);
                request_repaint(chart, instance, self.scheduler, self.lifecycle);
            }
            SyncUpdate::Crosshair {
                time,
                price,
                pane,
                axis,
            } => match sibling_crosshair_point(instance.host.as_ref(), *pane, axis, *time, *price) {
                Some((pane, point)) => instance.host.set_crosshair(pane, point, *time, *price)?,
                None => instance.host.clear_crosshair()?,
            },
            SyncUpdate::CrosshairCleared => instance.host.clear_crosshair()?,
        }
        Ok(Applied::Set(instance.host.take_notifications()))
    }
}
