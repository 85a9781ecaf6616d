use std::rc::Rc;

use tracing::trace;

use crate::binder::LegendPlacement;
use crate::core::{ChartId, Viewport};
use crate::error::{OverlayError, OverlayResult};
use crate::overlay::{PaintStats, PrimitiveRenderer, RedrawDirective, VisualPrimitive};
use crate::snapshot::{
    CoordinateSnapshot, InvalidationListener, SnapshotCacheStats, SnapshotCallback, SnapshotKey,
    SnapshotOptions, SnapshotRequest, SubscriptionId,
};
use crate::sync::{SyncFlags, SyncGroupId, SyncGroupStats};

use super::registry::{apply_directive, request_repaint};
use super::{ChartRegistry, RegistryTask};

impl ChartRegistry {
    /// Replaces the chart's primitives. Before the chart is Ready they become
    /// its initial primitives; after disposal the call is a no-op.
    pub fn set_primitives(&mut self, chart: ChartId, primitives: Vec<VisualPrimitive>) -> OverlayResult<()> {
        self.require_known(chart)?;
        if let Some(config) = self.mounting.get_mut(&chart) {
            config.primitives = primitives;
            return Ok(());
        }
        self.mutate_renderer(chart, |renderer| renderer.set_primitives(primitives));
        Ok(())
    }

    pub fn add_primitive(&mut self, chart: ChartId, primitive: VisualPrimitive) -> OverlayResult<()> {
        self.require_known(chart)?;
        if let Some(config) = self.mounting.get_mut(&chart) {
            config.primitives.push(primitive);
            return Ok(());
        }
        self.mutate_renderer(chart, |renderer| renderer.add_primitive(primitive));
        Ok(())
    }

    /// Returns whether a primitive with `id` was removed.
    pub fn remove_primitive(&mut self, chart: ChartId, id: &str) -> OverlayResult<bool> {
        self.require_known(chart)?;
        if let Some(config) = self.mounting.get_mut(&chart) {
            let before = config.primitives.len();
            config
                .primitives
                .retain(|primitive| primitive.id.as_deref() != Some(id));
            return Ok(before != config.primitives.len());
        }
        let mut removed = false;
        self.mutate_renderer(chart, |renderer| match renderer.remove_primitive(id) {
            Some(directive) => {
                removed = true;
                directive
            }
            None => RedrawDirective::Unchanged,
        });
        Ok(removed)
    }

    pub fn clear_primitives(&mut self, chart: ChartId) -> OverlayResult<()> {
        self.require_known(chart)?;
        if let Some(config) = self.mounting.get_mut(&chart) {
            config.primitives.clear();
            return Ok(());
        }
        self.mutate_renderer(chart, PrimitiveRenderer::clear);
        Ok(())
    }

    /// Requests a repaint; any number of calls before the next paint
    /// opportunity produce a single paint pass.
    pub fn schedule_redraw(&mut self, chart: ChartId) -> OverlayResult<()> {
        self.require_known(chart)?;
        self.mutate_renderer(chart, PrimitiveRenderer::schedule_redraw);
        Ok(())
    }

    #[must_use]
    pub fn primitives(&self, chart: ChartId) -> Option<&[VisualPrimitive]> {
        self.instances
            .get(&chart)
            .map(|instance| instance.renderer.primitives())
    }

    #[must_use]
    pub fn paint_stats(&self, chart: ChartId) -> Option<PaintStats> {
        self.instances
            .get(&chart)
            .map(|instance| instance.renderer.stats())
    }

    #[must_use]
    pub fn paint_failures(&self) -> u64 {
        self.paint_failures
    }

    /// Snapshot of the chart's current layout.
    ///
    /// A cache hit is returned as [`SnapshotRequest::Ready`]; a miss is
    /// computed at the next paint opportunity and handed to `on_ready`.
    /// Charts that are not Ready answer with an empty fallback snapshot.
    pub fn get_snapshot(
        &mut self,
        chart: ChartId,
        options: SnapshotOptions,
        on_ready: Option<SnapshotCallback>,
    ) -> OverlayResult<SnapshotRequest> {
        self.require_known(chart)?;
        let now = self.clock.now();
        let (Some(instance), Some(token)) = (self.instances.get(&chart), self.lifecycle.token(chart)) else {
            trace!(chart_id = %chart, "snapshot requested for chart that is not ready");
            return Ok(SnapshotRequest::Ready(Rc::new(CoordinateSnapshot::fallback(
                Viewport::default(),
                now,
            ))));
        };
        let key = SnapshotKey::new(chart, instance.container.id.clone());
        let request = self.snapshots.get_snapshot(key, options, now, on_ready);
        if let SnapshotRequest::Pending {
            key,
            schedule: true,
        } = &request
        {
            let task = self.scheduler.request_frame(
                Some(chart),
                token,
                RegistryTask::ComputeSnapshot { key: key.clone() },
            );
            self.lifecycle.track(chart, task);
        }
        Ok(request)
    }

    /// Evicts the chart's cached snapshots, notifies invalidation
    /// subscribers and schedules a repaint.
    pub fn invalidate(&mut self, chart: ChartId) {
        self.snapshots.invalidate_chart(chart);
        if let Some(instance) = self.instances.get_mut(&chart) {
            request_repaint(chart, instance, &mut self.scheduler, &mut self.lifecycle);
        }
    }

    /// Evicts every cached snapshot and repaints every Ready chart.
    pub fn clear_snapshot_cache(&mut self) {
        self.snapshots.clear();
        for (chart, instance) in &mut self.instances {
            request_repaint(*chart, instance, &mut self.scheduler, &mut self.lifecycle);
        }
    }

    pub fn subscribe_invalidation(
        &mut self,
        chart: ChartId,
        listener: InvalidationListener,
    ) -> OverlayResult<SubscriptionId> {
        self.require_known(chart)?;
        Ok(self.snapshots.subscribe_invalidation(chart, listener))
    }

    pub fn unsubscribe_invalidation(&mut self, id: SubscriptionId) -> bool {
        self.snapshots.unsubscribe(id)
    }

    #[must_use]
    pub fn cache_stats(&self) -> SnapshotCacheStats {
        self.snapshots.cache().stats()
    }

    #[must_use]
    pub fn snapshot_computations(&self) -> u64 {
        self.snapshots.computations()
    }

    /// Legend placements from the cached snapshot; `None` while the snapshot
    /// is being computed.
    pub fn legend_placements(&mut self, chart: ChartId) -> OverlayResult<Option<Vec<LegendPlacement>>> {
        match self.get_snapshot(chart, SnapshotOptions::default(), None)? {
            SnapshotRequest::Ready(snapshot) => Ok(self
                .instances
                .get(&chart)
                .map(|instance| instance.binder.place(&snapshot))),
            SnapshotRequest::Pending { .. } => Ok(None),
        }
    }

    pub fn join_sync(
        &mut self,
        chart: ChartId,
        group: SyncGroupId,
        flags: Option<SyncFlags>,
    ) -> OverlayResult<bool> {
        let state = self.require_known(chart)?;
        if !state.is_live() {
            return Ok(false);
        }
        if let Some(config) = self.mounting.get_mut(&chart) {
            config.sync.push(crate::config::SyncMembership { group, flags });
            return Ok(true);
        }
        Ok(self.sync.join_with_flags(group, chart, flags))
    }

    pub fn leave_sync(&mut self, chart: ChartId, group: &SyncGroupId) -> OverlayResult<bool> {
        self.require_known(chart)?;
        if let Some(config) = self.mounting.get_mut(&chart) {
            let before = config.sync.len();
            config.sync.retain(|membership| &membership.group != group);
            return Ok(before != config.sync.len());
        }
        Ok(self.sync.leave(group, chart))
    }

    pub fn set_sync_flags(&mut self, group: &SyncGroupId, flags: SyncFlags) -> OverlayResult<()> {
        if self.sync.set_flags(group, flags) {
            Ok(())
        } else {
            Err(OverlayError::UnknownGroup(group.clone()))
        }
    }

    #[must_use]
    pub fn sync_stats(&self, group: &SyncGroupId) -> Option<SyncGroupStats> {
        self.sync.stats(group)
    }

    fn mutate_renderer(
        &mut self,
        chart: ChartId,
        mutation: impl FnOnce(&mut PrimitiveRenderer) -> RedrawDirective,
    ) {
        let Some(instance) = self.instances.get_mut(&chart) else {
            trace!(chart_id = %chart, "primitive update for chart that is not ready");
            return;
        };
        let directive = mutation(&mut instance.renderer);
        apply_directive(chart, directive, instance, &mut self.scheduler, &mut self.lifecycle);
    }
}
