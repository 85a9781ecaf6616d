use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::binder::PositionBinder;
use crate::config::{ChartConfig, OverlayRuntimeConfig};
use crate::core::{ChartId, ContainerId};
use crate::error::{OverlayError, OverlayResult};
use crate::host::{Container, ContainerLocator, CrosshairPosition, HostChart, HostChartFactory, HostEvent};
use crate::lifecycle::{DisposalState, LifecycleManager};
use crate::overlay::{PrimitiveRenderer, RedrawDirective};
use crate::scheduler::{CancellationToken, Clock, FrameScheduler, TaskId};
use crate::snapshot::SnapshotBuilder;
use crate::sync::SyncController;

use super::RegistryTask;

/// Notification published to registry subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Mounted { chart: ChartId },
    MountAbandoned { chart: ChartId, attempts: u32 },
    Disposed { chart: ChartId },
    Clicked { chart: ChartId, position: CrosshairPosition },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type RegistryListener = Box<dyn FnMut(&RegistryEvent)>;

/// A mounted chart together with everything the registry holds for it.
pub(super) struct ChartInstance {
    pub(super) host: Box<dyn HostChart>,
    pub(super) container: Container,
    pub(super) renderer: PrimitiveRenderer,
    pub(super) binder: PositionBinder,
}

/// Owner of every chart instance on a page.
///
/// The registry is the page bridge (`attach`/`dispose`), pumps host
/// notifications, and drives the frame loop. Hosts are owned here and lent to
/// the snapshot builder, renderers and sync controller one call at a time.
pub struct ChartRegistry {
    pub(super) config: OverlayRuntimeConfig,
    pub(super) clock: Rc<dyn Clock>,
    pub(super) locator: Box<dyn ContainerLocator>,
    pub(super) factory: Box<dyn HostChartFactory>,
    pub(super) lifecycle: LifecycleManager,
    pub(super) scheduler: FrameScheduler<RegistryTask>,
    pub(super) snapshots: SnapshotBuilder,
    pub(super) sync: SyncController,
    pub(super) instances: IndexMap<ChartId, ChartInstance>,
    pub(super) mounting: HashMap<ChartId, ChartConfig>,
    pub(super) backlog: VecDeque<(ChartId, HostEvent)>,
    pub(super) listeners: Vec<(ListenerId, RegistryListener)>,
    pub(super) next_listener: u64,
    pub(super) registry_token: CancellationToken,
    pub(super) sweep_task: Option<TaskId>,
    pub(super) paint_failures: u64,
}

impl ChartRegistry {
    pub fn new(
        config: OverlayRuntimeConfig,
        clock: Rc<dyn Clock>,
        locator: Box<dyn ContainerLocator>,
        factory: Box<dyn HostChartFactory>,
    ) -> OverlayResult<Self> {
        config.validate()?;
        let mut registry = Self {
            config,
            clock,
            locator,
            factory,
            lifecycle: LifecycleManager::new(
                config.mount,
                config.resize_debounce(),
                config.resize_max_wait(),
            ),
            scheduler: FrameScheduler::new(config.frame_interval()),
            snapshots: SnapshotBuilder::new(config.snapshot_ttl()),
            sync: SyncController::new(),
            instances: IndexMap::new(),
            mounting: HashMap::new(),
            backlog: VecDeque::new(),
            listeners: Vec::new(),
            next_listener: 1,
            registry_token: CancellationToken::new(),
            sweep_task: None,
            paint_failures: 0,
        };
        registry.arm_cache_sweep();
        Ok(registry)
    }

    #[must_use]
    pub fn config(&self) -> OverlayRuntimeConfig {
        self.config
    }

    /// Starts mounting a chart into `container`.
    ///
    /// The first container lookup happens immediately; later ones follow the
    /// mount policy's backoff. A chart whose container never appears is
    /// abandoned and reported through [`RegistryEvent::MountAbandoned`].
    pub fn attach(&mut self, container: ContainerId, config: ChartConfig) -> ChartId {
        let chart = self.lifecycle.register(container.clone());
        info!(chart_id = %chart, container = %container, "attaching chart");
        self.mounting.insert(chart, config);
        self.try_mount(chart);
        chart
    }

    /// [`Self::attach`] with a JSON chart config (versioned or bare).
    pub fn attach_json(&mut self, container: ContainerId, config_json: &str) -> OverlayResult<ChartId> {
        let config = ChartConfig::from_json_str(config_json)?;
        Ok(self.attach(container, config))
    }

    /// Tears a chart down.
    ///
    /// Pending work is cancelled, sync memberships and invalidation
    /// subscriptions are dropped, and the renderer is destroyed before the
    /// chart reaches `Disposed`. Disposing twice is a no-op.
    pub fn dispose(&mut self, chart: ChartId) -> OverlayResult<()> {
        let state = self
            .lifecycle
            .state(chart)
            .ok_or(OverlayError::UnknownChart(chart))?;
        if !state.is_live() {
            debug!(chart_id = %chart, ?state, "dispose ignored");
            return Ok(());
        }

        let tasks = self.lifecycle.begin_dispose(chart)?;
        let cancelled = tasks
            .into_iter()
            .filter(|task| self.scheduler.cancel(*task))
            .count();
        self.sync.leave_all(chart);
        self.snapshots.forget_chart(chart);
        self.backlog.retain(|(owner, _)| *owner != chart);
        self.mounting.remove(&chart);
        if let Some(mut instance) = self.instances.shift_remove(&chart) {
            instance.renderer.destroy();
            instance.host.dispose();
        }
        self.lifecycle.finish_dispose(chart)?;
        info!(chart_id = %chart, cancelled, "chart disposed");
        self.emit(&RegistryEvent::Disposed { chart });
        Ok(())
    }

    #[must_use]
    pub fn chart_state(&self, chart: ChartId) -> Option<DisposalState> {
        self.lifecycle.state(chart)
    }

    #[must_use]
    pub fn is_abandoned(&self, chart: ChartId) -> bool {
        self.lifecycle.is_abandoned(chart)
    }

    /// [`OverlayError::MountTimeout`] for a chart that was abandoned.
    #[must_use]
    pub fn mount_error(&self, chart: ChartId) -> Option<OverlayError> {
        self.lifecycle.mount_error(chart)
    }

    #[must_use]
    pub fn mount_attempts(&self, chart: ChartId) -> u32 {
        self.lifecycle.mount_attempts(chart)
    }

    pub fn charts(&self) -> impl Iterator<Item = (ChartId, DisposalState)> + '_ {
        self.lifecycle.charts()
    }

    /// Borrowed host of a mounted chart.
    #[must_use]
    pub fn host(&self, chart: ChartId) -> Option<&dyn HostChart> {
        self.instances.get(&chart).map(|instance| instance.host.as_ref())
    }

    #[must_use]
    pub fn container(&self, chart: ChartId) -> Option<&Container> {
        self.instances.get(&chart).map(|instance| &instance.container)
    }

    /// Continuations still queued for `chart`.
    #[must_use]
    pub fn pending_tasks(&self, chart: ChartId) -> usize {
        self.scheduler.pending_for(chart)
    }

    /// Drops lifecycle bookkeeping of disposed and abandoned charts.
    pub fn purge_disposed(&mut self) -> usize {
        self.lifecycle.purge_disposed()
    }

    pub fn subscribe(&mut self, listener: RegistryListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.saturating_add(1);
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        before != self.listeners.len()
    }

    pub(super) fn emit(&mut self, event: &RegistryEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub(super) fn require_known(&self, chart: ChartId) -> OverlayResult<DisposalState> {
        self.lifecycle
            .state(chart)
            .ok_or(OverlayError::UnknownChart(chart))
    }
}

/// Marks the chart's overlay dirty and asks for a frame if none is queued.
pub(super) fn request_repaint(
    chart: ChartId,
    instance: &mut ChartInstance,
    scheduler: &mut FrameScheduler<RegistryTask>,
    lifecycle: &mut LifecycleManager,
) {
    let directive = instance.renderer.schedule_redraw();
    apply_directive(chart, directive, instance, scheduler, lifecycle);
}

/// Queues the repaint frame a renderer mutation asked for.
pub(super) fn apply_directive(
    chart: ChartId,
    directive: RedrawDirective,
    instance: &mut ChartInstance,
    scheduler: &mut FrameScheduler<RegistryTask>,
    lifecycle: &mut LifecycleManager,
) {
    if !directive.needs_frame() {
        return;
    }
    let Some(token) = lifecycle.token(chart) else {
        warn!(chart_id = %chart, "repaint requested for unknown chart");
        instance.renderer.cancel_pending();
        return;
    };
    let task = scheduler.request_frame(Some(chart), token, RegistryTask::Repaint { chart });
    lifecycle.track(chart, task);
}
