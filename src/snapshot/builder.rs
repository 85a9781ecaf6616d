use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::core::{ChartId, PaneId, PixelRect};
use crate::host::{AxisSide, Container, HostChart, HostResult};
use crate::scheduler::CancellationToken;

use super::{CoordinateSnapshot, PaneBounds, PriceAxisBounds, SnapshotCache, SnapshotKey};

pub type SnapshotCallback = Box<dyn FnOnce(Rc<CoordinateSnapshot>)>;
pub type InvalidationListener = Box<dyn FnMut(ChartId)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Serve from and store into the cache.
    pub use_cache: bool,
    /// Clamp out-of-range geometry before returning it.
    pub validate: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            validate: true,
        }
    }
}

#[derive(Debug)]
pub enum SnapshotRequest {
    Ready(Rc<CoordinateSnapshot>),
    /// The computation runs at the next paint opportunity. `schedule` is set
    /// only for the first request of a key; later ones join the same flight.
    Pending { key: SnapshotKey, schedule: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct InFlight {
    options: SnapshotOptions,
    waiters: Vec<SnapshotCallback>,
}

struct Subscription {
    id: SubscriptionId,
    chart: ChartId,
    listener: InvalidationListener,
}

/// Builds coordinate snapshots from host geometry and owns their cache.
pub struct SnapshotBuilder {
    cache: SnapshotCache,
    in_flight: HashMap<SnapshotKey, InFlight>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
    computations: u64,
    fallbacks: u64,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: SnapshotCache::new(ttl),
            in_flight: HashMap::new(),
            subscriptions: Vec::new(),
            next_subscription: 1,
            computations: 0,
            fallbacks: 0,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    #[must_use]
    pub fn computations(&self) -> u64 {
        self.computations
    }

    #[must_use]
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &SnapshotKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Serves a cached snapshot or registers `on_ready` for the deferred
    /// computation.
    pub fn get_snapshot(
        &mut self,
        key: SnapshotKey,
        options: SnapshotOptions,
        now: Duration,
        on_ready: Option<SnapshotCallback>,
    ) -> SnapshotRequest {
        if options.use_cache {
            if let Some(snapshot) = self.cache.get(&key, now) {
                trace!(chart = %key.chart, "snapshot cache hit");
                return SnapshotRequest::Ready(snapshot);
            }
        }

        let schedule = !self.in_flight.contains_key(&key);
        let flight = self.in_flight.entry(key.clone()).or_insert_with(|| InFlight {
            options,
            waiters: Vec::new(),
        });
        // Requests sharing a flight get the stricter options.
        flight.options.validate |= options.validate;
        flight.options.use_cache &= options.use_cache;
        if let Some(callback) = on_ready {
            flight.waiters.push(callback);
        }
        SnapshotRequest::Pending { key, schedule }
    }

    /// Runs a deferred computation at the paint opportunity.
    ///
    /// Nothing is computed, cached, or delivered when `token` was cancelled or
    /// the host went away after scheduling.
    pub fn resolve(
        &mut self,
        key: &SnapshotKey,
        token: &CancellationToken,
        host: &dyn HostChart,
        container: &Container,
        now: Duration,
    ) -> Option<Rc<CoordinateSnapshot>> {
        let flight = self.in_flight.remove(key)?;
        if token.is_cancelled() || host.is_disposed() {
            debug!(chart = %key.chart, "dropping snapshot computation for disposed chart");
            return None;
        }

        let snapshot = Rc::new(self.compute(key.chart, host, container, now, flight.options.validate));
        if flight.options.use_cache && snapshot.valid {
            self.cache.insert(key.clone(), Rc::clone(&snapshot));
        }
        for waiter in flight.waiters {
            waiter(Rc::clone(&snapshot));
        }
        Some(snapshot)
    }

    /// Snapshot for a repaint already running inside a paint opportunity:
    /// served from cache when fresh, otherwise computed on the spot.
    pub fn snapshot_for_paint(
        &mut self,
        key: &SnapshotKey,
        host: &dyn HostChart,
        container: &Container,
        now: Duration,
    ) -> Rc<CoordinateSnapshot> {
        if let Some(snapshot) = self.cache.get(key, now) {
            return snapshot;
        }
        let snapshot = Rc::new(self.compute(key.chart, host, container, now, true));
        // Fallbacks are never cached so the next paint asks the host again.
        if snapshot.valid && !host.is_disposed() {
            self.cache.insert(key.clone(), Rc::clone(&snapshot));
        }
        snapshot
    }

    /// Queries the host and assembles a snapshot, falling back to zeroed
    /// geometry when any query fails.
    pub fn compute(
        &mut self,
        chart: ChartId,
        host: &dyn HostChart,
        container: &Container,
        now: Duration,
        validate: bool,
    ) -> CoordinateSnapshot {
        self.computations = self.computations.saturating_add(1);
        match query_geometry(host, now) {
            Ok(mut snapshot) => {
                if validate {
                    let repairs = snapshot.repair();
                    if repairs > 0 {
                        debug!(chart = %chart, repairs, "repaired snapshot geometry");
                    }
                }
                snapshot
            }
            Err(err) => {
                self.fallbacks = self.fallbacks.saturating_add(1);
                warn!(chart = %chart, error = %err, "host geometry unavailable, using fallback snapshot");
                CoordinateSnapshot::fallback(container.size, now)
            }
        }
    }

    /// Evicts the chart's snapshots and notifies its invalidation listeners.
    pub fn invalidate_chart(&mut self, chart: ChartId) {
        self.cache.invalidate_chart(chart);
        self.notify(chart);
    }

    /// Evicts every snapshot and notifies every listener.
    pub fn clear(&mut self) {
        self.cache.clear();
        let mut charts: Vec<ChartId> = self.subscriptions.iter().map(|sub| sub.chart).collect();
        charts.sort();
        charts.dedup();
        for chart in charts {
            self.notify(chart);
        }
    }

    pub fn sweep(&mut self, now: Duration) -> usize {
        let removed = self.cache.sweep(now);
        if removed > 0 {
            trace!(removed, "swept expired snapshots");
        }
        removed
    }

    /// Drops everything held for a torn-down chart without notifying anyone.
    pub fn forget_chart(&mut self, chart: ChartId) {
        self.cache.invalidate_chart(chart);
        self.in_flight.retain(|key, _| key.chart != chart);
        self.subscriptions.retain(|sub| sub.chart != chart);
    }

    pub fn subscribe_invalidation(
        &mut self,
        chart: ChartId,
        listener: InvalidationListener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        self.subscriptions.push(Subscription {
            id,
            chart,
            listener,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        before != self.subscriptions.len()
    }

    fn notify(&mut self, chart: ChartId) {
        for sub in self.subscriptions.iter_mut().filter(|sub| sub.chart == chart) {
            (sub.listener)(chart);
        }
    }
}

fn query_geometry(host: &dyn HostChart, now: Duration) -> HostResult<CoordinateSnapshot> {
    let size = host.container_size()?;
    let width = f64::from(size.width);
    let height = f64::from(size.height);
    let time_axis_height = host.time_axis_height()?;
    let axes = host.price_axes()?;

    let side_width = |side: AxisSide| {
        axes.iter()
            .filter(|axis| axis.side == side)
            .map(|axis| axis.width)
            .fold(0.0, f64::max)
    };
    let left_width = side_width(AxisSide::Left);
    let right_width = side_width(AxisSide::Right);
    let content_width = width - left_width - right_width;
    let panes_height = height - time_axis_height;

    let mut price_axes = IndexMap::with_capacity(axes.len());
    for axis in axes {
        let rect = match axis.side {
            AxisSide::Left => PixelRect::new(left_width - axis.width, 0.0, axis.width, panes_height),
            AxisSide::Right => {
                PixelRect::new(left_width + content_width, 0.0, axis.width, panes_height)
            }
            AxisSide::Overlay => PixelRect::new(left_width, 0.0, content_width, panes_height),
        };
        price_axes.insert(
            axis.id,
            PriceAxisBounds {
                side: axis.side,
                rect,
            },
        );
    }

    let pane_count = host.pane_count()?;
    let mut panes = Vec::with_capacity(pane_count);
    for index in 0..pane_count {
        let size = host.pane_size(index)?;
        let offset = host.pane_offset(index)?;
        panes.push(PaneBounds {
            pane: PaneId::new(index as u32),
            rect: PixelRect::new(left_width, offset, size.width, size.height),
        });
    }

    Ok(CoordinateSnapshot {
        container: size,
        time_axis: PixelRect::new(left_width, panes_height, content_width, time_axis_height),
        price_axes,
        panes,
        created_at: now,
        valid: true,
    })
}
