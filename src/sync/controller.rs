use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace, warn};

use crate::core::{ChartId, PaneId, PixelPoint, PriceAxisId, TimeRange};
use crate::error::OverlayResult;
use crate::host::{HostChart, HostEvent, ViewportChangeReason};

use super::{SyncFlags, SyncGroup, SyncGroupId, SyncGroupStats};

/// State pushed onto a sibling chart.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Value-space crosshair; each sibling maps it with its own scales.
    Crosshair {
        time: f64,
        price: f64,
        pane: PaneId,
        axis: PriceAxisId,
    },
    CrosshairCleared,
    TimeRange(TimeRange),
}

impl SyncUpdate {
    /// The update a notification asks for, if `flags` allow relaying it.
    #[must_use]
    pub fn from_event(event: &HostEvent, flags: SyncFlags) -> Option<Self> {
        match event {
            HostEvent::ViewportChanged(change) if flags.time_range => match change.reason {
                ViewportChangeReason::Resize => None,
                ViewportChangeReason::Pan
                | ViewportChangeReason::Zoom
                | ViewportChangeReason::RangeSet => change.visible_range.map(Self::TimeRange),
            },
            HostEvent::CrosshairMoved(Some(position)) if flags.crosshair => Some(Self::Crosshair {
                time: position.time,
                price: position.price,
                pane: position.pane,
                axis: position.axis.clone(),
            }),
            HostEvent::CrosshairMoved(None) if flags.crosshair => Some(Self::CrosshairCleared),
            HostEvent::ViewportChanged(_) | HostEvent::CrosshairMoved(_) | HostEvent::Clicked(_) => {
                None
            }
        }
    }

    /// Whether `host` already shows this state.
    #[must_use]
    pub fn is_shown_by(&self, host: &dyn HostChart) -> bool {
        match self {
            Self::TimeRange(range) => host
                .visible_time_range()
                .is_some_and(|current| current.approx_eq(*range)),
            Self::Crosshair { time, price, .. } => host.crosshair_position().is_some_and(|current| {
                (current.time - time).abs() <= VALUE_EPSILON
                    && (current.price - price).abs() <= VALUE_EPSILON
            }),
            Self::CrosshairCleared => host.crosshair_position().is_none(),
        }
    }
}

const VALUE_EPSILON: f64 = 1e-9;

/// Result of pushing one update onto a sibling.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The sibling already showed that state and nothing was set. Hosts that
    /// report setter changes on a later drain end their echo here.
    Unchanged,
    /// Notifications the sibling emitted while the update was set. Those are
    /// echoes and are never relayed.
    Set(Vec<HostEvent>),
}

/// Charts the controller relays into.
pub trait SyncTargets {
    fn is_ready(&self, chart: ChartId) -> bool;

    fn apply(&mut self, chart: ChartId, update: &SyncUpdate) -> OverlayResult<Applied>;
}

/// Summary of one relay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayOutcome {
    pub relayed: usize,
    pub echoes_dropped: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Relays crosshair and visible-range changes across sync groups.
#[derive(Debug, Default)]
pub struct SyncController {
    groups: IndexMap<SyncGroupId, SyncGroup>,
    memberships: HashMap<ChartId, IndexSet<SyncGroupId>>,
}

impl SyncController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `chart` to `group`, creating the group with default flags.
    pub fn join(&mut self, group: SyncGroupId, chart: ChartId) -> bool {
        self.join_with_flags(group, chart, None)
    }

    /// Adds `chart` to `group`; `flags` overrides the group's flags when set.
    pub fn join_with_flags(
        &mut self,
        group: SyncGroupId,
        chart: ChartId,
        flags: Option<SyncFlags>,
    ) -> bool {
        let entry = self
            .groups
            .entry(group.clone())
            .or_insert_with(|| SyncGroup::new(group.clone(), flags.unwrap_or_default()));
        if let Some(flags) = flags {
            entry.set_flags(flags);
        }
        let inserted = entry.insert(chart);
        if inserted {
            debug!(chart_id = %chart, group = %group, "joined sync group");
            self.memberships.entry(chart).or_default().insert(group);
        }
        inserted
    }

    /// Removes `chart` from `group`; empty groups are dropped.
    pub fn leave(&mut self, group: &SyncGroupId, chart: ChartId) -> bool {
        let Some(entry) = self.groups.get_mut(group) else {
            return false;
        };
        let removed = entry.remove(chart);
        if entry.is_empty() {
            self.groups.shift_remove(group);
        }
        if let Some(groups) = self.memberships.get_mut(&chart) {
            groups.shift_remove(group);
            if groups.is_empty() {
                self.memberships.remove(&chart);
            }
        }
        if removed {
            debug!(chart_id = %chart, group = %group, "left sync group");
        }
        removed
    }

    /// Removes `chart` from every group it belongs to.
    pub fn leave_all(&mut self, chart: ChartId) -> usize {
        let groups: Vec<SyncGroupId> = self
            .memberships
            .get(&chart)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default();
        groups
            .iter()
            .filter(|group| self.leave(group, chart))
            .count()
    }

    #[must_use]
    pub fn group(&self, group: &SyncGroupId) -> Option<&SyncGroup> {
        self.groups.get(group)
    }

    pub fn set_flags(&mut self, group: &SyncGroupId, flags: SyncFlags) -> bool {
        self.groups
            .get_mut(group)
            .map(|entry| entry.set_flags(flags))
            .is_some()
    }

    #[must_use]
    pub fn stats(&self, group: &SyncGroupId) -> Option<SyncGroupStats> {
        self.groups.get(group).map(SyncGroup::stats)
    }

    pub fn groups_of(&self, chart: ChartId) -> impl Iterator<Item = &SyncGroupId> + '_ {
        self.memberships.get(&chart).into_iter().flatten()
    }

    /// Relays a notification from `origin` to the Ready siblings of every
    /// group it belongs to. A sibling shared by several groups is updated
    /// once.
    pub fn on_event(
        &mut self,
        origin: ChartId,
        event: &HostEvent,
        targets: &mut dyn SyncTargets,
    ) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();
        let mut visited: HashSet<ChartId> = HashSet::new();
        let groups: Vec<SyncGroupId> = self.groups_of(origin).cloned().collect();
        for group_id in groups {
            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };
            let Some(update) = SyncUpdate::from_event(event, group.flags()) else {
                continue;
            };
            if let Err(active) = group.begin_relay(origin) {
                group.stats_mut().echoes_suppressed += 1;
                outcome.echoes_dropped += 1;
                trace!(chart_id = %origin, group = %group_id, active = %active, "echo suppressed");
                continue;
            }
            let siblings: Vec<ChartId> = group.members().filter(|chart| *chart != origin).collect();
            for sibling in siblings {
                if !targets.is_ready(sibling) || !visited.insert(sibling) {
                    continue;
                }
                match targets.apply(sibling, &update) {
                    Ok(Applied::Unchanged) => {
                        outcome.unchanged += 1;
                        group.stats_mut().unchanged += 1;
                        trace!(chart_id = %sibling, group = %group_id, "sibling already in sync");
                    }
                    Ok(Applied::Set(echoes)) => {
                        outcome.relayed += 1;
                        outcome.echoes_dropped += echoes.len();
                        let stats = group.stats_mut();
                        stats.relays += 1;
                        stats.echoes_suppressed += echoes.len() as u64;
                    }
                    Err(err) => {
                        outcome.failed += 1;
                        group.stats_mut().failed_relays += 1;
                        warn!(chart_id = %sibling, group = %group_id, error = %err, "sync relay failed");
                    }
                }
            }
            group.finish_relay();
        }
        outcome
    }
}

/// Places a value-space crosshair on `host` using its own scales.
///
/// Falls back to the first pane and to any axis that can map `price` when the
/// sibling lacks the origin's pane or axis.
#[must_use]
pub fn sibling_crosshair_point(
    host: &dyn HostChart,
    pane: PaneId,
    axis: &PriceAxisId,
    time: f64,
    price: f64,
) -> Option<(PaneId, PixelPoint)> {
    let pane_count = host.pane_count().ok()?;
    let pane = if pane.index() < pane_count {
        pane
    } else {
        PaneId::default()
    };
    let x = host.time_to_pixel(time)?;
    let y = host.price_to_pixel(pane, axis, price).or_else(|| {
        host.price_axes()
            .ok()?
            .iter()
            .find_map(|info| host.price_to_pixel(pane, &info.id, price))
    })?;
    Some((pane, PixelPoint::new(x, y)))
}
