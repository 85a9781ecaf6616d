use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::core::{ChartId, ContainerId};

use super::CoordinateSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub chart: ChartId,
    pub container: ContainerId,
}

impl SnapshotKey {
    #[must_use]
    pub fn new(chart: ChartId, container: ContainerId) -> Self {
        Self { chart, container }
    }
}

/// Runtime metrics exposed by the snapshot cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// Time-bounded snapshot store keyed by chart and container identity.
///
/// Owned by the chart registry; only the snapshot builder writes to it.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: HashMap<SnapshotKey, Rc<CoordinateSnapshot>>,
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry; an expired entry is evicted and reported as a miss.
    pub fn get(&mut self, key: &SnapshotKey, now: Duration) -> Option<Rc<CoordinateSnapshot>> {
        match self.entries.get(key) {
            Some(snapshot) if !snapshot.is_expired(now, self.ttl) => {
                self.hits = self.hits.saturating_add(1);
                Some(Rc::clone(snapshot))
            }
            Some(_) => {
                self.entries.remove(key);
                self.evictions = self.evictions.saturating_add(1);
                self.misses = self.misses.saturating_add(1);
                None
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                None
            }
        }
    }

    #[must_use]
    pub fn contains(&self, key: &SnapshotKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(super) fn insert(&mut self, key: SnapshotKey, snapshot: Rc<CoordinateSnapshot>) {
        self.entries.insert(key, snapshot);
    }

    pub(super) fn invalidate_chart(&mut self, chart: ChartId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.chart != chart);
        let removed = before - self.entries.len();
        self.evictions = self.evictions.saturating_add(removed as u64);
        removed
    }

    pub(super) fn clear(&mut self) {
        self.evictions = self.evictions.saturating_add(self.entries.len() as u64);
        self.entries.clear();
    }

    /// Drops every entry past its time-to-live.
    pub(super) fn sweep(&mut self, now: Duration) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, snapshot| !snapshot.is_expired(now, ttl));
        let removed = before - self.entries.len();
        self.evictions = self.evictions.saturating_add(removed as u64);
        removed
    }

    #[must_use]
    pub fn stats(&self) -> SnapshotCacheStats {
        SnapshotCacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
