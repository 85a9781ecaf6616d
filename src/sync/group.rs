use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::ChartId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncGroupId(String);

impl SyncGroupId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which notifications a group relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFlags {
    #[serde(default = "enabled")]
    pub crosshair: bool,
    #[serde(default = "enabled")]
    pub time_range: bool,
}

impl Default for SyncFlags {
    fn default() -> Self {
        Self {
            crosshair: true,
            time_range: true,
        }
    }
}

fn enabled() -> bool {
    true
}

/// Reentrancy guard of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Relaying { origin: ChartId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncGroupStats {
    /// Sibling updates applied.
    pub relays: u64,
    /// Notifications dropped because the group was already relaying.
    pub echoes_suppressed: u64,
    /// Updates skipped because the sibling already showed them.
    pub unchanged: u64,
    pub failed_relays: u64,
}

#[derive(Debug, Clone)]
pub struct SyncGroup {
    id: SyncGroupId,
    members: IndexSet<ChartId>,
    flags: SyncFlags,
    state: RelayState,
    stats: SyncGroupStats,
}

impl SyncGroup {
    #[must_use]
    pub fn new(id: SyncGroupId, flags: SyncFlags) -> Self {
        Self {
            id,
            members: IndexSet::new(),
            flags,
            state: RelayState::Idle,
            stats: SyncGroupStats::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SyncGroupId {
        &self.id
    }

    #[must_use]
    pub fn flags(&self) -> SyncFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: SyncFlags) {
        self.flags = flags;
    }

    #[must_use]
    pub fn state(&self) -> RelayState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> SyncGroupStats {
        self.stats
    }

    pub fn members(&self) -> impl Iterator<Item = ChartId> + '_ {
        self.members.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, chart: ChartId) -> bool {
        self.members.contains(&chart)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(super) fn insert(&mut self, chart: ChartId) -> bool {
        self.members.insert(chart)
    }

    pub(super) fn remove(&mut self, chart: ChartId) -> bool {
        self.members.shift_remove(&chart)
    }

    /// `Idle -> Relaying`. Returns the active origin when a relay is already
    /// running, in which case the caller's notification is an echo.
    pub(super) fn begin_relay(&mut self, origin: ChartId) -> Result<(), ChartId> {
        match self.state {
            RelayState::Idle => {
                self.state = RelayState::Relaying { origin };
                Ok(())
            }
            RelayState::Relaying { origin: active } => Err(active),
        }
    }

    pub(super) fn finish_relay(&mut self) {
        self.state = RelayState::Idle;
    }

    pub(super) fn stats_mut(&mut self) -> &mut SyncGroupStats {
        &mut self.stats
    }
}
