//! Crosshair and visible-range synchronization between charts.

mod controller;
mod group;

pub use controller::{
    Applied, RelayOutcome, SyncController, SyncTargets, SyncUpdate, sibling_crosshair_point,
};
pub use group::{RelayState, SyncFlags, SyncGroup, SyncGroupId, SyncGroupStats};
