//! Coordinate snapshots: cached pixel geometry of a chart layout.

mod builder;
mod cache;
mod geometry;

pub use builder::{
    InvalidationListener, SnapshotBuilder, SnapshotCallback, SnapshotOptions, SnapshotRequest,
    SubscriptionId,
};
pub use cache::{SnapshotCache, SnapshotCacheStats, SnapshotKey};
pub use geometry::{CoordinateSnapshot, PaneBounds, PriceAxisBounds};
