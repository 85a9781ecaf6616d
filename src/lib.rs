//! chart-overlay: overlay primitives and multi-chart synchronization for
//! embedded financial charts.
//!
//! Overlays are drawn from cached pixel snapshots of a host chart's layout,
//! repaints are coalesced to one per paint opportunity, and charts in a sync
//! group mirror crosshair and visible range without feedback loops. Every
//! asynchronous continuation is bound to its chart's lifecycle and dropped
//! silently once the chart is disposed.

pub mod api;
pub mod binder;
pub mod config;
pub mod core;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod overlay;
pub mod render;
pub mod scheduler;
pub mod snapshot;
pub mod sync;
pub mod telemetry;

pub use api::{ChartRegistry, RegistryEvent, TickReport};
pub use config::{ChartConfig, OverlayRuntimeConfig};
pub use error::{OverlayError, OverlayResult};
