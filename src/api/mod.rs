//! Page-facing registry of chart instances.
//!
//! `ChartRegistry` is split across several files by concern: instance
//! bookkeeping and the page bridge (`registry`), host notifications and the
//! sync relay (`registry_events`), overlay/snapshot/sync operations
//! (`registry_overlay`), and the frame loop (`registry_tasks`).

mod registry;
mod registry_events;
mod registry_overlay;
mod registry_tasks;

pub use registry::{ChartRegistry, ListenerId, RegistryEvent, RegistryListener};
pub use registry_tasks::{RegistryTask, TickReport};
