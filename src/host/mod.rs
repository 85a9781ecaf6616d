//! Interface consumed from the external Host Chart collaborator.
//!
//! Everything in this crate talks to a chart through [`HostChart`]: axis
//! mappings, pane geometry, visible-range and crosshair setters, and the
//! notification streams. Only the registry owns the boxed handle; other
//! components borrow it for the duration of one call.

mod headless;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ChartConfig;
use crate::core::{ChartId, ContainerId, PaneId, PixelPoint, PriceAxisId, TimeRange, Viewport};
use crate::render::OverlaySurface;

pub use headless::{HeadlessAxisSpec, HeadlessChart, HeadlessChartSpec, HeadlessFactory, HeadlessPage};

pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("host chart is disposed")]
    Disposed,

    #[error("unknown price axis `{0}`")]
    UnknownAxis(PriceAxisId),

    #[error("unknown pane index {0}")]
    UnknownPane(usize),

    #[error("host geometry query failed: {0}")]
    Geometry(String),

    #[error("host rejected request: {0}")]
    Rejected(String),
}

/// Which edge of the chart a price axis is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisSide {
    Left,
    Right,
    /// Overlay scales have no visible axis and share the content area.
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAxisInfo {
    pub id: PriceAxisId,
    pub side: AxisSide,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaneSize {
    pub width: f64,
    pub height: f64,
}

/// Crosshair location expressed in both value and pixel space of its chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosshairPosition {
    pub time: f64,
    pub price: f64,
    pub axis: PriceAxisId,
    pub pane: PaneId,
    /// Pixel position on the originating chart; never reused by siblings.
    pub point: PixelPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewportChangeReason {
    Pan,
    Zoom,
    Resize,
    RangeSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportChange {
    pub reason: ViewportChangeReason,
    pub visible_range: Option<TimeRange>,
    /// New container size, present for resize notifications.
    pub size: Option<Viewport>,
}

/// Notification emitted by a Host Chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    ViewportChanged(ViewportChange),
    /// `None` means the pointer left the chart.
    CrosshairMoved(Option<CrosshairPosition>),
    Clicked(CrosshairPosition),
}

/// The rectangular page region a chart occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub size: Viewport,
}

impl Container {
    #[must_use]
    pub fn new(id: ContainerId, size: Viewport) -> Self {
        Self { id, size }
    }
}

/// Chart-side contract required by the overlay core.
///
/// Horizontal pixels are relative to the left edge of the pane content area;
/// vertical pixels are relative to the top of the addressed pane. Mapping
/// functions return `None` when a value is outside the currently mapped
/// domain or the chart cannot answer.
pub trait HostChart {
    fn is_disposed(&self) -> bool;

    fn time_to_pixel(&self, time: f64) -> Option<f64>;
    fn pixel_to_time(&self, x: f64) -> Option<f64>;
    fn price_to_pixel(&self, pane: PaneId, axis: &PriceAxisId, price: f64) -> Option<f64>;
    fn pixel_to_price(&self, pane: PaneId, axis: &PriceAxisId, y: f64) -> Option<f64>;
    /// Pixel distance between two consecutive bars.
    fn bar_spacing(&self) -> Option<f64>;

    /// Size the chart is currently laid out at. Follows `resize` at once,
    /// ahead of any debounced container bookkeeping.
    fn container_size(&self) -> HostResult<Viewport>;
    fn time_axis_height(&self) -> HostResult<f64>;
    fn price_axes(&self) -> HostResult<Vec<PriceAxisInfo>>;
    fn pane_count(&self) -> HostResult<usize>;
    fn pane_size(&self, index: usize) -> HostResult<PaneSize>;
    /// Cumulative vertical offset of the pane from the top of the chart.
    fn pane_offset(&self, index: usize) -> HostResult<f64>;

    fn visible_time_range(&self) -> Option<TimeRange>;
    /// Crosshair currently shown, whether set by the pointer or a setter.
    fn crosshair_position(&self) -> Option<CrosshairPosition>;
    fn set_visible_time_range(&mut self, range: TimeRange) -> HostResult<()>;
    fn set_crosshair(
        &mut self,
        pane: PaneId,
        point: PixelPoint,
        time: f64,
        price: f64,
    ) -> HostResult<()>;
    fn clear_crosshair(&mut self) -> HostResult<()>;
    fn resize(&mut self, size: Viewport) -> HostResult<()>;

    /// Drains notifications emitted since the last call. Notifications caused
    /// by a setter may arrive on a later drain.
    fn take_notifications(&mut self) -> Vec<HostEvent>;
    fn dispose(&mut self);
}

/// Discovers page containers; returns `None` until the element is laid out.
pub trait ContainerLocator {
    fn locate(&mut self, id: &ContainerId) -> Option<Viewport>;
}

/// A freshly created chart plus the overlay surface stacked on top of it.
pub struct MountedChart {
    pub host: Box<dyn HostChart>,
    pub surface: Box<dyn OverlaySurface>,
}

/// Creates Host Charts once their container is available.
pub trait HostChartFactory {
    fn create(
        &mut self,
        chart: ChartId,
        container: &Container,
        config: &ChartConfig,
    ) -> HostResult<MountedChart>;
}
