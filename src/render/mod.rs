mod frame;
mod null_surface;
mod primitives;

pub use frame::OverlayFrame;
pub use null_surface::NullSurface;
pub use primitives::{
    AreaCommand, Color, DrawCommand, LineStrokeStyle, PolylineCommand, RectCommand, Stroke,
};

use crate::error::OverlayResult;

/// Contract implemented by any overlay drawing surface.
///
/// Surfaces receive a fully materialized `OverlayFrame` so drawing code stays
/// isolated from coordinate mapping and scheduling.
pub trait OverlaySurface {
    fn paint(&mut self, frame: &OverlayFrame) -> OverlayResult<()>;

    /// Wipes the surface without painting anything.
    fn clear(&mut self) -> OverlayResult<()>;

    /// Releases backing resources; the surface is never used afterwards.
    fn destroy(&mut self) {}
}

#[cfg(feature = "cairo-backend")]
mod cairo_backend;
#[cfg(feature = "cairo-backend")]
pub use cairo_backend::{CairoOverlaySurface, CairoPaintStats};
