//! Visual primitives and the per-chart renderer that paints them.

mod primitive;
mod projection;
mod renderer;

pub use primitive::{
    BandPoint, BandShape, LineSpec, PrimitiveShape, RectangleShape, RibbonPoint, RibbonShape,
    SignalPalette, SignalRun, SignalSample, SignalStripeShape, VisualPrimitive, ZOrder,
};
pub use projection::{
    Projector, project, project_band, project_rectangle, project_ribbon, project_signal_stripe,
    split_runs,
};
pub use renderer::{PaintStats, PrimitiveRenderer, RedrawDirective};
