pub mod pane;
pub mod price_scale;
pub mod primitives;
pub mod scale;
pub mod time_scale;
pub mod types;

pub use pane::{PaneId, PaneSlice, PaneStack};
pub use price_scale::{PriceScale, PriceScaleMode};
pub use primitives::{datetime_to_unix_seconds, decimal_to_f64};
pub use scale::LinearScale;
pub use time_scale::TimeScale;
pub use types::{ChartId, ContainerId, PixelPoint, PixelRect, PriceAxisId, TimeRange, Viewport};
