use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{PaneId, PixelRect, PriceAxisId, Viewport};
use crate::host::AxisSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAxisBounds {
    pub side: AxisSide,
    pub rect: PixelRect,
}

/// Pixel bounds of one pane; `rect.y` is the offset from the chart top.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaneBounds {
    pub pane: PaneId,
    pub rect: PixelRect,
}

impl PaneBounds {
    #[must_use]
    pub fn offset(self) -> f64 {
        self.rect.y
    }
}

/// Immutable geometry capture of one chart layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSnapshot {
    pub container: Viewport,
    pub time_axis: PixelRect,
    pub price_axes: IndexMap<PriceAxisId, PriceAxisBounds>,
    pub panes: Vec<PaneBounds>,
    pub created_at: Duration,
    /// `false` for sanitized fallbacks built after a failed host query.
    pub valid: bool,
}

impl CoordinateSnapshot {
    /// Zeroed geometry used when the host cannot answer.
    #[must_use]
    pub fn fallback(container: Viewport, created_at: Duration) -> Self {
        Self {
            container,
            time_axis: PixelRect::zero(),
            price_axes: IndexMap::new(),
            panes: Vec::new(),
            created_at,
            valid: false,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: Duration, ttl: Duration) -> bool {
        now.saturating_sub(self.created_at) >= ttl
    }

    /// Plot area between the price axes and above the time axis.
    #[must_use]
    pub fn content_rect(&self) -> PixelRect {
        PixelRect::new(self.time_axis.x, 0.0, self.time_axis.width, self.time_axis.y.max(0.0))
    }

    #[must_use]
    pub fn pane(&self, pane: PaneId) -> Option<PaneBounds> {
        self.panes.iter().find(|bounds| bounds.pane == pane).copied()
    }

    #[must_use]
    pub fn price_axis(&self, axis: &PriceAxisId) -> Option<PriceAxisBounds> {
        self.price_axes.get(axis).copied()
    }

    /// Clamps every rectangle into the container and replaces non-finite or
    /// negative sizes with zero. Returns how many values were repaired.
    pub fn repair(&mut self) -> usize {
        let bounds = self.container.bounds();
        let mut repairs = 0;
        repairs += repair_rect(&mut self.time_axis, bounds);
        for axis in self.price_axes.values_mut() {
            repairs += repair_rect(&mut axis.rect, bounds);
        }
        for pane in &mut self.panes {
            repairs += repair_rect(&mut pane.rect, bounds);
        }
        repairs
    }
}

fn repair_rect(rect: &mut PixelRect, bounds: PixelRect) -> usize {
    let mut repairs = 0;
    for value in [&mut rect.x, &mut rect.y, &mut rect.width, &mut rect.height] {
        if !value.is_finite() {
            *value = 0.0;
            repairs += 1;
        }
    }
    for value in [&mut rect.width, &mut rect.height] {
        if *value < 0.0 {
            *value = 0.0;
            repairs += 1;
        }
    }
    let clamped = rect.intersect(bounds);
    if clamped != *rect {
        *rect = clamped;
        repairs += 1;
    }
    repairs
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CoordinateSnapshot, PaneBounds};
    use crate::core::{PaneId, PixelRect, Viewport};

    #[test]
    fn repair_clamps_overflowing_and_nan_rects() {
        let mut snapshot = CoordinateSnapshot::fallback(Viewport::new(100, 50), Duration::ZERO);
        snapshot.time_axis = PixelRect::new(0.0, 40.0, 150.0, f64::NAN);
        snapshot.panes.push(PaneBounds {
            pane: PaneId::new(0),
            rect: PixelRect::new(0.0, 0.0, -5.0, 40.0),
        });
        assert!(snapshot.repair() >= 3);
        assert_eq!(snapshot.time_axis, PixelRect::new(0.0, 40.0, 100.0, 0.0));
        assert_eq!(snapshot.panes[0].rect.width, 0.0);
        assert_eq!(snapshot.repair(), 0);
    }

    #[test]
    fn fallback_has_no_content() {
        let snapshot = CoordinateSnapshot::fallback(Viewport::new(300, 200), Duration::ZERO);
        assert!(!snapshot.valid);
        assert!(!snapshot.content_rect().has_area());
    }
}
