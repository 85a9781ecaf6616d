use serde::{Deserialize, Serialize};

use crate::core::{LinearScale, TimeRange};
use crate::error::{OverlayError, OverlayResult};

/// Time axis model with a visible window mapped onto the pane width.
///
/// `bar_interval` is the nominal distance between two consecutive samples and
/// drives the bar spacing reported to overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeScale {
    visible_start: f64,
    visible_end: f64,
    bar_interval: f64,
}

impl TimeScale {
    pub fn new(time_start: f64, time_end: f64, bar_interval: f64) -> OverlayResult<Self> {
        let (visible_start, visible_end) = normalize_range(time_start, time_end, 1.0)?;
        if !bar_interval.is_finite() || bar_interval <= 0.0 {
            return Err(OverlayError::InvalidData(
                "bar interval must be finite and > 0".to_owned(),
            ));
        }
        Ok(Self {
            visible_start,
            visible_end,
            bar_interval,
        })
    }

    #[must_use]
    pub fn visible_range(self) -> TimeRange {
        TimeRange {
            from: self.visible_start,
            to: self.visible_end,
        }
    }

    #[must_use]
    pub fn bar_interval(self) -> f64 {
        self.bar_interval
    }

    /// Overrides the visible range.
    pub fn set_visible_range(&mut self, start: f64, end: f64) -> OverlayResult<()> {
        let normalized = normalize_range(start, end, 1e-9)?;
        self.visible_start = normalized.0;
        self.visible_end = normalized.1;
        Ok(())
    }

    /// Pans the visible range by an additive time delta.
    pub fn pan_visible_by_delta(&mut self, delta_time: f64) -> OverlayResult<()> {
        if !delta_time.is_finite() {
            return Err(OverlayError::InvalidData(
                "pan delta must be finite".to_owned(),
            ));
        }

        self.visible_start += delta_time;
        self.visible_end += delta_time;
        Ok(())
    }

    /// Zooms visible range around an anchor time.
    ///
    /// `factor > 1.0` zooms in, `0.0 < factor < 1.0` zooms out.
    pub fn zoom_visible_by_factor(&mut self, factor: f64, anchor_time: f64) -> OverlayResult<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(OverlayError::InvalidData(
                "zoom factor must be finite and > 0".to_owned(),
            ));
        }
        if !anchor_time.is_finite() {
            return Err(OverlayError::InvalidData(
                "zoom anchor must be finite".to_owned(),
            ));
        }

        let current_span = self.visible_end - self.visible_start;
        let target_span = (current_span / factor).max(self.bar_interval);
        let left_ratio = (anchor_time - self.visible_start) / current_span;

        let new_start = anchor_time - left_ratio * target_span;
        self.set_visible_range(new_start, new_start + target_span)
    }

    pub fn time_to_pixel(self, time: f64, width_px: f64) -> OverlayResult<f64> {
        self.visible_linear()?.domain_to_pixel(time, width_px)
    }

    pub fn pixel_to_time(self, pixel: f64, width_px: f64) -> OverlayResult<f64> {
        self.visible_linear()?.pixel_to_domain(pixel, width_px)
    }

    /// Pixel distance between two consecutive bars at the current zoom.
    pub fn bar_spacing(self, width_px: f64) -> OverlayResult<f64> {
        let start = self.time_to_pixel(self.visible_start, width_px)?;
        let next = self.time_to_pixel(self.visible_start + self.bar_interval, width_px)?;
        Ok((next - start).abs())
    }

    fn visible_linear(self) -> OverlayResult<LinearScale> {
        LinearScale::new(self.visible_start, self.visible_end)
    }
}

fn normalize_range(start: f64, end: f64, min_span: f64) -> OverlayResult<(f64, f64)> {
    if !start.is_finite() || !end.is_finite() {
        return Err(OverlayError::InvalidData(
            "scale range must be finite".to_owned(),
        ));
    }

    if start == end {
        let half = min_span / 2.0;
        return Ok((start - half, end + half));
    }

    Ok((start.min(end), start.max(end)))
}

#[cfg(test)]
mod tests {
    use super::TimeScale;

    #[test]
    fn zoom_keeps_anchor_pixel_stable() {
        let mut scale = TimeScale::new(0.0, 100.0, 1.0).expect("scale");
        let before = scale.time_to_pixel(25.0, 800.0).expect("px");
        scale.zoom_visible_by_factor(2.0, 25.0).expect("zoom");
        let after = scale.time_to_pixel(25.0, 800.0).expect("px");
        assert!((before - after).abs() <= 1e-9);
        assert!((scale.visible_range().span() - 50.0).abs() <= 1e-9);
    }

    #[test]
    fn bar_spacing_follows_zoom() {
        let scale = TimeScale::new(0.0, 100.0, 5.0).expect("scale");
        let spacing = scale.bar_spacing(1000.0).expect("spacing");
        assert!((spacing - 50.0).abs() <= 1e-9);
    }
}
