use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

/// Mapping mode used by the price scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PriceScaleMode {
    /// Uniform spacing in raw price units.
    #[default]
    Linear,
    /// Uniform spacing in natural-log price units (all prices must be > 0).
    Log,
}

/// Price axis model mapped to an inverted Y pixel axis with top/bottom margins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceScale {
    domain_start: f64,
    domain_end: f64,
    mode: PriceScaleMode,
    #[serde(default)]
    top_margin_ratio: f64,
    #[serde(default)]
    bottom_margin_ratio: f64,
}

impl PriceScale {
    pub fn new(price_min: f64, price_max: f64) -> OverlayResult<Self> {
        Self::with_mode(price_min, price_max, PriceScaleMode::Linear)
    }

    pub fn with_mode(price_min: f64, price_max: f64, mode: PriceScaleMode) -> OverlayResult<Self> {
        if !price_min.is_finite() || !price_max.is_finite() || price_min == price_max {
            return Err(OverlayError::InvalidData(
                "price domain must be finite and non-zero".to_owned(),
            ));
        }
        if mode == PriceScaleMode::Log && price_min.min(price_max) <= 0.0 {
            return Err(OverlayError::InvalidData(
                "log price domain must be > 0".to_owned(),
            ));
        }
        Ok(Self {
            domain_start: price_min.min(price_max),
            domain_end: price_min.max(price_max),
            mode,
            top_margin_ratio: 0.0,
            bottom_margin_ratio: 0.0,
        })
    }

    pub fn with_margins(mut self, top: f64, bottom: f64) -> OverlayResult<Self> {
        if !top.is_finite() || !bottom.is_finite() || top < 0.0 || bottom < 0.0 || top + bottom >= 1.0
        {
            return Err(OverlayError::InvalidData(
                "price scale margins must be finite, >= 0 and sum to < 1".to_owned(),
            ));
        }
        self.top_margin_ratio = top;
        self.bottom_margin_ratio = bottom;
        Ok(self)
    }

    #[must_use]
    pub fn domain(self) -> (f64, f64) {
        (self.domain_start, self.domain_end)
    }

    #[must_use]
    pub fn mode(self) -> PriceScaleMode {
        self.mode
    }

    pub fn set_domain(&mut self, price_min: f64, price_max: f64) -> OverlayResult<()> {
        let rebuilt = Self::with_mode(price_min, price_max, self.mode)?;
        self.domain_start = rebuilt.domain_start;
        self.domain_end = rebuilt.domain_end;
        Ok(())
    }

    pub fn price_to_pixel(self, price: f64, height_px: f64) -> OverlayResult<f64> {
        validate_height(height_px)?;
        let transformed = self.transform(price)?;
        let (min, max) = self.transformed_domain()?;
        let top = height_px * self.top_margin_ratio;
        let internal = height_px * (1.0 - self.top_margin_ratio - self.bottom_margin_ratio);
        let ratio = (transformed - min) / (max - min);
        Ok(top + (1.0 - ratio) * internal)
    }

    pub fn pixel_to_price(self, pixel: f64, height_px: f64) -> OverlayResult<f64> {
        validate_height(height_px)?;
        if !pixel.is_finite() {
            return Err(OverlayError::InvalidData("pixel must be finite".to_owned()));
        }
        let (min, max) = self.transformed_domain()?;
        let top = height_px * self.top_margin_ratio;
        let internal = height_px * (1.0 - self.top_margin_ratio - self.bottom_margin_ratio);
        let ratio = 1.0 - (pixel - top) / internal;
        let transformed = min + ratio * (max - min);
        Ok(match self.mode {
            PriceScaleMode::Linear => transformed,
            PriceScaleMode::Log => transformed.exp(),
        })
    }

    fn transform(self, price: f64) -> OverlayResult<f64> {
        if !price.is_finite() {
            return Err(OverlayError::InvalidData("price must be finite".to_owned()));
        }
        match self.mode {
            PriceScaleMode::Linear => Ok(price),
            PriceScaleMode::Log if price > 0.0 => Ok(price.ln()),
            PriceScaleMode::Log => Err(OverlayError::InvalidData(
                "log scale price must be > 0".to_owned(),
            )),
        }
    }

    fn transformed_domain(self) -> OverlayResult<(f64, f64)> {
        Ok((self.transform(self.domain_start)?, self.transform(self.domain_end)?))
    }
}

fn validate_height(height_px: f64) -> OverlayResult<()> {
    if !height_px.is_finite() || height_px <= 0.0 {
        return Err(OverlayError::GeometryUnavailable(format!(
            "price axis height must be finite and > 0, got {height_px}"
        )));
    }
    Ok(())
}
