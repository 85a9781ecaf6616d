use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

/// Index of one vertically stacked pane, counted from the top of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PaneId(u32);

impl PaneId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Vertical slice assigned to one pane by [`PaneStack::layout`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaneSlice {
    pub pane_id: PaneId,
    pub top: f64,
    pub height: f64,
}

impl PaneSlice {
    #[must_use]
    pub fn bottom(self) -> f64 {
        self.top + self.height
    }
}

/// Stretch-weighted vertical pane stack with fixed-size separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneStack {
    stretch_factors: Vec<f64>,
    separator_px: f64,
}

impl Default for PaneStack {
    fn default() -> Self {
        Self {
            stretch_factors: vec![1.0],
            separator_px: 1.0,
        }
    }
}

impl PaneStack {
    pub fn with_stretch_factors(factors: &[f64], separator_px: f64) -> OverlayResult<Self> {
        if factors.is_empty() {
            return Err(OverlayError::InvalidData(
                "pane stack needs at least one pane".to_owned(),
            ));
        }
        for factor in factors {
            validate_stretch_factor(*factor)?;
        }
        if !separator_px.is_finite() || separator_px < 0.0 {
            return Err(OverlayError::InvalidData(
                "pane separator must be finite and >= 0".to_owned(),
            ));
        }
        Ok(Self {
            stretch_factors: factors.to_vec(),
            separator_px,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stretch_factors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stretch_factors.is_empty()
    }

    #[must_use]
    pub fn separator_px(&self) -> f64 {
        self.separator_px
    }

    /// Splits `total_height` between panes, top to bottom.
    ///
    /// Separators are carved out first; a height too small to fit them yields
    /// zero-height panes rather than negative ones.
    #[must_use]
    pub fn layout(&self, total_height: f64) -> Vec<PaneSlice> {
        let total = if total_height.is_finite() {
            total_height.max(0.0)
        } else {
            0.0
        };
        let separators = self.separator_px * self.stretch_factors.len().saturating_sub(1) as f64;
        let available = (total - separators).max(0.0);
        let weight_sum: f64 = self.stretch_factors.iter().sum();

        let mut slices = Vec::with_capacity(self.stretch_factors.len());
        let mut cursor = 0.0;
        let last_index = self.stretch_factors.len().saturating_sub(1);
        for (index, factor) in self.stretch_factors.iter().enumerate() {
            let height = if index == last_index {
                (total - cursor).clamp(0.0, available)
            } else {
                available * factor / weight_sum
            };
            slices.push(PaneSlice {
                pane_id: PaneId::new(index as u32),
                top: cursor.min(total),
                height,
            });
            cursor += height + self.separator_px;
        }
        slices
    }
}

fn validate_stretch_factor(stretch_factor: f64) -> OverlayResult<()> {
    if !stretch_factor.is_finite() || stretch_factor <= 0.0 {
        return Err(OverlayError::InvalidData(
            "pane stretch factor must be finite and > 0".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::PaneStack;

    #[test]
    fn layout_splits_by_weight_around_separators() {
        let stack = PaneStack::with_stretch_factors(&[3.0, 1.0], 2.0).expect("stack");
        let slices = stack.layout(402.0);
        assert_eq!(slices.len(), 2);
        assert!((slices[0].height - 300.0).abs() <= 1e-9);
        assert!((slices[1].top - 302.0).abs() <= 1e-9);
        assert!((slices[1].bottom() - 402.0).abs() <= 1e-9);
    }

    #[test]
    fn tiny_height_never_goes_negative() {
        let stack = PaneStack::with_stretch_factors(&[1.0, 1.0, 1.0], 4.0).expect("stack");
        for slice in stack.layout(3.0) {
            assert!(slice.height >= 0.0);
        }
    }
}
