use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binder::{LegendBinding, SeriesRange};
use crate::error::{OverlayError, OverlayResult};
use crate::lifecycle::MountPolicy;
use crate::overlay::VisualPrimitive;
use crate::sync::{SyncFlags, SyncGroupId};

pub const CHART_CONFIG_JSON_SCHEMA_V1: u32 = 1;

/// Registry-wide timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRuntimeConfig {
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,
    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    #[serde(default = "default_resize_max_wait_ms")]
    pub resize_max_wait_ms: u64,
    #[serde(default)]
    pub mount: MountPolicy,
}

impl Default for OverlayRuntimeConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
            cache_sweep_interval_ms: default_cache_sweep_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            resize_debounce_ms: default_resize_debounce_ms(),
            resize_max_wait_ms: default_resize_max_wait_ms(),
            mount: MountPolicy::default(),
        }
    }
}

impl OverlayRuntimeConfig {
    #[must_use]
    pub fn with_mount_policy(mut self, mount: MountPolicy) -> Self {
        self.mount = mount;
        self
    }

    #[must_use]
    pub fn with_snapshot_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.snapshot_ttl_ms = ttl_ms;
        self
    }

    #[must_use]
    pub fn with_resize_debounce(mut self, window_ms: u64, max_wait_ms: u64) -> Self {
        self.resize_debounce_ms = window_ms;
        self.resize_max_wait_ms = max_wait_ms;
        self
    }

    pub fn validate(self) -> OverlayResult<()> {
        if self.snapshot_ttl_ms == 0 {
            return Err(OverlayError::InvalidData(
                "snapshot ttl must be > 0".to_owned(),
            ));
        }
        if self.cache_sweep_interval_ms == 0 {
            return Err(OverlayError::InvalidData(
                "cache sweep interval must be > 0".to_owned(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(OverlayError::InvalidData(
                "frame interval must be > 0".to_owned(),
            ));
        }
        if self.resize_max_wait_ms < self.resize_debounce_ms {
            return Err(OverlayError::InvalidData(
                "resize max wait must be >= the debounce window".to_owned(),
            ));
        }
        self.mount.validate()
    }

    #[must_use]
    pub fn snapshot_ttl(self) -> Duration {
        Duration::from_millis(self.snapshot_ttl_ms)
    }

    #[must_use]
    pub fn cache_sweep_interval(self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    #[must_use]
    pub fn frame_interval(self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    #[must_use]
    pub fn resize_debounce(self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    #[must_use]
    pub fn resize_max_wait(self) -> Duration {
        Duration::from_millis(self.resize_max_wait_ms)
    }

    pub fn to_json_pretty(self) -> OverlayResult<String> {
        serde_json::to_string_pretty(&self).map_err(|e| {
            OverlayError::InvalidData(format!("failed to serialize runtime config: {e}"))
        })
    }

    pub fn from_json_str(input: &str) -> OverlayResult<Self> {
        let config: Self = serde_json::from_str(input).map_err(|e| {
            OverlayError::InvalidData(format!("failed to parse runtime config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn default_snapshot_ttl_ms() -> u64 {
    500
}

fn default_cache_sweep_interval_ms() -> u64 {
    5_000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_resize_debounce_ms() -> u64 {
    100
}

fn default_resize_max_wait_ms() -> u64 {
    500
}

/// Membership of a chart in one sync group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMembership {
    pub group: SyncGroupId,
    /// Overrides the group's flags when present.
    #[serde(default)]
    pub flags: Option<SyncFlags>,
}

/// Per-chart configuration passed to `attach`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default)]
    pub primitives: Vec<VisualPrimitive>,
    #[serde(default)]
    pub sync: Vec<SyncMembership>,
    #[serde(default)]
    pub legends: Vec<LegendBinding>,
    #[serde(default)]
    pub series: Vec<SeriesRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfigJsonContractV1 {
    pub schema_version: u32,
    pub config: ChartConfig,
}

impl ChartConfig {
    #[must_use]
    pub fn with_primitives(mut self, primitives: Vec<VisualPrimitive>) -> Self {
        self.primitives = primitives;
        self
    }

    #[must_use]
    pub fn with_sync_group(mut self, group: SyncGroupId, flags: Option<SyncFlags>) -> Self {
        self.sync.push(SyncMembership { group, flags });
        self
    }

    #[must_use]
    pub fn with_legend(mut self, legend: LegendBinding) -> Self {
        self.legends.push(legend);
        self
    }

    #[must_use]
    pub fn with_series(mut self, series: SeriesRange) -> Self {
        self.series.push(series);
        self
    }

    pub fn to_json_contract_v1_pretty(&self) -> OverlayResult<String> {
        let payload = ChartConfigJsonContractV1 {
            schema_version: CHART_CONFIG_JSON_SCHEMA_V1,
            config: self.clone(),
        };
        serde_json::to_string_pretty(&payload).map_err(|e| {
            OverlayError::InvalidData(format!("failed to serialize chart config contract v1: {e}"))
        })
    }

    /// Parses either the versioned contract or a bare config object.
    pub fn from_json_str(input: &str) -> OverlayResult<Self> {
        let value: serde_json::Value = serde_json::from_str(input).map_err(|e| {
            OverlayError::InvalidData(format!("failed to parse chart config json: {e}"))
        })?;
        if value.get("schema_version").is_none() {
            return serde_json::from_value(value).map_err(|e| {
                OverlayError::InvalidData(format!("failed to parse chart config: {e}"))
            });
        }
        let payload: ChartConfigJsonContractV1 = serde_json::from_value(value).map_err(|e| {
            OverlayError::InvalidData(format!("failed to parse chart config payload: {e}"))
        })?;
        if payload.schema_version != CHART_CONFIG_JSON_SCHEMA_V1 {
            return Err(OverlayError::InvalidData(format!(
                "unsupported chart config schema version: {}",
                payload.schema_version
            )));
        }
        Ok(payload.config)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChartConfig, OverlayRuntimeConfig};
    use crate::overlay::{PrimitiveShape, VisualPrimitive};
    use crate::render::Color;
    use crate::sync::SyncGroupId;

    #[test]
    fn contract_and_bare_configs_parse_the_same() {
        let config = ChartConfig::default()
            .with_primitives(vec![
                VisualPrimitive::rectangle(1.0, 2.0, 3.0, 4.0, Color::rgb(1.0, 0.0, 0.0)).with_id("z"),
            ])
            .with_sync_group(SyncGroupId::new("main"), None);
        let contract = config.to_json_contract_v1_pretty().expect("serialize");
        assert_eq!(ChartConfig::from_json_str(&contract).expect("contract"), config);

        let bare = r#"{
            "primitives": [{
                "id": "z",
                "shape": {"type": "rectangle", "time1": 1, "price1": 2, "time2": 3, "price2": 4,
                          "fill": {"red": 1, "green": 0, "blue": 0, "alpha": 1}}
            }],
            "sync": [{"group": "main"}]
        }"#;
        let parsed = ChartConfig::from_json_str(bare).expect("bare");
        assert_eq!(parsed, config);
        assert!(matches!(parsed.primitives[0].shape, PrimitiveShape::Rectangle(_)));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let err = ChartConfig::from_json_str(r#"{"schema_version": 9, "config": {}}"#)
            .expect_err("version 9");
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn runtime_config_validates_on_load() {
        assert!(OverlayRuntimeConfig::default().validate().is_ok());
        assert!(OverlayRuntimeConfig::from_json_str(r#"{"frame_interval_ms": 0}"#).is_err());
        let parsed = OverlayRuntimeConfig::from_json_str(r#"{"snapshot_ttl_ms": 250}"#)
            .expect("partial config");
        assert_eq!(parsed.snapshot_ttl_ms, 250);
        assert_eq!(parsed.mount, OverlayRuntimeConfig::default().mount);
    }
}
