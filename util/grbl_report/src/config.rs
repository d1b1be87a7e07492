use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::state::MAX_AXES;

/// Optional controller features. Several report fields and letters exist only
/// when the matching capability is present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub variable_spindle: bool,
    pub mist_control: bool,
    pub spindle_sync: bool,
    pub software_debounce: bool,
    pub corexy: bool,
    pub parking: bool,
    pub homing_force_set_origin: bool,
    pub homing_single_axis_commands: bool,
    pub limits_two_switches_on_axes: bool,
    pub allow_feed_override_during_probe: bool,
    pub spindle_off_with_zero_speed: bool,
    pub parking_override_control: bool,
    pub homing_init_lock: bool,
    pub safety_door_input: bool,
    pub restore_wipe_all: bool,
    pub restore_default_settings: bool,
    pub restore_clear_parameters: bool,
    pub build_info_write_command: bool,
    pub force_buffer_sync_during_wco_change: bool,
    pub manual_tool_change: bool,
    pub stepper_current: bool,
    pub pid_log: bool,
}

/// Build-time sizes reported by `$I`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParameters {
    /// Planner depth; one block is always reserved, so `$I` shows one less.
    pub block_buffer_size: u16,
    pub rx_buffer_size: u32,
    /// Size of the tool table, when the controller keeps one.
    pub n_tools: Option<u8>,
    /// Driver identification shown inside `[VER:...]`.
    pub driver_info: Option<String>,
}

impl Default for BuildParameters {
    fn default() -> Self {
        BuildParameters {
            block_buffer_size: 36,
            rx_buffer_size: 1024,
            n_tools: None,
            driver_info: None,
        }
    }
}

/// Frame counts between emissions of the slow status fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshIntervals {
    pub wco_busy: i16,
    pub wco_idle: i16,
    pub overrides_busy: i16,
    pub overrides_idle: i16,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        RefreshIntervals {
            wco_busy: 30,
            wco_idle: 10,
            overrides_busy: 20,
            overrides_idle: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub axis_count: usize,
    pub capabilities: Capabilities,
    pub build: BuildParameters,
    pub refresh: RefreshIntervals,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::standard_3_axis()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("axis count must be between 1 and {max}, got {0}", max = MAX_AXES)]
    AxisCount(usize),
    #[error("refresh interval {name} must be at least {min}, got {value}")]
    RefreshInterval { name: &'static str, value: i16, min: i16 },
    #[error("block buffer must hold at least one block")]
    BlockBuffer,
    #[error("invalid report configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot read report configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportConfig {
    pub fn standard_3_axis() -> Self {
        Self {
            axis_count: 3,
            capabilities: Capabilities {
                variable_spindle: true,
                mist_control: true,
                software_debounce: true,
                ..Capabilities::default()
            },
            build: BuildParameters::default(),
            refresh: RefreshIntervals::default(),
        }
    }
    pub fn standard_4_axis() -> Self {
        Self {
            axis_count: 4,
            ..Self::standard_3_axis()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ReportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis_count == 0 || self.axis_count > MAX_AXES {
            return Err(ConfigError::AxisCount(self.axis_count));
        }
        // A WCO frame holds back Ov, so WCO must skip at least one frame.
        let intervals = [
            ("wco_busy", self.refresh.wco_busy, 2),
            ("wco_idle", self.refresh.wco_idle, 2),
            ("overrides_busy", self.refresh.overrides_busy, 1),
            ("overrides_idle", self.refresh.overrides_idle, 1),
        ];
        for (name, value, min) in intervals {
            if value < min {
                return Err(ConfigError::RefreshInterval { name, value, min });
            }
        }
        if self.build.block_buffer_size == 0 {
            return Err(ConfigError::BlockBuffer);
        }
        Ok(())
    }

    /// Pulls out-of-range values back into range, so a configuration built by
    /// hand without `validate` cannot index past the axis arrays.
    pub fn clamped(mut self) -> Self {
        if let Err(err) = self.validate() {
            warn!(%err, "clamping report configuration");
            self.axis_count = self.axis_count.clamp(1, MAX_AXES);
            let refresh = &mut self.refresh;
            refresh.wco_busy = refresh.wco_busy.max(2);
            refresh.wco_idle = refresh.wco_idle.max(2);
            refresh.overrides_busy = refresh.overrides_busy.max(1);
            refresh.overrides_idle = refresh.overrides_idle.max(1);
            self.build.block_buffer_size = self.build.block_buffer_size.max(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config = ReportConfig::from_json_str(
            r#"{ "axis_count": 4, "capabilities": { "variable_spindle": true }, "build": { "n_tools": 8 } }"#,
        )
        .unwrap();
        assert_eq!(config.axis_count, 4);
        assert!(config.capabilities.variable_spindle);
        assert!(!config.capabilities.mist_control);
        assert_eq!(config.build.n_tools, Some(8));
        assert_eq!(config.build.rx_buffer_size, 1024);
        assert_eq!(config.refresh, RefreshIntervals::default());
    }

    #[test]
    fn rejects_bad_axis_count() {
        assert!(matches!(
            ReportConfig::from_json_str(r#"{ "axis_count": 7 }"#),
            Err(ConfigError::AxisCount(7))
        ));
        assert!(matches!(
            ReportConfig::from_json_str(r#"{ "axis_count": 0 }"#),
            Err(ConfigError::AxisCount(0))
        ));
    }

    #[test]
    fn rejects_short_intervals() {
        let result = ReportConfig::from_json_str(r#"{ "refresh": { "overrides_idle": 0 } }"#);
        assert!(matches!(
            result,
            Err(ConfigError::RefreshInterval { name: "overrides_idle", value: 0, min: 1 })
        ));
        let result = ReportConfig::from_json_str(r#"{ "refresh": { "wco_busy": 1 } }"#);
        assert!(matches!(
            result,
            Err(ConfigError::RefreshInterval { name: "wco_busy", value: 1, min: 2 })
        ));
        assert!(ReportConfig::from_json_str(r#"{ "refresh": { "wco_idle": 2, "overrides_busy": 1 } }"#).is_ok());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            ReportConfig::from_json_str("{ axis_count"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn clamping_restores_a_valid_config() {
        let config = ReportConfig {
            axis_count: 9,
            refresh: RefreshIntervals { wco_idle: 1, overrides_busy: -3, ..RefreshIntervals::default() },
            ..ReportConfig::standard_3_axis()
        }
        .clamped();
        assert_eq!(config.axis_count, MAX_AXES);
        assert_eq!(config.refresh.wco_idle, 2);
        assert_eq!(config.refresh.overrides_busy, 1);
        assert!(config.validate().is_ok());
        assert_eq!(ReportConfig::standard_4_axis().clamped(), ReportConfig::standard_4_axis());
    }

    #[test]
    fn presets_validate() {
        assert!(ReportConfig::standard_3_axis().validate().is_ok());
        assert!(ReportConfig::standard_4_axis().validate().is_ok());
        assert_eq!(ReportConfig::standard_4_axis().axis_count, 4);
    }
}
