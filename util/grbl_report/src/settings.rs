//! Persisted settings and the `$$` dump.

use serde::{Deserialize, Serialize};

use crate::{
    config::ReportConfig,
    driver::{write_float_setting, write_uint_setting, DriverExtension},
    format::{N_DECIMAL_RPMVALUE, N_DECIMAL_SETTINGVALUE},
    sink::OutputSink,
    state::{AxisArray, MAX_AXES},
};

/// Status report field switches, stored as setting `$10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMask {
    /// Report machine position (`MPos`) instead of work position (`WPos`).
    pub machine_position: bool,
    pub buffer_state: bool,
    pub line_numbers: bool,
    pub feed_speed: bool,
    pub pin_state: bool,
    pub work_coord_offset: bool,
    pub overrides: bool,
}

impl ReportMask {
    pub fn from_bits(bits: u8) -> Self {
        ReportMask {
            machine_position: bits & 0x01 != 0,
            buffer_state: bits & 0x02 != 0,
            line_numbers: bits & 0x04 != 0,
            feed_speed: bits & 0x08 != 0,
            pin_state: bits & 0x10 != 0,
            work_coord_offset: bits & 0x20 != 0,
            overrides: bits & 0x40 != 0,
        }
    }
    pub fn bits(&self) -> u8 {
        [
            self.machine_position,
            self.buffer_state,
            self.line_numbers,
            self.feed_speed,
            self.pin_state,
            self.work_coord_offset,
            self.overrides,
        ]
        .iter()
        .enumerate()
        .fold(0u8, |bits, (bit, set)| if *set { bits | (1u8 << bit) } else { bits })
    }
}

/// Numeric ids of the general settings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingId {
    PulseMicroseconds = 0,
    StepperIdleLockTime = 1,
    StepInvertMask = 2,
    DirInvertMask = 3,
    InvertStepperEnable = 4,
    LimitPinsInvertMask = 5,
    InvertProbePin = 6,
    StatusReportMask = 10,
    JunctionDeviation = 11,
    ArcTolerance = 12,
    ReportInches = 13,
    ControlInvertMask = 14,
    CoolantInvertMask = 15,
    SpindleInvertMask = 16,
    ControlPullUpDisableMask = 17,
    LimitPullUpDisableMask = 18,
    ProbePullUpDisable = 19,
    SoftLimitsEnable = 20,
    HardLimitsEnable = 21,
    HomingEnable = 22,
    HomingDirMask = 23,
    HomingFeedRate = 24,
    HomingSeekRate = 25,
    HomingDebounceDelay = 26,
    HomingPulloff = 27,
    G73Retract = 28,
    PulseDelayMicroseconds = 29,
    RpmMax = 30,
    RpmMin = 31,
    LaserMode = 32,
    PwmFreq = 33,
    PwmOffValue = 34,
    PwmMinValue = 35,
    PwmMaxValue = 36,
    StepperDeenergizeMask = 37,
    SpindlePpr = 38,
    SpindlePGain = 39,
    SpindleIGain = 40,
    SpindleDGain = 41,
    HomingLocateCycles = 43,
    HomingCycle1 = 44,
}

impl SettingId {
    pub fn id(self) -> u16 {
        self as u16
    }
}

pub const AXIS_SETTINGS_BASE: u16 = 100;
pub const AXIS_SETTINGS_INCREMENT: u16 = 10;

/// Per-axis setting categories, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSetting {
    StepsPerMm,
    MaxRate,
    Acceleration,
    MaxTravel,
    StepperCurrent,
}

impl AxisSetting {
    pub const ALL: [AxisSetting; 5] = [
        AxisSetting::StepsPerMm,
        AxisSetting::MaxRate,
        AxisSetting::Acceleration,
        AxisSetting::MaxTravel,
        AxisSetting::StepperCurrent,
    ];

    pub fn id(self, axis: usize) -> u16 {
        AXIS_SETTINGS_BASE + AXIS_SETTINGS_INCREMENT * self as u16 + axis as u16
    }

    /// Value as shown to the host, converted from the stored representation.
    fn display_value(self, settings: &Settings, axis: usize) -> f32 {
        match self {
            AxisSetting::StepsPerMm => settings.steps_per_mm[axis],
            AxisSetting::MaxRate => settings.max_rate[axis],
            // Stored in mm/min^2, shown in mm/sec^2.
            AxisSetting::Acceleration => settings.acceleration[axis] / (60.0 * 60.0),
            // Stored negative.
            AxisSetting::MaxTravel => -settings.max_travel[axis],
            AxisSetting::StepperCurrent => settings.current[axis],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pulse_microseconds: u8,
    pub stepper_idle_lock_time: u8,
    pub step_invert_mask: u8,
    pub dir_invert_mask: u8,
    pub stepper_enable_invert_mask: u8,
    pub limit_invert_mask: u8,
    pub invert_probe_pin: bool,
    pub status_report: ReportMask,
    pub junction_deviation: f32,
    pub arc_tolerance: f32,
    pub report_inches: bool,
    pub control_invert_mask: u8,
    pub coolant_invert_mask: u8,
    pub spindle_invert_mask: u8,
    pub control_disable_pullup_mask: u8,
    pub limit_disable_pullup_mask: u8,
    pub disable_probe_pullup: bool,
    pub soft_limit_enable: bool,
    pub hard_limit_enable: bool,
    pub homing_enable: bool,
    pub homing_dir_mask: u8,
    pub homing_feed_rate: f32,
    pub homing_seek_rate: f32,
    pub homing_debounce_delay: u16,
    pub homing_pulloff: f32,
    pub g73_retract: f32,
    pub pulse_delay_microseconds: u8,
    pub rpm_max: f32,
    pub rpm_min: f32,
    pub laser_mode: bool,
    pub spindle_pwm_freq: f32,
    pub spindle_pwm_off_value: f32,
    pub spindle_pwm_min_value: f32,
    pub spindle_pwm_max_value: f32,
    pub stepper_deenergize_mask: u8,
    pub spindle_ppr: u16,
    pub spindle_p_gain: f32,
    pub spindle_i_gain: f32,
    pub spindle_d_gain: f32,
    pub homing_locate_cycles: u8,
    pub homing_cycle: [u8; MAX_AXES],
    pub steps_per_mm: AxisArray,
    pub max_rate: AxisArray,
    /// mm/min^2
    pub acceleration: AxisArray,
    /// Negative, in mm.
    pub max_travel: AxisArray,
    /// Stepper current, in mA.
    pub current: AxisArray,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pulse_microseconds: 10,
            stepper_idle_lock_time: 25,
            step_invert_mask: 0,
            dir_invert_mask: 0,
            stepper_enable_invert_mask: 0,
            limit_invert_mask: 0,
            invert_probe_pin: false,
            status_report: ReportMask::from_bits(0x01),
            junction_deviation: 0.01,
            arc_tolerance: 0.002,
            report_inches: false,
            control_invert_mask: 0,
            coolant_invert_mask: 0,
            spindle_invert_mask: 0,
            control_disable_pullup_mask: 0,
            limit_disable_pullup_mask: 0,
            disable_probe_pullup: false,
            soft_limit_enable: false,
            hard_limit_enable: false,
            homing_enable: false,
            homing_dir_mask: 0,
            homing_feed_rate: 25.0,
            homing_seek_rate: 500.0,
            homing_debounce_delay: 250,
            homing_pulloff: 1.0,
            g73_retract: 0.1,
            pulse_delay_microseconds: 0,
            rpm_max: 1000.0,
            rpm_min: 0.0,
            laser_mode: false,
            spindle_pwm_freq: 5000.0,
            spindle_pwm_off_value: 0.0,
            spindle_pwm_min_value: 0.0,
            spindle_pwm_max_value: 100.0,
            stepper_deenergize_mask: 0,
            spindle_ppr: 0,
            spindle_p_gain: 1.0,
            spindle_i_gain: 0.01,
            spindle_d_gain: 0.0,
            homing_locate_cycles: 1,
            homing_cycle: [0b100, 0b011, 0, 0, 0, 0],
            steps_per_mm: [250.0; MAX_AXES],
            max_rate: [500.0; MAX_AXES],
            acceleration: [10.0 * 60.0 * 60.0; MAX_AXES],
            max_travel: [-200.0; MAX_AXES],
            current: [500.0; MAX_AXES],
        }
    }
}

fn uint(out: &mut dyn OutputSink, id: SettingId, value: impl Into<u32>) {
    write_uint_setting(out, id.id(), value.into());
}

fn float(out: &mut dyn OutputSink, id: SettingId, value: f32) {
    write_float_setting(out, id.id(), value, N_DECIMAL_SETTINGVALUE);
}

fn rpm(out: &mut dyn OutputSink, id: SettingId, value: f32) {
    write_float_setting(out, id.id(), value, N_DECIMAL_RPMVALUE);
}

/// Writes every setting as `$<id>=<value>` in ascending id order.
pub fn report_grbl_settings(
    settings: &Settings,
    config: &ReportConfig,
    driver: Option<&dyn DriverExtension>,
    out: &mut dyn OutputSink,
) {
    let capabilities = &config.capabilities;

    uint(out, SettingId::PulseMicroseconds, settings.pulse_microseconds);
    uint(out, SettingId::StepperIdleLockTime, settings.stepper_idle_lock_time);
    uint(out, SettingId::StepInvertMask, settings.step_invert_mask);
    uint(out, SettingId::DirInvertMask, settings.dir_invert_mask);
    uint(out, SettingId::InvertStepperEnable, settings.stepper_enable_invert_mask);
    uint(out, SettingId::LimitPinsInvertMask, settings.limit_invert_mask);
    uint(out, SettingId::InvertProbePin, settings.invert_probe_pin);
    uint(out, SettingId::StatusReportMask, settings.status_report.bits());
    float(out, SettingId::JunctionDeviation, settings.junction_deviation);
    float(out, SettingId::ArcTolerance, settings.arc_tolerance);
    uint(out, SettingId::ReportInches, settings.report_inches);
    uint(out, SettingId::ControlInvertMask, settings.control_invert_mask);
    uint(out, SettingId::CoolantInvertMask, settings.coolant_invert_mask);
    uint(out, SettingId::SpindleInvertMask, settings.spindle_invert_mask);
    uint(out, SettingId::ControlPullUpDisableMask, settings.control_disable_pullup_mask);
    uint(out, SettingId::LimitPullUpDisableMask, settings.limit_disable_pullup_mask);
    uint(out, SettingId::ProbePullUpDisable, settings.disable_probe_pullup);
    uint(out, SettingId::SoftLimitsEnable, settings.soft_limit_enable);
    uint(out, SettingId::HardLimitsEnable, settings.hard_limit_enable);
    uint(out, SettingId::HomingEnable, settings.homing_enable);
    uint(out, SettingId::HomingDirMask, settings.homing_dir_mask);
    float(out, SettingId::HomingFeedRate, settings.homing_feed_rate);
    float(out, SettingId::HomingSeekRate, settings.homing_seek_rate);
    uint(out, SettingId::HomingDebounceDelay, settings.homing_debounce_delay);
    float(out, SettingId::HomingPulloff, settings.homing_pulloff);
    float(out, SettingId::G73Retract, settings.g73_retract);
    uint(out, SettingId::PulseDelayMicroseconds, settings.pulse_delay_microseconds);
    rpm(out, SettingId::RpmMax, settings.rpm_max);
    rpm(out, SettingId::RpmMin, settings.rpm_min);
    uint(
        out,
        SettingId::LaserMode,
        capabilities.variable_spindle && settings.laser_mode,
    );
    float(out, SettingId::PwmFreq, settings.spindle_pwm_freq);
    float(out, SettingId::PwmOffValue, settings.spindle_pwm_off_value);
    float(out, SettingId::PwmMinValue, settings.spindle_pwm_min_value);
    float(out, SettingId::PwmMaxValue, settings.spindle_pwm_max_value);
    uint(out, SettingId::StepperDeenergizeMask, settings.stepper_deenergize_mask);
    if capabilities.spindle_sync {
        uint(out, SettingId::SpindlePpr, settings.spindle_ppr);
        float(out, SettingId::SpindlePGain, settings.spindle_p_gain);
        float(out, SettingId::SpindleIGain, settings.spindle_i_gain);
        float(out, SettingId::SpindleDGain, settings.spindle_d_gain);
    }
    uint(out, SettingId::HomingLocateCycles, settings.homing_locate_cycles);

    for axis in 0..config.axis_count {
        write_uint_setting(
            out,
            SettingId::HomingCycle1.id() + axis as u16,
            settings.homing_cycle[axis].into(),
        );
    }

    if let Some(driver) = driver {
        driver.settings_report(false, out);
    }

    let categories = if capabilities.stepper_current {
        &AxisSetting::ALL[..]
    } else {
        &AxisSetting::ALL[..4]
    };
    for category in categories {
        for axis in 0..config.axis_count {
            write_float_setting(
                out,
                category.id(axis),
                category.display_value(settings, axis),
                N_DECIMAL_SETTINGVALUE,
            );
        }
    }

    if let Some(driver) = driver {
        driver.settings_report(true, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;

    fn setting_ids(sink: &BufferSink) -> Vec<u16> {
        sink.lines()
            .map(|line| {
                let (id, _) = line.trim_start_matches('$').split_once('=').unwrap();
                id.parse().unwrap()
            })
            .collect()
    }

    #[test]
    fn report_mask_bits_round_trip() {
        for bits in 0..0x80u8 {
            assert_eq!(ReportMask::from_bits(bits).bits(), bits);
        }
        assert!(ReportMask::from_bits(0x01).machine_position);
        assert!(ReportMask::from_bits(0x40).overrides);
    }

    #[test]
    fn ids_are_strictly_ascending() {
        let mut sink = BufferSink::new();
        let mut config = ReportConfig::standard_3_axis();
        config.capabilities.spindle_sync = true;
        config.capabilities.stepper_current = true;
        report_grbl_settings(&Settings::default(), &config, None, &mut sink);
        let ids = setting_ids(&sink);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", ids);
        assert_eq!(&ids[..8], &[0, 1, 2, 3, 4, 5, 6, 10]);
        assert!(ids.contains(&38) && ids.contains(&41));
        assert_eq!(*ids.last().unwrap(), 142);
    }

    #[test]
    fn optional_blocks_follow_capabilities() {
        let mut sink = BufferSink::new();
        let config = ReportConfig::standard_4_axis();
        report_grbl_settings(&Settings::default(), &config, None, &mut sink);
        let ids = setting_ids(&sink);
        assert!(!ids.contains(&38));
        assert!(ids.contains(&47) && !ids.contains(&48));
        assert!(ids.contains(&133) && !ids.contains(&140));
    }

    #[test]
    fn axis_values_are_converted_for_display() {
        let mut settings = Settings::default();
        settings.acceleration[1] = 36000.0;
        settings.max_travel[2] = -300.5;
        settings.rpm_max = 24000.0;
        let mut sink = BufferSink::new();
        report_grbl_settings(&settings, &ReportConfig::standard_3_axis(), None, &mut sink);
        let lines: Vec<&str> = sink.lines().collect();
        assert!(lines.contains(&"$121=10.000"));
        assert!(lines.contains(&"$132=300.500"));
        assert!(lines.contains(&"$100=250.000"));
        assert!(lines.contains(&"$30=24000"));
        assert!(lines.contains(&"$11=0.010"));
        assert!(lines.contains(&"$10=1"));
    }

    #[test]
    fn laser_mode_needs_variable_spindle() {
        let settings = Settings { laser_mode: true, ..Settings::default() };
        let mut config = ReportConfig::standard_3_axis();
        let mut sink = BufferSink::new();
        report_grbl_settings(&settings, &config, None, &mut sink);
        assert!(sink.lines().any(|line| line == "$32=1"));

        config.capabilities.variable_spindle = false;
        let mut sink = BufferSink::new();
        report_grbl_settings(&settings, &config, None, &mut sink);
        assert!(sink.lines().any(|line| line == "$32=0"));
    }

    struct Marker;
    impl DriverExtension for Marker {
        fn settings_report(&self, axis_settings: bool, out: &mut dyn OutputSink) {
            write_uint_setting(out, if axis_settings { 200 } else { 90 }, 1);
        }
    }

    #[test]
    fn driver_lines_follow_each_block() {
        let mut sink = BufferSink::new();
        report_grbl_settings(
            &Settings::default(),
            &ReportConfig::standard_3_axis(),
            Some(&Marker),
            &mut sink,
        );
        let ids = setting_ids(&sink);
        let general_end = ids.iter().position(|id| *id == 90).unwrap();
        assert_eq!(ids[general_end - 1], 46);
        assert_eq!(ids[general_end + 1], 100);
        assert_eq!(*ids.last().unwrap(), 200);
    }
}
