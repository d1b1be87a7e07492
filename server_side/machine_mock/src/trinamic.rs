//! A simulated TMC2130 stepper driver chip per axis, reporting through the driver hook.

use anyhow::{anyhow, Result};
use grbl_report::{
    driver::write_uint_setting,
    state::{AxisMask, AXIS_LETTERS, MAX_AXES},
    DriverExtension, OutputSink,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::debug;

/// Axis bit mask of drivers under software control.
pub const SETTING_DRIVER_ENABLE: u16 = 338;
/// Microstep setting of the first axis; the others follow.
pub const SETTING_MICROSTEPS_BASE: u16 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Microsteps {
    Full = 1,
    Half = 2,
    Quarter = 4,
    Eighth = 8,
    Sixteenth = 16,
    ThirtySecond = 32,
    SixtyFourth = 64,
    OneTwentyEighth = 128,
    TwoFiftySixth = 256,
}

impl Default for Microsteps {
    fn default() -> Self {
        Microsteps::Sixteenth
    }
}

/// Fault flags of `DRV_STATUS`; the other bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverStatus {
    pub driver_error: bool,
    pub stall_guard: bool,
}

impl DriverStatus {
    pub fn from_bits(bits: u8) -> Self {
        DriverStatus {
            driver_error: bits & 0x02 != 0,
            stall_guard: bits & 0x04 != 0,
        }
    }

    fn faulted(&self) -> bool {
        self.driver_error || self.stall_guard
    }
}

#[derive(Debug, Clone)]
pub struct Tmc2130 {
    axis_count: usize,
    pub enabled: AxisMask,
    pub microsteps: [Microsteps; MAX_AXES],
    pub status: [DriverStatus; MAX_AXES],
}

impl Tmc2130 {
    pub fn new(axis_count: usize) -> Self {
        Tmc2130 {
            axis_count: axis_count.min(MAX_AXES),
            enabled: AxisMask((1u16 << axis_count.min(MAX_AXES)).wrapping_sub(1) as u8),
            microsteps: [Microsteps::default(); MAX_AXES],
            status: [DriverStatus::default(); MAX_AXES],
        }
    }

    /// Reports the drivers of the given axis letters, e.g. `"XZ"`, as stalled.
    pub fn with_stalled_axes(mut self, axes: &str) -> Result<Self> {
        for letter in axes.chars().map(|c| c.to_ascii_uppercase()) {
            let axis = AXIS_LETTERS[..self.axis_count]
                .iter()
                .position(|axis| *axis == letter)
                .ok_or_else(|| anyhow!("No driver for axis {:?}", letter))?;
            self.status[axis].stall_guard = true;
            debug!(axis = %letter, "driver stall injected");
        }
        Ok(self)
    }
}

impl DriverExtension for Tmc2130 {
    fn settings_report(&self, axis_settings: bool, out: &mut dyn OutputSink) {
        if axis_settings {
            for axis in 0..self.axis_count {
                write_uint_setting(
                    out,
                    SETTING_MICROSTEPS_BASE + axis as u16,
                    u16::from(self.microsteps[axis]).into(),
                );
            }
        } else {
            write_uint_setting(out, SETTING_DRIVER_ENABLE, self.enabled.0.into());
        }
    }

    /// Adds `|TMC:<axes>` naming every axis whose driver reports an error or a stall.
    fn realtime_report(&self, out: &mut dyn OutputSink) {
        let mut faulted = (0..self.axis_count).filter(|axis| self.status[*axis].faulted());
        if let Some(first) = faulted.next() {
            out.write_str("|TMC:");
            out.write_char(AXIS_LETTERS[first]);
            for axis in faulted {
                out.write_char(AXIS_LETTERS[axis]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grbl_report::BufferSink;

    #[test]
    fn settings_in_both_blocks() {
        let mut driver = Tmc2130::new(3);
        driver.microsteps[2] = Microsteps::ThirtySecond;
        let mut sink = BufferSink::new();
        driver.settings_report(false, &mut sink);
        assert_eq!(sink.take().0, "$338=7\r\n");
        driver.settings_report(true, &mut sink);
        assert_eq!(sink.as_str(), "$150=16\r\n$151=16\r\n$152=32\r\n");
    }

    #[test]
    fn faults_show_in_status() {
        let mut driver = Tmc2130::new(4);
        let mut sink = BufferSink::new();
        driver.realtime_report(&mut sink);
        assert_eq!(sink.as_str(), "");
        driver.status[1] = DriverStatus::from_bits(0x04);
        driver.status[3] = DriverStatus::from_bits(0x02);
        driver.status[0] = DriverStatus::from_bits(0x08);
        driver.realtime_report(&mut sink);
        assert_eq!(sink.as_str(), "|TMC:YA");
    }

    #[test]
    fn stalls_injected_by_axis_letter() {
        let driver = Tmc2130::new(3).with_stalled_axes("zx").unwrap();
        let mut sink = BufferSink::new();
        driver.realtime_report(&mut sink);
        assert_eq!(sink.as_str(), "|TMC:XZ");
        assert!(Tmc2130::new(3).with_stalled_axes("A").is_err());
    }

    #[test]
    fn microsteps_from_register_value() {
        assert_eq!(Microsteps::try_from(256u16).ok(), Some(Microsteps::TwoFiftySixth));
        assert!(Microsteps::try_from(3u16).is_err());
    }
}
