use crate::{format::Fixed, sink::OutputSink};

/// Hook through which a peripheral driver (for example a stepper driver chip
/// module) contributes its own settings and status text.
///
/// The core calls it at fixed points and never interprets what it writes. Drivers
/// should use [`write_uint_setting`] and [`write_float_setting`] so their lines
/// follow the same `$n=value` framing as the core settings.
pub trait DriverExtension {
    /// Called after the general settings block (`axis_settings == false`) and again
    /// after the per-axis block (`axis_settings == true`).
    fn settings_report(&self, axis_settings: bool, out: &mut dyn OutputSink) {
        let _ = (axis_settings, out);
    }

    /// Called just before a status frame is closed. Text must start with `|`.
    fn realtime_report(&self, out: &mut dyn OutputSink) {
        let _ = out;
    }
}

pub fn write_uint_setting(out: &mut dyn OutputSink, id: u16, value: u32) {
    write!(out, "${}={}\r\n", id, value);
}

pub fn write_float_setting(out: &mut dyn OutputSink, id: u16, value: f32, decimals: usize) {
    write!(out, "${}={}\r\n", id, Fixed(value, decimals));
}
