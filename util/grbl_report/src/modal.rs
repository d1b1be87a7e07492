use crate::{
    config::ReportConfig,
    format::{Fixed, ReportUnits, N_DECIMAL_RPMVALUE},
    sink::OutputSink,
    state::{GcodeState, MotionMode, ProgramFlow},
};

/// Probe modes are numbered from here internally and shown as `G38.2` through `G38.5`.
const PROBE_MOTION_OFFSET: u8 = MotionMode::ProbeToward as u8 - 2;

/// Writes a coordinate system number, `54`..=`59` then `59.1`..=`59.3`.
pub(crate) fn write_coord_system(index: u8, out: &mut dyn OutputSink) {
    let g5x = index + 54;
    write!(out, "{}", g5x.min(59));
    if g5x > 59 {
        write!(out, ".{}", g5x - 59);
    }
}

fn program_flow_code(flow: ProgramFlow) -> Option<u8> {
    match flow {
        ProgramFlow::Running => None,
        ProgramFlow::Paused => Some(0),
        ProgramFlow::OptionalStop => Some(1),
        ProgramFlow::CompletedM2 => Some(2),
        ProgramFlow::CompletedM30 => Some(30),
    }
}

/// Writes the `[GC:...]` line for `$G`. Reads only; calling it twice gives the same line.
pub fn report_gcode_modes(
    gcode: &GcodeState,
    report_inches: bool,
    config: &ReportConfig,
    out: &mut dyn OutputSink,
) {
    let modal = &gcode.modal;

    out.write_str("[GC:G");
    let motion = modal.motion as u8;
    if motion >= MotionMode::ProbeToward as u8 {
        write!(out, "38.{}", motion - PROBE_MOTION_OFFSET);
    } else {
        write!(out, "{}", motion);
    }

    out.write_str(" G");
    write_coord_system(modal.coord_system, out);

    write!(out, " G{}", if gcode.diameter_mode { 7 } else { 8 });
    write!(out, " G{}", modal.plane as u8 + 17);
    write!(out, " G{}", 21 - modal.units as u8);
    write!(out, " G{}", modal.distance as u8 + 90);
    write!(out, " G{}", 94 - modal.feed_mode as u8);

    if modal.scaling_active {
        write!(out, " G51:{}", gcode.scaling_axes);
    } else {
        out.write_str(" G50");
    }

    if let Some(code) = program_flow_code(modal.program_flow) {
        write!(out, " M{}", code);
    }

    out.write_str(match (modal.spindle.on, modal.spindle.ccw) {
        (true, false) => " M3",
        (true, true) => " M4",
        (false, _) => " M5",
    });

    if gcode.tool_change {
        out.write_str(" M6");
    }

    if modal.coolant.any() {
        if modal.coolant.mist {
            out.write_str(" M7");
        }
        if modal.coolant.flood {
            out.write_str(" M8");
        }
    } else {
        out.write_str(" M9");
    }

    let overrides = &gcode.override_control;
    if overrides.feed_rate_disable {
        out.write_str(" M50");
    }
    if overrides.spindle_rpm_disable {
        out.write_str(" M51");
    }
    if overrides.feed_hold_disable {
        out.write_str(" M53");
    }
    if config.capabilities.parking_override_control && overrides.parking_disable {
        out.write_str(" M56");
    }

    let units = ReportUnits::from_report_inches(report_inches);
    write!(out, " T{} F{}", gcode.tool, units.rate(gcode.feed_rate));

    if config.capabilities.variable_spindle {
        write!(out, " S{}", Fixed(gcode.spindle_rpm, N_DECIMAL_RPMVALUE));
    }

    out.write_str("]\r\n");
}
