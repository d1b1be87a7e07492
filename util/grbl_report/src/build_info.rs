use crate::{
    config::{Capabilities, ReportConfig},
    messages::{GRBL_VERSION, GRBL_VERSION_BUILD},
    sink::OutputSink,
};

/// Option letters of `[OPT:...]`, in wire order. Some letters announce a
/// missing feature rather than a present one.
const OPTION_LETTERS: [(fn(&Capabilities) -> bool, char); 19] = [
    (|caps| caps.variable_spindle, 'V'),
    (|_| true, 'N'),
    (|caps| caps.mist_control, 'M'),
    (|caps| caps.corexy, 'C'),
    (|caps| caps.parking, 'P'),
    (|caps| caps.homing_force_set_origin, 'Z'),
    (|caps| caps.homing_single_axis_commands, 'H'),
    (|caps| caps.limits_two_switches_on_axes, 'T'),
    (|caps| caps.allow_feed_override_during_probe, 'A'),
    (|caps| caps.spindle_off_with_zero_speed, '0'),
    (|caps| caps.software_debounce, 'S'),
    (|caps| caps.parking_override_control, 'R'),
    (|caps| !caps.homing_init_lock, 'L'),
    (|caps| caps.safety_door_input, '+'),
    (|caps| !caps.restore_wipe_all, '*'),
    (|caps| !caps.restore_default_settings, '$'),
    (|caps| !caps.restore_clear_parameters, '#'),
    (|caps| !caps.build_info_write_command, 'I'),
    (|caps| !caps.force_buffer_sync_during_wco_change, 'W'),
];

/// Writes the `[VER:...]` and `[OPT:...]` lines for `$I`. `line` is the
/// user-stored build info string.
pub fn report_build_info(line: &str, config: &ReportConfig, out: &mut dyn OutputSink) {
    let build = &config.build;
    write!(
        out,
        "[VER:{}({}).{}:{}]\r\n",
        GRBL_VERSION,
        build.driver_info.as_deref().unwrap_or("HAL"),
        GRBL_VERSION_BUILD,
        line
    );

    out.write_str("[OPT:");
    for (present, letter) in OPTION_LETTERS {
        if present(&config.capabilities) {
            out.write_char(letter);
        }
    }
    // Tool table means automatic tool change.
    if build.n_tools.is_some() {
        out.write_char('V');
    } else if config.capabilities.manual_tool_change {
        out.write_char('U');
    }

    write!(
        out,
        ",{},{},{}",
        build.block_buffer_size.saturating_sub(1),
        build.rx_buffer_size,
        config.axis_count
    );
    if let Some(n_tools) = build.n_tools {
        write!(out, ",{}", n_tools);
    }
    out.write_str("]\r\n");
}
