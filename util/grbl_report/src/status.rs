//! The `<...>` real-time status frame sent in answer to `?`.

use crate::{
    config::ReportConfig,
    driver::DriverExtension,
    format::{AxisValues, Fixed, ReportUnits, N_DECIMAL_RPMVALUE},
    refresh::ReportState,
    settings::Settings,
    sink::OutputSink,
    state::{
        steps_to_mpos, ControlSignals, GcodeState, MachineSnapshot, MachineState, AXIS_LETTERS,
    },
};

/// Control pin letters of the `Pn:` field, in wire order.
const CONTROL_PIN_LETTERS: [(fn(&ControlSignals) -> bool, char); 7] = [
    (|pins| pins.safety_door_ajar, 'D'),
    (|pins| pins.reset, 'R'),
    (|pins| pins.feed_hold, 'H'),
    (|pins| pins.cycle_start, 'S'),
    (|pins| pins.e_stop, 'E'),
    (|pins| pins.block_delete, 'B'),
    (|pins| pins.stop_disable, 'T'),
];

fn write_state(state: MachineState, out: &mut dyn OutputSink) {
    match state {
        MachineState::Idle => out.write_str("Idle"),
        MachineState::Run => out.write_str("Run"),
        MachineState::Hold { holding_state } => {
            write!(out, "Hold:{}", holding_state.wrapping_sub(1))
        }
        MachineState::Jog => out.write_str("Jog"),
        MachineState::Home => out.write_str("Home"),
        MachineState::Alarm | MachineState::EStop => out.write_str("Alarm"),
        MachineState::Check => out.write_str("Check"),
        MachineState::Door { parking_state } => write!(out, "Door:{}", parking_state),
        MachineState::Sleep => out.write_str("Sleep"),
        MachineState::ToolChange => out.write_str("Tool"),
    }
}

fn write_pin_state(snapshot: &MachineSnapshot, axis_count: usize, out: &mut dyn OutputSink) {
    let pins = &snapshot.pins;
    let limits = (0..axis_count).filter(|axis| pins.limits.contains(*axis));
    if limits.clone().next().is_none()
        && !pins.control.any()
        && !pins.probe
        && !snapshot.block_delete_enabled
    {
        return;
    }
    out.write_str("|Pn:");
    if pins.probe {
        out.write_char('P');
    }
    for axis in limits {
        out.write_char(AXIS_LETTERS[axis]);
    }
    for (is_set, letter) in CONTROL_PIN_LETTERS {
        if is_set(&pins.control) {
            out.write_char(letter);
        }
    }
    if snapshot.block_delete_enabled {
        out.write_char('B');
    }
}

fn write_accessories(snapshot: &MachineSnapshot, tool_change: bool, out: &mut dyn OutputSink) {
    if snapshot.spindle.on {
        out.write_char(if snapshot.spindle.ccw { 'C' } else { 'S' });
    }
    if snapshot.coolant.flood {
        out.write_char('F');
    }
    if snapshot.coolant.mist {
        out.write_char('M');
    }
    if tool_change {
        out.write_char('T');
    }
}

/// Writes one status frame and advances the refresh counters.
///
/// Which optional fields appear depends on the report mask in `settings`, the
/// capabilities in `config` and the counters and dirty flags in `state`.
pub fn report_realtime_status(
    snapshot: &MachineSnapshot,
    gcode: &GcodeState,
    settings: &Settings,
    config: &ReportConfig,
    driver: Option<&dyn DriverExtension>,
    state: &mut ReportState,
    out: &mut dyn OutputSink,
) {
    let mask = &settings.status_report;
    let units = ReportUnits::from_report_inches(settings.report_inches);
    let axes = config.axis_count;
    let busy = snapshot.state.is_busy();

    out.write_char('<');
    write_state(snapshot.state, out);

    let wco = gcode.work_coordinate_offset();
    let mut position = steps_to_mpos(&snapshot.position, &settings.steps_per_mm);
    if mask.machine_position {
        out.write_str("|MPos:");
    } else {
        for (value, offset) in position.iter_mut().zip(wco) {
            *value -= offset;
        }
        out.write_str("|WPos:");
    }
    write!(out, "{}", AxisValues(units, &position[..axes]));

    if mask.buffer_state {
        write!(
            out,
            "|Bf:{},{}",
            snapshot.planner_blocks_available, snapshot.rx_buffer_available
        );
    }

    if mask.line_numbers {
        if let Some(line) = snapshot.current_line_number.filter(|line| *line > 0) {
            write!(out, "|Ln:{}", line);
        }
    }

    if mask.feed_speed {
        let feed = units.rate(snapshot.realtime_feed_rate);
        if config.capabilities.variable_spindle {
            write!(
                out,
                "|FS:{},{}",
                feed,
                Fixed(snapshot.spindle_rpm, N_DECIMAL_RPMVALUE)
            );
            if let Some(actual) = snapshot.spindle_actual_rpm {
                write!(out, ",{}", Fixed(actual, N_DECIMAL_RPMVALUE));
            }
        } else {
            write!(out, "|F:{}", feed);
        }
    }

    if mask.pin_state {
        write_pin_state(snapshot, axes, out);
    }

    let mut overrides_allowed = state.overrides_due();

    if mask.work_coord_offset && state.tick_wco(busy, &config.refresh) {
        overrides_allowed = false;
        write!(out, "|WCO:{}", AxisValues(units, &wco[..axes]));
    }

    if mask.overrides {
        if let Some(forced) = state.tick_overrides(overrides_allowed, busy, &config.refresh) {
            let overrides = &snapshot.overrides;
            write!(
                out,
                "|Ov:{},{},{}",
                overrides.feed, overrides.rapid, overrides.spindle
            );
            if snapshot.spindle.on || snapshot.coolant.any() || gcode.tool_change || forced {
                out.write_str("|A:");
                write_accessories(snapshot, gcode.tool_change, out);
            }
        }
    } else if gcode.tool_change {
        out.write_str("|A:T");
    }

    if state.take_scaling_changed() {
        write!(out, "|Sc:{}", gcode.scaling_axes);
    }

    if state.take_mpg_changed() {
        write!(out, "|MPG:{}", if snapshot.mpg_mode { '1' } else { '0' });
    }

    if let Some(driver) = driver {
        driver.realtime_report(out);
    }

    out.write_str(">\r\n");
}
