//! `$#`: stored coordinate systems, offsets, tool table and probe result.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;
use tracing::warn;

use crate::{
    codes::StatusCode,
    config::ReportConfig,
    format::{AxisValues, ReportUnits},
    messages::report_status_message,
    modal::write_coord_system,
    settings::Settings,
    sink::OutputSink,
    state::{steps_to_mpos, AxisArray, GcodeState, ProbeResult, ToolData},
};

/// A persisted coordinate record, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateSlot {
    /// `G54` (0) through `G59.3` (8).
    Work(u8),
    G28,
    G30,
}

impl CoordinateSlot {
    pub const WORK_SYSTEMS: u8 = 9;

    pub fn all() -> impl Iterator<Item = CoordinateSlot> {
        (0..Self::WORK_SYSTEMS)
            .map(CoordinateSlot::Work)
            .chain([CoordinateSlot::G28, CoordinateSlot::G30])
    }

    /// Index of the record in persistent storage.
    pub fn index(self) -> u8 {
        match self {
            CoordinateSlot::Work(index) => index,
            CoordinateSlot::G28 => Self::WORK_SYSTEMS,
            CoordinateSlot::G30 => Self::WORK_SYSTEMS + 1,
        }
    }

    fn write_name(self, out: &mut dyn OutputSink) {
        match self {
            CoordinateSlot::Work(index) => write_coord_system(index, out),
            CoordinateSlot::G28 => out.write_str("28"),
            CoordinateSlot::G30 => out.write_str("30"),
        }
    }
}

impl Display for CoordinateSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSlot::Work(index) if *index > 5 => write!(f, "G59.{}", index - 5),
            CoordinateSlot::Work(index) => write!(f, "G{}", index + 54),
            CoordinateSlot::G28 => write!(f, "G28"),
            CoordinateSlot::G30 => write!(f, "G30"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsReadError {
    #[error("stored data for {0} failed its integrity check")]
    Corrupt(CoordinateSlot),
    #[error("no stored data for {0}")]
    Missing(CoordinateSlot),
}

/// Persistent storage of coordinate records.
pub trait SettingsStore {
    fn read_coord_data(&self, slot: CoordinateSlot) -> Result<AxisArray, SettingsReadError>;
}

fn write_bracketed(
    name: impl Display,
    units: ReportUnits,
    values: &[f32],
    out: &mut dyn OutputSink,
) {
    write!(out, "[{}:{}]\r\n", name, AxisValues(units, values));
}

/// Writes the `$#` block.
///
/// Stops at the first coordinate record that cannot be read: lines already written
/// stay, `error:7` follows, and the error is returned so the caller does not
/// acknowledge the command again.
pub fn report_ngc_parameters(
    gcode: &GcodeState,
    settings: &Settings,
    config: &ReportConfig,
    tool_table: &[ToolData],
    probe: &ProbeResult,
    store: &dyn SettingsStore,
    out: &mut dyn OutputSink,
) -> Result<(), SettingsReadError> {
    let units = ReportUnits::from_report_inches(settings.report_inches);
    let axes = config.axis_count;

    for slot in CoordinateSlot::all() {
        let data = match store.read_coord_data(slot) {
            Ok(data) => data,
            Err(err) => {
                warn!(%slot, %err, "parameter report aborted");
                report_status_message(StatusCode::SettingReadFail, out);
                return Err(err);
            }
        };
        out.write_str("[G");
        slot.write_name(out);
        write!(out, ":{}]\r\n", AxisValues(units, &data[..axes]));
    }

    write_bracketed("G92", units, &gcode.g92_offset[..axes], out);

    if let Some(n_tools) = config.build.n_tools {
        for tool in 1..=usize::from(n_tools) {
            let offset = tool_table.get(tool).map(|data| data.offset).unwrap_or_default();
            write_bracketed(format_args!("T{}", tool), units, &offset[..axes], out);
        }
    }

    write_bracketed("TLO", units, &gcode.tool_length_offset[..axes], out);

    let position = steps_to_mpos(&probe.position, &settings.steps_per_mm);
    write!(
        out,
        "[PRB:{}:{}]\r\n",
        AxisValues(units, &position[..axes]),
        u8::from(probe.succeeded)
    );
    Ok(())
}
