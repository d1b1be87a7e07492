use crate::{
    settings::Settings,
    state::{GcodeState, MachineSnapshot, PidLog, ProbeResult, ToolData},
};

/// Read access to the state owned by the rest of the controller.
///
/// Every report pulls what it needs through here at the moment it is written;
/// nothing is cached between reports.
pub trait MachineStateProvider {
    fn snapshot(&self) -> MachineSnapshot;

    fn gcode_state(&self) -> &GcodeState;

    fn settings(&self) -> &Settings;

    /// Tool table indexed by tool number; entry 0 is "no tool".
    fn tool_table(&self) -> &[ToolData] {
        &[]
    }

    fn probe(&self) -> ProbeResult;

    fn pid_log(&self) -> PidLog<'_> {
        PidLog { setpoint: 0.0, t_sample: 0.0, samples: &[] }
    }
}
