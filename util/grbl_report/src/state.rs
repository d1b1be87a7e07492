//! Snapshots of machine state read by the encoders.
//!
//! Everything here is owned by the motion/parser side of the controller; the
//! report path only ever reads it.

use serde::{Deserialize, Serialize};

pub const MAX_AXES: usize = 6;
pub const AXIS_LETTERS: [char; MAX_AXES] = ['X', 'Y', 'Z', 'A', 'B', 'C'];

/// One value per axis; only the first `axis_count` entries are meaningful.
pub type AxisArray = [f32; MAX_AXES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Run,
    /// `holding_state` is the internal 1-based hold phase.
    Hold { holding_state: u8 },
    Jog,
    Home,
    Alarm,
    EStop,
    Check,
    Door { parking_state: u8 },
    Sleep,
    ToolChange,
}

impl MachineState {
    /// States that refresh the slow status fields at the faster cadence.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            MachineState::Home
                | MachineState::Run
                | MachineState::Hold { .. }
                | MachineState::Jog
                | MachineState::Door { .. }
        )
    }
}

/// Bit set of axes, bit 0 for X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisMask(pub u8);

impl AxisMask {
    pub fn contains(self, axis: usize) -> bool {
        axis < 8 && self.0 & (1 << axis) != 0
    }
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlSignals {
    pub safety_door_ajar: bool,
    pub reset: bool,
    pub feed_hold: bool,
    pub cycle_start: bool,
    pub e_stop: bool,
    pub block_delete: bool,
    pub stop_disable: bool,
}

impl ControlSignals {
    pub fn any(&self) -> bool {
        self.safety_door_ajar
            || self.reset
            || self.feed_hold
            || self.cycle_start
            || self.e_stop
            || self.block_delete
            || self.stop_disable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinState {
    pub limits: AxisMask,
    pub control: ControlSignals,
    pub probe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpindleState {
    pub on: bool,
    pub ccw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoolantState {
    pub flood: bool,
    pub mist: bool,
}

impl CoolantState {
    pub fn any(&self) -> bool {
        self.flood || self.mist
    }
}

/// Runtime override percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideState {
    pub feed: u8,
    pub rapid: u8,
    pub spindle: u8,
}

impl Default for OverrideState {
    fn default() -> Self {
        OverrideState { feed: 100, rapid: 100, spindle: 100 }
    }
}

/// Real-time machine state, copied out fresh for every status report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub state: MachineState,
    /// Step counts per axis.
    pub position: [i32; MAX_AXES],
    pub planner_blocks_available: u8,
    pub rx_buffer_available: u32,
    /// Line number of the block currently executing, if any.
    pub current_line_number: Option<i32>,
    pub realtime_feed_rate: f32,
    pub spindle_rpm: f32,
    /// Measured spindle speed, when the spindle reports one.
    pub spindle_actual_rpm: Option<f32>,
    pub pins: PinState,
    pub block_delete_enabled: bool,
    pub overrides: OverrideState,
    pub spindle: SpindleState,
    pub coolant: CoolantState,
    pub mpg_mode: bool,
}

impl Default for MachineSnapshot {
    fn default() -> Self {
        MachineSnapshot {
            state: MachineState::Idle,
            position: [0; MAX_AXES],
            planner_blocks_available: 0,
            rx_buffer_available: 0,
            current_line_number: None,
            realtime_feed_rate: 0.0,
            spindle_rpm: 0.0,
            spindle_actual_rpm: None,
            pins: PinState::default(),
            block_delete_enabled: false,
            overrides: OverrideState::default(),
            spindle: SpindleState::default(),
            coolant: CoolantState::default(),
            mpg_mode: false,
        }
    }
}

/// Converts step counts into machine position.
pub fn steps_to_mpos(steps: &[i32; MAX_AXES], steps_per_mm: &AxisArray) -> AxisArray {
    let mut position = [0.0; MAX_AXES];
    for (axis, value) in position.iter_mut().enumerate() {
        if steps_per_mm[axis] != 0.0 {
            *value = steps[axis] as f32 / steps_per_mm[axis];
        }
    }
    position
}

/// Motion modes, with the controller's internal numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotionMode {
    #[default]
    Seek = 0,
    Linear = 1,
    CwArc = 2,
    CcwArc = 3,
    CubicSpline = 5,
    SpindleSynchronized = 33,
    DrillChipBreak = 73,
    None = 80,
    CannedCycle81 = 81,
    CannedCycle82 = 82,
    CannedCycle83 = 83,
    CannedCycle85 = 85,
    CannedCycle86 = 86,
    CannedCycle89 = 89,
    ProbeToward = 140,
    ProbeTowardNoError = 141,
    ProbeAway = 142,
    ProbeAwayNoError = 143,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Plane {
    #[default]
    XY = 0,
    ZX = 1,
    YZ = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Units {
    #[default]
    Millimeters = 0,
    Inches = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DistanceMode {
    #[default]
    Absolute = 0,
    Incremental = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeedMode {
    #[default]
    UnitsPerMinute = 0,
    InverseTime = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProgramFlow {
    #[default]
    Running = 0,
    OptionalStop = 1,
    CompletedM2 = 2,
    Paused = 3,
    CompletedM30 = 30,
}

/// Override controls disabled by M50/M51/M53/M56.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverrideControl {
    pub feed_rate_disable: bool,
    pub spindle_rpm_disable: bool,
    pub feed_hold_disable: bool,
    pub parking_disable: bool,
}

/// Sticky G-code modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModalState {
    pub motion: MotionMode,
    /// 0 for G54 through 8 for G59.3.
    pub coord_system: u8,
    pub plane: Plane,
    pub units: Units,
    pub distance: DistanceMode,
    pub feed_mode: FeedMode,
    pub program_flow: ProgramFlow,
    pub spindle: SpindleState,
    pub coolant: CoolantState,
    pub scaling_active: bool,
}

/// Parser-side state: modal groups plus the offsets and values that go with them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GcodeState {
    pub modal: ModalState,
    pub coord_system_offset: AxisArray,
    pub g92_offset: AxisArray,
    pub tool_length_offset: AxisArray,
    pub diameter_mode: bool,
    pub tool_change: bool,
    pub tool: u32,
    pub feed_rate: f32,
    pub spindle_rpm: f32,
    /// Bit set of axes with G51 scaling applied.
    pub scaling_axes: u8,
    pub override_control: OverrideControl,
}

impl GcodeState {
    /// Work coordinate offset: active coordinate system plus G92 plus tool length offset.
    pub fn work_coordinate_offset(&self) -> AxisArray {
        let mut wco = [0.0; MAX_AXES];
        for (axis, value) in wco.iter_mut().enumerate() {
            *value = self.coord_system_offset[axis]
                + self.g92_offset[axis]
                + self.tool_length_offset[axis];
        }
        wco
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolData {
    pub offset: AxisArray,
}

/// Result of the last probing cycle, in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeResult {
    pub position: [i32; MAX_AXES],
    pub succeeded: bool,
}

/// Samples captured by the spindle-sync PID loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidLog<'a> {
    pub setpoint: f32,
    pub t_sample: f32,
    /// `(target, actual)` pairs in capture order.
    pub samples: &'a [(f32, f32)],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_states_match_refresh_policy() {
        assert!(MachineState::Run.is_busy());
        assert!(MachineState::Hold { holding_state: 1 }.is_busy());
        assert!(MachineState::Door { parking_state: 0 }.is_busy());
        assert!(MachineState::Home.is_busy());
        assert!(MachineState::Jog.is_busy());
        assert!(!MachineState::Idle.is_busy());
        assert!(!MachineState::Alarm.is_busy());
        assert!(!MachineState::ToolChange.is_busy());
    }

    #[test]
    fn wco_sums_all_offsets() {
        let mut gcode = GcodeState::default();
        gcode.coord_system_offset[0] = 10.0;
        gcode.g92_offset[0] = 1.0;
        gcode.tool_length_offset[2] = -5.0;
        let wco = gcode.work_coordinate_offset();
        assert_eq!(&wco[..3], &[11.0, 0.0, -5.0]);
    }

    #[test]
    fn steps_convert_per_axis() {
        let steps = [800, -400, 0, 10, 0, 0];
        let steps_per_mm = [80.0, 80.0, 400.0, 0.0, 1.0, 1.0];
        let mpos = steps_to_mpos(&steps, &steps_per_mm);
        assert_eq!(&mpos[..4], &[10.0, -5.0, 0.0, 0.0]);
    }
}
