//! A controller simulation that answers a host with the real report encoders.
//!
//! Motion is instantaneous: a move updates the step counters right away, so the
//! machine is only ever seen in `Run` through a feed hold or a pending tool change.
//! It understands enough G-code to keep the modal state and offsets realistic.

use std::{io::ErrorKind, time::Duration};

use anyhow::{Context, Result};
use grbl_report::{
    codes::{AlarmCode, MessageCode, StatusCode},
    messages,
    state::{
        steps_to_mpos, AxisArray, DistanceMode, FeedMode, GcodeState, MachineSnapshot,
        MachineState, MotionMode, PidLog, PinState, Plane, ProbeResult, ProgramFlow,
        SpindleState, ToolData, Units, AXIS_LETTERS, MAX_AXES,
    },
    CoordinateSlot, MachineStateProvider, OutputSink, ReportConfig, ReportMask, Reporter,
    SettingsReadError, SettingsStore, Settings,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::realtime::RealtimeCommand;

pub const LINE_BUFFER_SIZE: usize = 256;
pub const N_STARTUP_LINES: usize = 2;
const COORDINATE_SLOTS: usize = CoordinateSlot::WORK_SYSTEMS as usize + 2;
const MM_PER_INCH: f32 = 25.4;

#[derive(Debug)]
enum Chunk {
    Text(String),
    Delay(Duration),
}

/// Collects one response, keeping text and delays in the order they were produced.
#[derive(Debug, Default)]
pub struct ResponseSink {
    chunks: Vec<Chunk>,
}

impl OutputSink for ResponseSink {
    fn write_str(&mut self, s: &str) {
        match self.chunks.last_mut() {
            Some(Chunk::Text(text)) => text.push_str(s),
            _ => self.chunks.push(Chunk::Text(s.to_string())),
        }
    }
    fn delay(&mut self, duration: Duration) {
        self.chunks.push(Chunk::Delay(duration));
    }
}

impl ResponseSink {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Writes everything collected so far, sleeping where a delay was requested.
    pub async fn flush_to<W: AsyncWrite + Unpin>(&mut self, output: &mut W) -> Result<()> {
        for chunk in self.chunks.drain(..) {
            match chunk {
                Chunk::Text(text) => output
                    .write_all(text.as_bytes())
                    .await
                    .context("Failed to write response to host")?,
                Chunk::Delay(duration) => {
                    output.flush().await?;
                    sleep(duration).await;
                }
            }
        }
        output.flush().await?;
        Ok(())
    }
}

/// Words of one G-code block, grouped the way they are applied.
#[derive(Debug, Default)]
struct Block {
    g: Vec<f32>,
    m: Vec<f32>,
    axes: [Option<f32>; MAX_AXES],
    feed: Option<f32>,
    speed: Option<f32>,
    tool: Option<u32>,
    p: Option<f32>,
}

impl Block {
    fn parse(line: &str, axis_count: usize) -> Result<Block, StatusCode> {
        let mut block = Block::default();
        let mut depth = 0;
        let mut chars = line
            .chars()
            .take_while(|c| *c != ';')
            .filter(|c| {
                match *c {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => return depth == 0 && !c.is_whitespace(),
                }
                false
            })
            .map(|c| c.to_ascii_uppercase())
            .peekable();
        while let Some(letter) = chars.next() {
            if !letter.is_ascii_alphabetic() {
                return Err(StatusCode::ExpectedCommandLetter);
            }
            let mut number = String::new();
            while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+') {
                number.push(c);
            }
            let value: f32 = number.parse().map_err(|_| StatusCode::BadNumberFormat)?;
            match letter {
                'G' | 'M' if value < 0.0 => return Err(StatusCode::NegativeValue),
                'G' => block.g.push(value),
                'M' => block.m.push(value),
                'F' => block.feed = Some(value),
                'S' => block.speed = Some(value),
                'P' => block.p = Some(value),
                'N' => {}
                'T' => {
                    if value < 0.0 {
                        return Err(StatusCode::NegativeValue);
                    }
                    block.tool = Some(value as u32);
                }
                _ => match AXIS_LETTERS[..axis_count].iter().position(|axis| *axis == letter) {
                    Some(axis) => block.axes[axis] = Some(value),
                    None => return Err(StatusCode::GcodeUnsupportedCommand),
                },
            }
        }
        Ok(block)
    }

    fn has_axis_words(&self) -> bool {
        self.axes.iter().any(Option::is_some)
    }
}

/// G and M numbers compared in tenths, so `G38.2` is 382 and `G1` is 10.
fn code(value: f32) -> u32 {
    (value * 10.0).round() as u32
}

fn to_mm(units: Units, value: f32) -> f32 {
    match units {
        Units::Millimeters => value,
        Units::Inches => value * MM_PER_INCH,
    }
}

/// Rejects axis words the active motion mode cannot act on.
fn check_motion(gcode: &GcodeState) -> Result<(), StatusCode> {
    let motion = gcode.modal.motion;
    if motion == MotionMode::None {
        return Err(StatusCode::GcodeAxisWordsExist);
    }
    if motion != MotionMode::Seek
        && gcode.feed_rate == 0.0
        && gcode.modal.feed_mode == FeedMode::UnitsPerMinute
    {
        return Err(StatusCode::GcodeUndefinedFeedRate);
    }
    Ok(())
}

enum AxisCommand {
    Motion,
    G92,
    DynamicToolLength,
    Scaling,
}

/// Whether a handled line still needs its `ok`.
enum Reply {
    Ack,
    Sent,
}

pub struct SimulatedMachine {
    config: ReportConfig,
    snapshot: MachineSnapshot,
    gcode: GcodeState,
    settings: Settings,
    tool_table: Vec<ToolData>,
    probe: ProbeResult,
    coord_data: [Option<AxisArray>; COORDINATE_SLOTS],
    startup_lines: [String; N_STARTUP_LINES],
    build_info: String,
    pid_setpoint: f32,
    pid_samples: Vec<(f32, f32)>,
    echo_lines: bool,
}

impl SimulatedMachine {
    pub fn new(config: &ReportConfig) -> Self {
        let config = config.clone().clamped();
        let snapshot = MachineSnapshot {
            planner_blocks_available: config.build.block_buffer_size.saturating_sub(1).min(255) as u8,
            rx_buffer_available: config.build.rx_buffer_size,
            ..MachineSnapshot::default()
        };
        let tools = config.build.n_tools.map_or(0, |n_tools| usize::from(n_tools) + 1);
        SimulatedMachine {
            config,
            snapshot,
            gcode: GcodeState::default(),
            settings: Settings {
                status_report: ReportMask::from_bits(0x7f),
                ..Settings::default()
            },
            tool_table: vec![ToolData::default(); tools],
            probe: ProbeResult::default(),
            coord_data: [Some([0.0; MAX_AXES]); COORDINATE_SLOTS],
            startup_lines: Default::default(),
            build_info: String::new(),
            pid_setpoint: 0.0,
            pid_samples: Vec::new(),
            echo_lines: false,
        }
    }

    pub fn with_echo(mut self, echo_lines: bool) -> Self {
        self.echo_lines = echo_lines;
        self
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_pins(&mut self, pins: PinState) {
        self.snapshot.pins = pins;
    }

    /// Makes the stored record for `slot` unreadable, as after a storage fault.
    pub fn corrupt_coordinate_slot(&mut self, slot: CoordinateSlot) {
        self.coord_data[usize::from(slot.index())] = None;
    }

    /// Puts the machine in alarm, as a limit switch or fault would.
    pub fn raise_alarm(&mut self, alarm: AlarmCode, reporter: &Reporter, out: &mut dyn OutputSink) {
        self.snapshot.state = match alarm {
            AlarmCode::EStop => MachineState::EStop,
            _ => MachineState::Alarm,
        };
        reporter.alarm_message(alarm, out);
        reporter.feedback_message(MessageCode::CriticalEvent, out);
    }

    fn machine_position(&self) -> AxisArray {
        steps_to_mpos(&self.snapshot.position, &self.settings.steps_per_mm)
    }

    fn move_to(&mut self, target: &AxisArray) {
        for axis in 0..self.config.axis_count {
            self.snapshot.position[axis] = (target[axis] * self.settings.steps_per_mm[axis]).round() as i32;
        }
    }

    fn within_soft_limits(&self, target: &AxisArray) -> bool {
        !self.settings.soft_limit_enable
            || (0..self.config.axis_count)
                .all(|axis| target[axis] <= 0.0 && target[axis] >= self.settings.max_travel[axis])
    }

    /// Banner, then any stored startup lines, as after power-on or a soft reset.
    pub fn startup(&mut self, reporter: &mut Reporter, out: &mut dyn OutputSink) {
        reporter.init_message(out);
        if matches!(self.snapshot.state, MachineState::Alarm | MachineState::EStop) {
            reporter.feedback_message(MessageCode::AlarmLock, out);
            return;
        }
        for index in 0..N_STARTUP_LINES {
            let line = self.startup_lines[index].clone();
            if line.is_empty() {
                continue;
            }
            let status = match self.execute_gcode(reporter, &line, out) {
                Ok(()) => StatusCode::Ok,
                Err(status) => status,
            };
            reporter.execute_startup_message(&line, status, out);
        }
    }

    fn reset(&mut self, reporter: &mut Reporter, out: &mut dyn OutputSink) {
        info!("soft reset");
        self.snapshot.overrides = Default::default();
        self.snapshot.spindle = Default::default();
        self.snapshot.coolant = Default::default();
        self.gcode.modal.spindle = Default::default();
        self.gcode.modal.coolant = Default::default();
        self.gcode.modal.program_flow = ProgramFlow::Running;
        self.gcode.tool_change = false;
        if !matches!(self.snapshot.state, MachineState::Alarm | MachineState::EStop) {
            self.snapshot.state = MachineState::Idle;
        }
        self.startup(reporter, out);
    }

    pub fn handle_realtime(
        &mut self,
        reporter: &mut Reporter,
        command: RealtimeCommand,
        out: &mut dyn OutputSink,
    ) {
        debug!(?command, "realtime command");
        match command {
            RealtimeCommand::StatusReport => reporter.realtime_status(&*self, out),
            RealtimeCommand::Reset => self.reset(reporter, out),
            RealtimeCommand::FeedHold => {
                if matches!(self.snapshot.state, MachineState::Idle | MachineState::Run | MachineState::Jog) {
                    self.snapshot.state = MachineState::Hold { holding_state: 1 };
                }
            }
            RealtimeCommand::CycleStart => match self.snapshot.state {
                MachineState::Hold { .. } | MachineState::Door { .. } => {
                    self.snapshot.state = MachineState::Idle
                }
                MachineState::ToolChange => {
                    self.gcode.tool_change = false;
                    self.snapshot.state = MachineState::Idle;
                    reporter.state_mut().force_overrides();
                }
                _ => {}
            },
            RealtimeCommand::SafetyDoor => {
                self.snapshot.state = MachineState::Door { parking_state: 0 };
                reporter.feedback_message(MessageCode::SafetyDoorAjar, out);
            }
            RealtimeCommand::JogCancel => {
                if self.snapshot.state == MachineState::Jog {
                    self.snapshot.state = MachineState::Idle;
                }
            }
            RealtimeCommand::MpgModeToggle => {
                self.snapshot.mpg_mode = !self.snapshot.mpg_mode;
                reporter.state_mut().set_mpg_changed();
            }
            command => {
                if command.apply_override(&mut self.snapshot.overrides) {
                    reporter.state_mut().force_overrides();
                }
            }
        }
    }

    /// Runs one line from the host and acknowledges it.
    pub fn execute_line(&mut self, reporter: &mut Reporter, line: &str, out: &mut dyn OutputSink) {
        if self.echo_lines {
            reporter.echo_line_received(line, out);
        }
        let result = if let Some(command) = line.strip_prefix('$') {
            self.execute_system_command(reporter, command, out)
        } else if matches!(self.snapshot.state, MachineState::Alarm | MachineState::EStop) {
            Err(StatusCode::SystemGcLock)
        } else {
            self.execute_gcode(reporter, line, out).map(|()| Reply::Ack)
        };
        match result {
            Ok(Reply::Ack) => reporter.status_message(StatusCode::Ok, out),
            Ok(Reply::Sent) => {}
            Err(status) => {
                debug!(line, code = status.code(), "line rejected");
                reporter.status_message(status, out)
            }
        }
    }

    fn execute_system_command(
        &mut self,
        reporter: &mut Reporter,
        command: &str,
        out: &mut dyn OutputSink,
    ) -> Result<Reply, StatusCode> {
        match command.to_ascii_uppercase().as_str() {
            "" => reporter.help(out),
            "$" => reporter.grbl_settings(&*self, out),
            "#" => {
                if reporter.ngc_parameters(&*self, &*self, out).is_err() {
                    // error:7 already went out in place of the acknowledgment.
                    return Ok(Reply::Sent);
                }
            }
            "G" => reporter.gcode_modes(&*self, out),
            "I" => reporter.build_info(&self.build_info, out),
            "N" => {
                for (index, line) in self.startup_lines.iter().enumerate() {
                    reporter.startup_line(index as u8, line, out);
                }
            }
            "X" => {
                if matches!(self.snapshot.state, MachineState::Alarm | MachineState::EStop) {
                    self.snapshot.state = MachineState::Idle;
                    reporter.feedback_message(MessageCode::AlarmUnlock, out);
                }
            }
            "H" => {
                if !self.settings.homing_enable {
                    return Err(StatusCode::SettingDisabled);
                }
                self.snapshot.state = MachineState::Home;
                self.move_to(&[0.0; MAX_AXES]);
                self.snapshot.state = MachineState::Idle;
                reporter.state_mut().force_wco();
            }
            "C" => match self.snapshot.state {
                MachineState::Idle => {
                    self.snapshot.state = MachineState::Check;
                    reporter.feedback_message(MessageCode::Enabled, out);
                }
                MachineState::Check => {
                    self.snapshot.state = MachineState::Idle;
                    reporter.feedback_message(MessageCode::Disabled, out);
                }
                _ => return Err(StatusCode::IdleError),
            },
            "SLP" => {
                self.snapshot.state = MachineState::Sleep;
                reporter.feedback_message(MessageCode::SleepMode, out);
            }
            "PID" => reporter.pid_log(&*self, out),
            _ => self.write_setting(reporter, command)?,
        }
        Ok(Reply::Ack)
    }

    /// `$N<n>=<line>`, `$I=<text>` and `$<id>=<value>`.
    fn write_setting(&mut self, reporter: &mut Reporter, command: &str) -> Result<(), StatusCode> {
        let (key, value) = command.split_once('=').ok_or(StatusCode::InvalidStatement)?;
        let key = key.to_ascii_uppercase();
        if let Some(index) = key.strip_prefix('N') {
            let index: usize = index.parse().map_err(|_| StatusCode::BadNumberFormat)?;
            let slot = self.startup_lines.get_mut(index).ok_or(StatusCode::InvalidStatement)?;
            *slot = value.to_string();
            return Ok(());
        }
        if key == "I" {
            if !self.config.capabilities.build_info_write_command {
                return Err(StatusCode::SettingDisabled);
            }
            self.build_info = value.to_string();
            return Ok(());
        }
        let id: u16 = key.parse().map_err(|_| StatusCode::InvalidStatement)?;
        let value: f32 = value.trim().parse().map_err(|_| StatusCode::BadNumberFormat)?;
        if value < 0.0 {
            return Err(StatusCode::NegativeValue);
        }
        let settings = &mut self.settings;
        match id {
            10 => settings.status_report = ReportMask::from_bits(value as u8),
            13 => settings.report_inches = value != 0.0,
            20 => settings.soft_limit_enable = value != 0.0,
            22 => settings.homing_enable = value != 0.0,
            32 => settings.laser_mode = value != 0.0,
            100..=105 | 110..=115 | 120..=125 | 130..=135 => {
                let axis = usize::from(id % 10);
                if axis >= self.config.axis_count {
                    return Err(StatusCode::InvalidStatement);
                }
                match id / 10 {
                    10 if value == 0.0 => return Err(StatusCode::NonPositiveValue),
                    10 => settings.steps_per_mm[axis] = value,
                    11 => settings.max_rate[axis] = value,
                    12 => settings.acceleration[axis] = value * 60.0 * 60.0,
                    _ => settings.max_travel[axis] = -value,
                }
            }
            _ => return Err(StatusCode::InvalidStatement),
        }
        debug!(id, value, "setting stored");
        if id == 13 {
            reporter.state_mut().force_wco();
        }
        Ok(())
    }

    /// Runs one block. Words are applied to a copy of the parser state, which
    /// replaces the live one only once the whole block is accepted.
    fn execute_gcode(
        &mut self,
        reporter: &mut Reporter,
        line: &str,
        out: &mut dyn OutputSink,
    ) -> Result<(), StatusCode> {
        let block = Block::parse(line, self.config.axis_count)?;
        let mut gcode = self.gcode.clone();
        let mut axis_command = None;
        let mut coordinate_changed = false;
        let mut scaling_changed = false;

        for value in &block.g {
            let modal = &mut gcode.modal;
            match code(*value) {
                0 => modal.motion = MotionMode::Seek,
                10 => modal.motion = MotionMode::Linear,
                20 => modal.motion = MotionMode::CwArc,
                30 => modal.motion = MotionMode::CcwArc,
                382 => modal.motion = MotionMode::ProbeToward,
                383 => modal.motion = MotionMode::ProbeTowardNoError,
                384 => modal.motion = MotionMode::ProbeAway,
                385 => modal.motion = MotionMode::ProbeAwayNoError,
                800 => modal.motion = MotionMode::None,
                70 => gcode.diameter_mode = true,
                80 => gcode.diameter_mode = false,
                170 => modal.plane = Plane::XY,
                180 => modal.plane = Plane::ZX,
                190 => modal.plane = Plane::YZ,
                200 => modal.units = Units::Inches,
                210 => modal.units = Units::Millimeters,
                431 => axis_command = Some(AxisCommand::DynamicToolLength),
                490 => {
                    gcode.tool_length_offset = [0.0; MAX_AXES];
                    coordinate_changed = true;
                }
                500 => {
                    modal.scaling_active = false;
                    gcode.scaling_axes = 0;
                    scaling_changed = true;
                }
                510 => {
                    modal.scaling_active = true;
                    gcode.scaling_axes = block
                        .axes
                        .iter()
                        .enumerate()
                        .filter(|(_, value)| value.is_some())
                        .fold(0u8, |mask, (axis, _)| mask | (1u8 << axis));
                    axis_command = Some(AxisCommand::Scaling);
                    scaling_changed = true;
                }
                system @ (540 | 550 | 560 | 570 | 580 | 590 | 591 | 592 | 593) => {
                    let index = (if system > 590 { system - 585 } else { (system - 540) / 10 }) as usize;
                    modal.coord_system = index as u8;
                    gcode.coord_system_offset = self.coord_data[index]
                        .ok_or(StatusCode::SettingReadFail)?;
                    coordinate_changed = true;
                }
                900 => modal.distance = DistanceMode::Absolute,
                910 => modal.distance = DistanceMode::Incremental,
                920 => axis_command = Some(AxisCommand::G92),
                921 => {
                    gcode.g92_offset = [0.0; MAX_AXES];
                    coordinate_changed = true;
                }
                930 => modal.feed_mode = FeedMode::InverseTime,
                940 => modal.feed_mode = FeedMode::UnitsPerMinute,
                _ => return Err(StatusCode::GcodeUnsupportedCommand),
            }
        }

        if let Some(feed) = block.feed {
            gcode.feed_rate = to_mm(gcode.modal.units, feed);
        }
        if let Some(speed) = block.speed {
            gcode.spindle_rpm = speed;
        }
        if let Some(tool) = block.tool {
            if let Some(n_tools) = self.config.build.n_tools {
                if tool > u32::from(n_tools) {
                    return Err(StatusCode::GcodeIllegalToolTableEntry);
                }
            }
            gcode.tool = tool;
        }

        let mut program_flow = None;
        let mut tool_change = false;
        for value in &block.m {
            let modal = &mut gcode.modal;
            let disable = block.p.map_or(false, |p| p == 0.0);
            match code(*value) {
                0 => program_flow = Some(ProgramFlow::Paused),
                10 => program_flow = Some(ProgramFlow::OptionalStop),
                20 => program_flow = Some(ProgramFlow::CompletedM2),
                300 => program_flow = Some(ProgramFlow::CompletedM30),
                30 => modal.spindle = SpindleState { on: true, ccw: false },
                40 => modal.spindle = SpindleState { on: true, ccw: true },
                50 => modal.spindle = Default::default(),
                60 => {
                    gcode.tool_change = true;
                    tool_change = true;
                }
                70 => modal.coolant.mist = true,
                80 => modal.coolant.flood = true,
                90 => modal.coolant = Default::default(),
                500 => gcode.override_control.feed_rate_disable = disable,
                510 => gcode.override_control.spindle_rpm_disable = disable,
                530 => gcode.override_control.feed_hold_disable = disable,
                560 if self.config.capabilities.parking_override_control => {
                    gcode.override_control.parking_disable = disable
                }
                _ => return Err(StatusCode::GcodeUnsupportedCommand),
            }
        }

        let axis_command = match (block.has_axis_words(), axis_command) {
            (false, _) => None,
            (true, None) => {
                check_motion(&gcode)?;
                Some(AxisCommand::Motion)
            }
            (true, command) => command,
        };

        self.gcode = gcode;
        if scaling_changed {
            reporter.state_mut().set_scaling_changed();
        }
        if tool_change {
            self.snapshot.state = MachineState::ToolChange;
        }
        self.sync_spindle_and_coolant(reporter);

        match axis_command {
            None | Some(AxisCommand::Scaling) => {}
            Some(AxisCommand::Motion) => self.execute_motion(reporter, &block, out),
            Some(AxisCommand::G92) => {
                let position = self.machine_position();
                for axis in 0..self.config.axis_count {
                    if let Some(value) = block.axes[axis] {
                        self.gcode.g92_offset[axis] = position[axis]
                            - self.gcode.coord_system_offset[axis]
                            - self.gcode.tool_length_offset[axis]
                            - self.to_mm(value);
                    }
                }
                coordinate_changed = true;
            }
            Some(AxisCommand::DynamicToolLength) => {
                for axis in 0..self.config.axis_count {
                    if let Some(value) = block.axes[axis] {
                        self.gcode.tool_length_offset[axis] = self.to_mm(value);
                    }
                }
                coordinate_changed = true;
            }
        }

        if coordinate_changed {
            reporter.state_mut().force_wco();
        }

        if let Some(flow) = program_flow {
            self.gcode.modal.program_flow = flow;
            if matches!(flow, ProgramFlow::CompletedM2 | ProgramFlow::CompletedM30) {
                self.end_program(reporter);
                reporter.feedback_message(MessageCode::ProgramEnd, out);
            }
        }
        Ok(())
    }

    fn to_mm(&self, value: f32) -> f32 {
        to_mm(self.gcode.modal.units, value)
    }

    fn execute_motion(&mut self, reporter: &mut Reporter, block: &Block, out: &mut dyn OutputSink) {
        let motion = self.gcode.modal.motion;
        let wco = self.gcode.work_coordinate_offset();
        let mut target = self.machine_position();
        for axis in 0..self.config.axis_count {
            if let Some(value) = block.axes[axis] {
                let value = self.to_mm(value);
                target[axis] = match self.gcode.modal.distance {
                    DistanceMode::Absolute => value + wco[axis],
                    DistanceMode::Incremental => target[axis] + value,
                };
            }
        }
        if !self.within_soft_limits(&target) {
            warn!(?target, "soft limit");
            self.raise_alarm(AlarmCode::SoftLimit, reporter, out);
            return;
        }
        if self.snapshot.state == MachineState::Check {
            return;
        }
        self.move_to(&target);
        if matches!(
            motion,
            MotionMode::ProbeToward
                | MotionMode::ProbeTowardNoError
                | MotionMode::ProbeAway
                | MotionMode::ProbeAwayNoError
        ) {
            self.probe = ProbeResult { position: self.snapshot.position, succeeded: true };
        }
    }

    /// Actual spindle and coolant follow the programmed state immediately.
    fn sync_spindle_and_coolant(&mut self, reporter: &mut Reporter) {
        let modal = &self.gcode.modal;
        if self.snapshot.spindle != modal.spindle || self.snapshot.coolant != modal.coolant {
            self.snapshot.spindle = modal.spindle;
            self.snapshot.coolant = modal.coolant;
            reporter.state_mut().force_overrides();
        }
        self.snapshot.spindle_rpm = if modal.spindle.on { self.gcode.spindle_rpm } else { 0.0 };
        if modal.spindle.on && self.pid_setpoint != self.gcode.spindle_rpm {
            self.capture_spindle_ramp();
        }
    }

    /// Fills the PID log with a settling ramp towards the new setpoint.
    fn capture_spindle_ramp(&mut self) {
        let target = self.gcode.spindle_rpm;
        self.pid_setpoint = target;
        self.pid_samples = (1..=5)
            .map(|step| (target, target * (1.0 - 0.5f32.powi(step))))
            .collect();
    }

    fn end_program(&mut self, reporter: &mut Reporter) {
        let modal = &mut self.gcode.modal;
        modal.motion = MotionMode::Linear;
        modal.coord_system = 0;
        modal.plane = Plane::XY;
        modal.distance = DistanceMode::Absolute;
        modal.feed_mode = FeedMode::UnitsPerMinute;
        modal.spindle = Default::default();
        modal.coolant = Default::default();
        self.gcode.coord_system_offset = self.coord_data[0].unwrap_or_default();
        self.sync_spindle_and_coolant(reporter);
        reporter.state_mut().force_wco();
    }
}

impl MachineStateProvider for SimulatedMachine {
    fn snapshot(&self) -> MachineSnapshot {
        self.snapshot
    }
    fn gcode_state(&self) -> &GcodeState {
        &self.gcode
    }
    fn settings(&self) -> &Settings {
        &self.settings
    }
    fn tool_table(&self) -> &[ToolData] {
        &self.tool_table
    }
    fn probe(&self) -> ProbeResult {
        self.probe
    }
    fn pid_log(&self) -> PidLog<'_> {
        PidLog {
            setpoint: self.pid_setpoint,
            t_sample: 0.01,
            samples: &self.pid_samples,
        }
    }
}

impl SettingsStore for SimulatedMachine {
    fn read_coord_data(&self, slot: CoordinateSlot) -> Result<AxisArray, SettingsReadError> {
        self.coord_data
            .get(usize::from(slot.index()))
            .ok_or(SettingsReadError::Missing(slot))?
            .ok_or(SettingsReadError::Corrupt(slot))
    }
}

/// Serves one host connection until it closes.
///
/// Real-time bytes are answered as soon as they arrive; everything else is
/// collected into lines terminated by `\n`.
pub async fn serve<R, W>(
    mut machine: SimulatedMachine,
    mut reporter: Reporter,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = BufReader::new(input);
    let mut line = Vec::with_capacity(LINE_BUFFER_SIZE);
    let mut overflow = false;
    let mut response = ResponseSink::default();

    machine.startup(&mut reporter, &mut response);
    response.flush_to(&mut output).await?;

    loop {
        let byte = match input.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                info!("host disconnected");
                return Ok(());
            }
            Err(err) => return Err(err).context("Failed to read from host"),
        };
        if let Some(command) = RealtimeCommand::from_byte(byte) {
            if command == RealtimeCommand::Reset {
                line.clear();
                overflow = false;
            }
            machine.handle_realtime(&mut reporter, command, &mut response);
        } else {
            match byte {
                b'\n' => {
                    if overflow {
                        messages::report_status_message(StatusCode::Overflow, &mut response);
                    } else {
                        let text = String::from_utf8_lossy(&line).into_owned();
                        machine.execute_line(&mut reporter, text.trim(), &mut response);
                    }
                    line.clear();
                    overflow = false;
                }
                b'\r' => {}
                _ if line.len() < LINE_BUFFER_SIZE => line.push(byte),
                _ => overflow = true,
            }
        }
        if !response.is_empty() {
            response.flush_to(&mut output).await?;
        }
    }
}

/// [`serve`] as a detached task body; failures are logged rather than returned.
pub async fn simulated_machine<R, W>(machine: SimulatedMachine, reporter: Reporter, input: R, output: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(err) = serve(machine, reporter, input, output).await {
        warn!("simulated machine stopped: {:#}", err);
    }
}
