use tracing::debug;

use crate::{
    build_info::report_build_info,
    codes::{AlarmCode, MessageCode, StatusCode},
    config::ReportConfig,
    diagnostics::report_pid_log,
    driver::DriverExtension,
    messages,
    modal::report_gcode_modes,
    parameters::{report_ngc_parameters, SettingsReadError, SettingsStore},
    provider::MachineStateProvider,
    refresh::ReportState,
    settings::report_grbl_settings,
    sink::OutputSink,
    status::report_realtime_status,
};

/// Owns everything that outlives a single report: the configuration, the refresh
/// counters and the optional driver hook.
pub struct Reporter {
    config: ReportConfig,
    state: ReportState,
    driver: Option<Box<dyn DriverExtension + Send>>,
}

impl Reporter {
    /// Out-of-range configuration values are clamped rather than rejected.
    pub fn new(config: ReportConfig) -> Self {
        let config = config.clamped();
        debug!(axes = config.axis_count, capabilities = ?config.capabilities, "report path configured");
        Reporter {
            config,
            state: ReportState::new(),
            driver: None,
        }
    }

    pub fn with_driver(mut self, driver: impl DriverExtension + Send + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    /// For the event handlers that force fields into the next frame.
    pub fn state_mut(&mut self) -> &mut ReportState {
        &mut self.state
    }

    fn driver(&self) -> Option<&dyn DriverExtension> {
        self.driver
            .as_deref()
            .map(|driver| driver as &dyn DriverExtension)
    }

    pub fn realtime_status(&mut self, machine: &dyn MachineStateProvider, out: &mut dyn OutputSink) {
        let driver = self.driver.as_deref().map(|driver| driver as &dyn DriverExtension);
        report_realtime_status(
            &machine.snapshot(),
            machine.gcode_state(),
            machine.settings(),
            &self.config,
            driver,
            &mut self.state,
            out,
        );
    }

    pub fn status_message(&self, status: StatusCode, out: &mut dyn OutputSink) {
        messages::report_status_message(status, out);
    }

    pub fn alarm_message(&self, alarm: AlarmCode, out: &mut dyn OutputSink) {
        messages::report_alarm_message(alarm, out);
    }

    pub fn feedback_message(&self, message: MessageCode, out: &mut dyn OutputSink) {
        messages::report_feedback_message(message, out);
    }

    pub fn init_message(&self, out: &mut dyn OutputSink) {
        messages::report_init_message(out);
    }

    pub fn help(&self, out: &mut dyn OutputSink) {
        messages::report_grbl_help(out);
    }

    pub fn startup_line(&self, index: u8, line: &str, out: &mut dyn OutputSink) {
        messages::report_startup_line(index, line, out);
    }

    pub fn execute_startup_message(&self, line: &str, status: StatusCode, out: &mut dyn OutputSink) {
        messages::report_execute_startup_message(line, status, out);
    }

    pub fn echo_line_received(&self, line: &str, out: &mut dyn OutputSink) {
        messages::report_echo_line_received(line, out);
    }

    pub fn grbl_settings(&self, machine: &dyn MachineStateProvider, out: &mut dyn OutputSink) {
        report_grbl_settings(machine.settings(), &self.config, self.driver(), out);
    }

    pub fn gcode_modes(&self, machine: &dyn MachineStateProvider, out: &mut dyn OutputSink) {
        report_gcode_modes(
            machine.gcode_state(),
            machine.settings().report_inches,
            &self.config,
            out,
        );
    }

    pub fn ngc_parameters(
        &self,
        machine: &dyn MachineStateProvider,
        store: &dyn SettingsStore,
        out: &mut dyn OutputSink,
    ) -> Result<(), SettingsReadError> {
        report_ngc_parameters(
            machine.gcode_state(),
            machine.settings(),
            &self.config,
            machine.tool_table(),
            &machine.probe(),
            store,
            out,
        )
    }

    pub fn build_info(&self, line: &str, out: &mut dyn OutputSink) {
        report_build_info(line, &self.config, out);
    }

    pub fn pid_log(&self, machine: &dyn MachineStateProvider, out: &mut dyn OutputSink) {
        report_pid_log(&machine.pid_log(), &self.config, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::write_uint_setting,
        settings::{ReportMask, Settings},
        sink::BufferSink,
        state::{GcodeState, MachineSnapshot, MachineState, ProbeResult},
    };

    struct Machine {
        snapshot: MachineSnapshot,
        gcode: GcodeState,
        settings: Settings,
    }

    impl MachineStateProvider for Machine {
        fn snapshot(&self) -> MachineSnapshot {
            self.snapshot
        }
        fn gcode_state(&self) -> &GcodeState {
            &self.gcode
        }
        fn settings(&self) -> &Settings {
            &self.settings
        }
        fn probe(&self) -> ProbeResult {
            ProbeResult::default()
        }
    }

    struct Driver;

    impl DriverExtension for Driver {
        fn settings_report(&self, axis_settings: bool, out: &mut dyn OutputSink) {
            if axis_settings {
                write_uint_setting(out, 150, 16);
            }
        }
        fn realtime_report(&self, out: &mut dyn OutputSink) {
            out.write_str("|TMC:ok");
        }
    }

    fn machine() -> Machine {
        Machine {
            snapshot: MachineSnapshot::default(),
            gcode: GcodeState::default(),
            settings: Settings {
                status_report: ReportMask::from_bits(0x61),
                ..Settings::default()
            },
        }
    }

    #[test]
    fn counters_persist_between_frames() {
        let machine = machine();
        let mut reporter = Reporter::new(ReportConfig::standard_3_axis());
        let mut sink = BufferSink::new();

        reporter.realtime_status(&machine, &mut sink);
        assert!(sink.take().0.contains("|WCO:"));
        reporter.realtime_status(&machine, &mut sink);
        assert!(sink.take().0.contains("|Ov:"));
        assert_eq!(reporter.state().wco_counter(), 8);

        reporter.state_mut().force_wco();
        reporter.realtime_status(&machine, &mut sink);
        assert!(sink.take().0.contains("|WCO:"));
    }

    #[test]
    fn snapshot_is_read_on_every_call() {
        let mut machine = machine();
        let mut reporter = Reporter::new(ReportConfig::standard_3_axis());
        let mut sink = BufferSink::new();
        reporter.realtime_status(&machine, &mut sink);
        machine.snapshot.state = MachineState::Run;
        reporter.realtime_status(&machine, &mut sink);
        let lines: Vec<&str> = sink.lines().collect();
        assert!(lines[0].starts_with("<Idle|"));
        assert!(lines[1].starts_with("<Run|"));
    }

    #[test]
    fn out_of_range_config_is_clamped() {
        let machine = machine();
        let mut config = ReportConfig::standard_3_axis();
        config.axis_count = 8;
        config.refresh.wco_idle = 1;
        let mut reporter = Reporter::new(config);
        assert_eq!(reporter.config().axis_count, crate::state::MAX_AXES);
        let mut sink = BufferSink::new();
        for _ in 0..3 {
            reporter.realtime_status(&machine, &mut sink);
        }
        let lines: Vec<&str> = sink.lines().collect();
        assert!(lines[0].starts_with("<Idle|MPos:0.000,0.000,0.000,0.000,0.000,0.000|WCO:"), "{}", lines[0]);
        assert!(lines[1].contains("|Ov:"), "{}", lines[1]);
    }

    #[test]
    fn driver_hook_reaches_status_and_settings() {
        let machine = machine();
        let mut reporter = Reporter::new(ReportConfig::standard_3_axis()).with_driver(Driver);
        let mut sink = BufferSink::new();
        reporter.realtime_status(&machine, &mut sink);
        assert!(sink.take().0.ends_with("|TMC:ok>\r\n"));
        reporter.grbl_settings(&machine, &mut sink);
        assert_eq!(sink.lines().last(), Some("$150=16"));
    }
}
