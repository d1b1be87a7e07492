use tracing::debug;

use crate::{
    config::ReportConfig,
    format::{Fixed, N_DECIMAL_PIDVALUE},
    sink::OutputSink,
    state::PidLog,
};

/// Values captured per sample: target and actual.
const VALUES_PER_SAMPLE: usize = 2;

/// Dumps the spindle PID capture buffer as one `[PID:...]` line. Writes nothing
/// unless the controller was built with PID logging.
pub fn report_pid_log(log: &PidLog<'_>, config: &ReportConfig, out: &mut dyn OutputSink) {
    if !config.capabilities.pid_log {
        debug!("pid log requested but not available");
        return;
    }
    write!(
        out,
        "[PID:{},{},{}|",
        Fixed(log.setpoint, N_DECIMAL_PIDVALUE),
        Fixed(log.t_sample, N_DECIMAL_PIDVALUE),
        VALUES_PER_SAMPLE
    );
    for (index, (target, actual)) in log.samples.iter().enumerate() {
        if index > 0 {
            out.write_char(',');
        }
        write!(
            out,
            "{},{}",
            Fixed(*target, N_DECIMAL_PIDVALUE),
            Fixed(*actual, N_DECIMAL_PIDVALUE)
        );
    }
    out.write_str("]\r\n");
}
