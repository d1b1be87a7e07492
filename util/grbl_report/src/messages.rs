//! One-line responses: acknowledgments, alarms, feedback and the small fixed
//! texts of the `$` command set.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    codes::{AlarmCode, MessageCode, StatusCode},
    sink::OutputSink,
};

/// Time the alarm line is given to drain before the caller continues.
pub const ALARM_DELAY: Duration = Duration::from_millis(500);

pub const GRBL_VERSION: &str = "1.1f";
pub const GRBL_VERSION_BUILD: &str = "20181125";

/// Acknowledges one executed line.
pub fn report_status_message(status: StatusCode, out: &mut dyn OutputSink) {
    match status {
        StatusCode::Ok => out.write_str("ok\r\n"),
        error => {
            debug!(code = error.code(), "{}", error.description());
            write!(out, "error:{}\r\n", error.code());
        }
    }
}

/// Announces an alarm, then blocks for [`ALARM_DELAY`].
pub fn report_alarm_message(alarm: AlarmCode, out: &mut dyn OutputSink) {
    warn!(code = alarm.code(), ?alarm, "alarm raised");
    write!(out, "ALARM:{}\r\n", alarm.code());
    out.delay(ALARM_DELAY);
}

/// `[MSG:...]` for a catalog entry.
pub fn report_feedback_message(message: MessageCode, out: &mut dyn OutputSink) {
    write!(out, "[MSG:{}]\r\n", message.text());
}

/// `[MSG:...]` for a raw message number; numbers outside the catalog give an
/// empty message.
pub fn report_feedback_code(code: u8, out: &mut dyn OutputSink) {
    let text = MessageCode::try_from(code).map(MessageCode::text).unwrap_or("");
    write!(out, "[MSG:{}]\r\n", text);
}

pub fn report_init_message(out: &mut dyn OutputSink) {
    write!(out, "\r\nGrblHAL {} ['$' for help]\r\n", GRBL_VERSION);
}

pub fn report_grbl_help(out: &mut dyn OutputSink) {
    out.write_str("[HLP:$$ $# $G $I $N $x=val $Nx=line $J=line $SLP $C $X $H $B ~ ! ? ctrl-x]\r\n");
}

/// One stored startup line, as listed by `$N`.
pub fn report_startup_line(index: u8, line: &str, out: &mut dyn OutputSink) {
    write!(out, "$N{}={}\r\n", index, line);
}

/// Echo of a startup line as it runs, followed by its acknowledgment.
pub fn report_execute_startup_message(line: &str, status: StatusCode, out: &mut dyn OutputSink) {
    write!(out, ">{}:", line);
    report_status_message(status, out);
}

pub fn report_echo_line_received(line: &str, out: &mut dyn OutputSink) {
    write!(out, "[echo: {}]\r\n", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;

    fn render(report: impl FnOnce(&mut dyn OutputSink)) -> String {
        let mut sink = BufferSink::new();
        report(&mut sink);
        sink.take().0
    }

    #[test]
    fn every_status_code_acks_exactly() {
        for status in StatusCode::ALL {
            let text = render(|out| report_status_message(status, out));
            if status == StatusCode::Ok {
                assert_eq!(text, "ok\r\n");
            } else {
                assert_eq!(text, format!("error:{}\r\n", status.code()));
            }
        }
    }

    #[test]
    fn alarm_line_then_delay() {
        let mut sink = BufferSink::new();
        report_alarm_message(AlarmCode::HardLimit, &mut sink);
        assert_eq!(sink.as_str(), "ALARM:1\r\n");
        assert_eq!(sink.delays(), &[ALARM_DELAY]);
    }

    #[test]
    fn feedback_catalog_and_unknown_codes() {
        assert_eq!(
            render(|out| report_feedback_message(MessageCode::AlarmLock, out)),
            "[MSG:'$H'|'$X' to unlock]\r\n"
        );
        assert_eq!(render(|out| report_feedback_code(8, out)), "[MSG:Pgm End]\r\n");
        assert_eq!(render(|out| report_feedback_code(0, out)), "[MSG:]\r\n");
        assert_eq!(render(|out| report_feedback_code(99, out)), "[MSG:]\r\n");
    }

    #[test]
    fn fixed_texts() {
        assert_eq!(render(report_init_message), "\r\nGrblHAL 1.1f ['$' for help]\r\n");
        assert!(render(report_grbl_help).starts_with("[HLP:$$ $# $G $I $N"));
        assert_eq!(render(|out| report_startup_line(1, "G20", out)), "$N1=G20\r\n");
        assert_eq!(
            render(|out| report_execute_startup_message("G21 G90", StatusCode::Ok, out)),
            ">G21 G90:ok\r\n"
        );
        assert_eq!(
            render(|out| report_execute_startup_message("G5", StatusCode::GcodeUnsupportedCommand, out)),
            ">G5:error:20\r\n"
        );
        assert_eq!(render(|out| report_echo_line_received("G0X1", out)), "[echo: G0X1]\r\n");
    }
}
