//! Text reports of a GRBL-style motion controller.
//!
//! Every function here renders controller state into the line protocol that
//! host senders parse: the `<...>` status frame, `ok`/`error:` acknowledgments,
//! alarms, `[MSG:]` feedback and the `$` command dumps. Output goes through an
//! [`OutputSink`]; the encoders never allocate and never fail, except for the
//! settings read done by the `$#` report.

pub mod build_info;
pub mod codes;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod format;
pub mod messages;
pub mod modal;
pub mod parameters;
pub mod provider;
pub mod refresh;
pub mod reporter;
pub mod settings;
pub mod sink;
pub mod state;
pub mod status;

pub use codes::{AlarmCode, MessageCode, StatusCode};
pub use config::{Capabilities, ConfigError, ReportConfig};
pub use driver::DriverExtension;
pub use parameters::{CoordinateSlot, SettingsReadError, SettingsStore};
pub use provider::MachineStateProvider;
pub use refresh::ReportState;
pub use reporter::Reporter;
pub use settings::{ReportMask, Settings};
pub use sink::{BufferSink, OutputSink};
