//! Numeric code catalogs shared with host senders.
//!
//! The discriminants are part of the wire protocol: hosts look them up in their own
//! tables, so they must never be renumbered.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Outcome of executing one input line, reported as `ok` or `error:<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    ExpectedCommandLetter = 1,
    BadNumberFormat = 2,
    InvalidStatement = 3,
    NegativeValue = 4,
    SettingDisabled = 5,
    SettingStepPulseMin = 6,
    SettingReadFail = 7,
    IdleError = 8,
    SystemGcLock = 9,
    SoftLimitError = 10,
    Overflow = 11,
    MaxStepRateExceeded = 12,
    CheckDoor = 13,
    LineLengthExceeded = 14,
    TravelExceeded = 15,
    InvalidJogCommand = 16,
    SettingDisabledLaser = 17,
    Reset = 18,
    NonPositiveValue = 19,
    GcodeUnsupportedCommand = 20,
    GcodeModalGroupViolation = 21,
    GcodeUndefinedFeedRate = 22,
    GcodeCommandValueNotInteger = 23,
    GcodeAxisCommandConflict = 24,
    GcodeWordRepeated = 25,
    GcodeNoAxisWords = 26,
    GcodeInvalidLineNumber = 27,
    GcodeValueWordMissing = 28,
    GcodeUnsupportedCoordSys = 29,
    GcodeG53InvalidMotionMode = 30,
    GcodeAxisWordsExist = 31,
    GcodeNoAxisWordsInPlane = 32,
    GcodeInvalidTarget = 33,
    GcodeArcRadiusError = 34,
    GcodeNoOffsetsInPlane = 35,
    GcodeUnusedWords = 36,
    GcodeG43DynamicAxisError = 37,
    GcodeIllegalToolTableEntry = 38,
    GcodeValueOutOfRange = 39,
    GcodeToolChangePending = 40,
    GcodeSpindleNotRunning = 41,
    GcodeIllegalPlane = 42,
    GcodeMaxFeedRateExceeded = 43,
    GcodeRpmOutOfRange = 44,
    LimitsEngaged = 45,
    HomingRequired = 46,
    GcodeToolError = 47,
    ValueWordConflict = 48,
}

impl StatusCode {
    pub const ALL: [StatusCode; 49] = [
        StatusCode::Ok,
        StatusCode::ExpectedCommandLetter,
        StatusCode::BadNumberFormat,
        StatusCode::InvalidStatement,
        StatusCode::NegativeValue,
        StatusCode::SettingDisabled,
        StatusCode::SettingStepPulseMin,
        StatusCode::SettingReadFail,
        StatusCode::IdleError,
        StatusCode::SystemGcLock,
        StatusCode::SoftLimitError,
        StatusCode::Overflow,
        StatusCode::MaxStepRateExceeded,
        StatusCode::CheckDoor,
        StatusCode::LineLengthExceeded,
        StatusCode::TravelExceeded,
        StatusCode::InvalidJogCommand,
        StatusCode::SettingDisabledLaser,
        StatusCode::Reset,
        StatusCode::NonPositiveValue,
        StatusCode::GcodeUnsupportedCommand,
        StatusCode::GcodeModalGroupViolation,
        StatusCode::GcodeUndefinedFeedRate,
        StatusCode::GcodeCommandValueNotInteger,
        StatusCode::GcodeAxisCommandConflict,
        StatusCode::GcodeWordRepeated,
        StatusCode::GcodeNoAxisWords,
        StatusCode::GcodeInvalidLineNumber,
        StatusCode::GcodeValueWordMissing,
        StatusCode::GcodeUnsupportedCoordSys,
        StatusCode::GcodeG53InvalidMotionMode,
        StatusCode::GcodeAxisWordsExist,
        StatusCode::GcodeNoAxisWordsInPlane,
        StatusCode::GcodeInvalidTarget,
        StatusCode::GcodeArcRadiusError,
        StatusCode::GcodeNoOffsetsInPlane,
        StatusCode::GcodeUnusedWords,
        StatusCode::GcodeG43DynamicAxisError,
        StatusCode::GcodeIllegalToolTableEntry,
        StatusCode::GcodeValueOutOfRange,
        StatusCode::GcodeToolChangePending,
        StatusCode::GcodeSpindleNotRunning,
        StatusCode::GcodeIllegalPlane,
        StatusCode::GcodeMaxFeedRateExceeded,
        StatusCode::GcodeRpmOutOfRange,
        StatusCode::LimitsEngaged,
        StatusCode::HomingRequired,
        StatusCode::GcodeToolError,
        StatusCode::ValueWordConflict,
    ];

    pub fn code(self) -> u8 {
        self.into()
    }

    /// Short description for logs. Never sent on the wire.
    pub fn description(self) -> &'static str {
        match self {
            StatusCode::Ok => "Ok",
            StatusCode::ExpectedCommandLetter => "Expected command letter",
            StatusCode::BadNumberFormat => "Bad number format",
            StatusCode::InvalidStatement => "Invalid statement",
            StatusCode::NegativeValue => "Value < 0",
            StatusCode::SettingDisabled => "Setting disabled",
            StatusCode::SettingStepPulseMin => "Value < 3 usec",
            StatusCode::SettingReadFail => "EEPROM read fail. Using defaults",
            StatusCode::IdleError => "Not idle",
            StatusCode::SystemGcLock => "G-code lock",
            StatusCode::SoftLimitError => "Homing not enabled",
            StatusCode::Overflow => "Line overflow",
            StatusCode::MaxStepRateExceeded => "Step rate > 30kHz",
            StatusCode::CheckDoor => "Check Door",
            StatusCode::LineLengthExceeded => "Line length exceeded",
            StatusCode::TravelExceeded => "Travel exceeded",
            StatusCode::InvalidJogCommand => "Invalid jog command",
            StatusCode::SettingDisabledLaser => "Setting disabled",
            StatusCode::Reset => "Reset asserted",
            StatusCode::NonPositiveValue => "Value <= 0",
            StatusCode::GcodeUnsupportedCommand => "Unsupported command",
            StatusCode::GcodeModalGroupViolation => "Modal group violation",
            StatusCode::GcodeUndefinedFeedRate => "Undefined feed rate",
            StatusCode::GcodeCommandValueNotInteger => "Invalid gcode ID:23",
            StatusCode::GcodeAxisCommandConflict => "Invalid gcode ID:24",
            StatusCode::GcodeWordRepeated => "Invalid gcode ID:25",
            StatusCode::GcodeNoAxisWords => "Invalid gcode ID:26",
            StatusCode::GcodeInvalidLineNumber => "Invalid gcode ID:27",
            StatusCode::GcodeValueWordMissing => "Invalid gcode ID:28",
            StatusCode::GcodeUnsupportedCoordSys => "Invalid gcode ID:29",
            StatusCode::GcodeG53InvalidMotionMode => "Invalid gcode ID:30",
            StatusCode::GcodeAxisWordsExist => "Invalid gcode ID:31",
            StatusCode::GcodeNoAxisWordsInPlane => "Invalid gcode ID:32",
            StatusCode::GcodeInvalidTarget => "Invalid gcode ID:33",
            StatusCode::GcodeArcRadiusError => "Invalid gcode ID:34",
            StatusCode::GcodeNoOffsetsInPlane => "Invalid gcode ID:35",
            StatusCode::GcodeUnusedWords => "Invalid gcode ID:36",
            StatusCode::GcodeG43DynamicAxisError => "Invalid gcode ID:37",
            StatusCode::GcodeIllegalToolTableEntry => "Invalid gcode ID:38",
            StatusCode::GcodeValueOutOfRange => "Value out of range",
            StatusCode::GcodeToolChangePending => "Tool change pending",
            StatusCode::GcodeSpindleNotRunning => "Spindle not running",
            StatusCode::GcodeIllegalPlane => "Plane must be ZX",
            StatusCode::GcodeMaxFeedRateExceeded => "Max feed rate exceeded",
            StatusCode::GcodeRpmOutOfRange => "RPM out of range",
            StatusCode::LimitsEngaged => "Limit switch engaged",
            StatusCode::HomingRequired => "Homing required",
            StatusCode::GcodeToolError => "Tool error",
            StatusCode::ValueWordConflict => "Value word conflict",
        }
    }
}

/// Alarm codes, reported as `ALARM:<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AlarmCode {
    HardLimit = 1,
    SoftLimit = 2,
    AbortCycle = 3,
    ProbeFailInitial = 4,
    ProbeFailContact = 5,
    HomingFailReset = 6,
    HomingFailDoor = 7,
    FailPulloff = 8,
    HomingFailApproach = 9,
    EStop = 10,
    HomingRequired = 11,
    LimitsEngaged = 12,
    ProbeProtect = 13,
    Spindle = 14,
}

impl AlarmCode {
    pub fn code(self) -> u8 {
        self.into()
    }
}

/// Feedback messages, reported as `[MSG:<text>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageCode {
    CriticalEvent = 1,
    AlarmLock = 2,
    AlarmUnlock = 3,
    Enabled = 4,
    Disabled = 5,
    SafetyDoorAjar = 6,
    CheckLimits = 7,
    ProgramEnd = 8,
    RestoreDefaults = 9,
    SpindleRestore = 10,
    SleepMode = 11,
    EStop = 12,
}

impl MessageCode {
    pub fn text(self) -> &'static str {
        match self {
            MessageCode::CriticalEvent => "Reset to continue",
            MessageCode::AlarmLock => "'$H'|'$X' to unlock",
            MessageCode::AlarmUnlock => "Caution: Unlocked",
            MessageCode::Enabled => "Enabled",
            MessageCode::Disabled => "Disabled",
            MessageCode::SafetyDoorAjar => "Check Door",
            MessageCode::CheckLimits => "Check Limits",
            MessageCode::ProgramEnd => "Pgm End",
            MessageCode::RestoreDefaults => "Restoring defaults",
            MessageCode::SpindleRestore => "Restoring spindle",
            MessageCode::SleepMode => "Sleeping",
            MessageCode::EStop => "Emergency stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_catalog_is_dense_and_ordered() {
        for (index, status) in StatusCode::ALL.iter().enumerate() {
            assert_eq!(status.code() as usize, index);
            assert_eq!(StatusCode::try_from(index as u8).ok(), Some(*status));
        }
        assert!(StatusCode::try_from(49u8).is_err());
    }

    #[test]
    fn message_codes_round_trip_through_u8() {
        assert_eq!(MessageCode::try_from(6u8).ok(), Some(MessageCode::SafetyDoorAjar));
        assert!(MessageCode::try_from(0u8).is_err());
        assert!(MessageCode::try_from(200u8).is_err());
    }
}
