use grbl_report::state::OverrideState;
use num_enum::TryFromPrimitive;

/// Single-byte commands acted on as soon as they arrive, outside the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RealtimeCommand {
    Reset = 0x18,
    StatusReport = b'?',
    CycleStart = b'~',
    FeedHold = b'!',
    SafetyDoor = 0x84,
    JogCancel = 0x85,
    MpgModeToggle = 0x8B,
    FeedOverrideReset = 0x90,
    FeedOverridePlusTen = 0x91,
    FeedOverrideMinusTen = 0x92,
    FeedOverridePlusOne = 0x93,
    FeedOverrideMinusOne = 0x94,
    RapidOverrideReset = 0x95,
    RapidOverrideHalf = 0x96,
    RapidOverrideQuarter = 0x97,
    SpindleOverrideReset = 0x99,
    SpindleOverridePlusTen = 0x9A,
    SpindleOverrideMinusTen = 0x9B,
    SpindleOverridePlusOne = 0x9C,
    SpindleOverrideMinusOne = 0x9D,
}

pub const FEED_OVERRIDE_RANGE: (u8, u8) = (10, 200);
pub const SPINDLE_OVERRIDE_RANGE: (u8, u8) = (10, 200);

fn step(value: u8, delta: i16, (min, max): (u8, u8)) -> u8 {
    (value as i16 + delta).clamp(min as i16, max as i16) as u8
}

impl RealtimeCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::try_from(byte).ok()
    }

    /// Applies an override command. Returns whether `overrides` changed.
    pub fn apply_override(self, overrides: &mut OverrideState) -> bool {
        let before = *overrides;
        match self {
            RealtimeCommand::FeedOverrideReset => overrides.feed = 100,
            RealtimeCommand::FeedOverridePlusTen => {
                overrides.feed = step(overrides.feed, 10, FEED_OVERRIDE_RANGE)
            }
            RealtimeCommand::FeedOverrideMinusTen => {
                overrides.feed = step(overrides.feed, -10, FEED_OVERRIDE_RANGE)
            }
            RealtimeCommand::FeedOverridePlusOne => {
                overrides.feed = step(overrides.feed, 1, FEED_OVERRIDE_RANGE)
            }
            RealtimeCommand::FeedOverrideMinusOne => {
                overrides.feed = step(overrides.feed, -1, FEED_OVERRIDE_RANGE)
            }
            RealtimeCommand::RapidOverrideReset => overrides.rapid = 100,
            RealtimeCommand::RapidOverrideHalf => overrides.rapid = 50,
            RealtimeCommand::RapidOverrideQuarter => overrides.rapid = 25,
            RealtimeCommand::SpindleOverrideReset => overrides.spindle = 100,
            RealtimeCommand::SpindleOverridePlusTen => {
                overrides.spindle = step(overrides.spindle, 10, SPINDLE_OVERRIDE_RANGE)
            }
            RealtimeCommand::SpindleOverrideMinusTen => {
                overrides.spindle = step(overrides.spindle, -10, SPINDLE_OVERRIDE_RANGE)
            }
            RealtimeCommand::SpindleOverridePlusOne => {
                overrides.spindle = step(overrides.spindle, 1, SPINDLE_OVERRIDE_RANGE)
            }
            RealtimeCommand::SpindleOverrideMinusOne => {
                overrides.spindle = step(overrides.spindle, -1, SPINDLE_OVERRIDE_RANGE)
            }
            _ => {}
        }
        *overrides != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_map_to_commands() {
        assert_eq!(RealtimeCommand::from_byte(b'?'), Some(RealtimeCommand::StatusReport));
        assert_eq!(RealtimeCommand::from_byte(0x18), Some(RealtimeCommand::Reset));
        assert_eq!(RealtimeCommand::from_byte(0x9C), Some(RealtimeCommand::SpindleOverridePlusOne));
        assert_eq!(RealtimeCommand::from_byte(b'G'), None);
        assert_eq!(RealtimeCommand::from_byte(0x98), None);
    }

    #[test]
    fn overrides_clamp_to_range() {
        let mut overrides = OverrideState::default();
        for _ in 0..15 {
            RealtimeCommand::FeedOverridePlusTen.apply_override(&mut overrides);
        }
        assert_eq!(overrides.feed, 200);
        assert!(!RealtimeCommand::FeedOverridePlusOne.apply_override(&mut overrides));
        assert!(RealtimeCommand::RapidOverrideQuarter.apply_override(&mut overrides));
        assert_eq!(overrides.rapid, 25);
        for _ in 0..30 {
            RealtimeCommand::SpindleOverrideMinusTen.apply_override(&mut overrides);
        }
        assert_eq!(overrides.spindle, 10);
        assert!(RealtimeCommand::FeedOverrideReset.apply_override(&mut overrides));
        assert_eq!(overrides.feed, 100);
        assert!(!RealtimeCommand::StatusReport.apply_override(&mut overrides));
    }
}
