//! Cadence of the slow status fields.
//!
//! `WCO` and `Ov`/`A` change rarely, so they are only sent every few frames. Each
//! has a counter that counts down once per frame; when it is found at zero the
//! field goes out and the counter restarts from the busy or idle interval.

use tracing::{debug, trace};

use crate::config::RefreshIntervals;

impl RefreshIntervals {
    fn wco(&self, busy: bool) -> i16 {
        if busy {
            self.wco_busy
        } else {
            self.wco_idle
        }
    }
    fn overrides(&self, busy: bool) -> i16 {
        if busy {
            self.overrides_busy
        } else {
            self.overrides_idle
        }
    }
}

/// Counters and one-shot flags carried from one status frame to the next.
///
/// Starts with both counters at zero, so the first frame after startup carries
/// the work coordinate offset and the one after that the overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportState {
    wco_counter: i16,
    ovr_counter: i16,
    scaling_changed: bool,
    mpg_changed: bool,
}

impl ReportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wco_counter(&self) -> i16 {
        self.wco_counter
    }
    pub fn ovr_counter(&self) -> i16 {
        self.ovr_counter
    }

    /// Sends the work coordinate offset with the next frame.
    pub fn force_wco(&mut self) {
        self.wco_counter = 0;
    }

    /// Sends the override field with the next frame that can carry it, including
    /// an `A:` field even if no accessory is on.
    pub fn force_overrides(&mut self) {
        self.ovr_counter = -1;
    }

    pub fn set_scaling_changed(&mut self) {
        self.scaling_changed = true;
    }

    pub fn set_mpg_changed(&mut self) {
        self.mpg_changed = true;
    }

    /// Whether the override counter allows emission in the current frame.
    pub(crate) fn overrides_due(&self) -> bool {
        self.ovr_counter <= 0
    }

    /// Advances the WCO counter. Returns true when the field goes out this frame.
    pub(crate) fn tick_wco(&mut self, busy: bool, intervals: &RefreshIntervals) -> bool {
        if self.wco_counter > 0 {
            self.wco_counter -= 1;
            return false;
        }
        self.wco_counter = intervals.wco(busy) - 1;
        trace!(busy, next = self.wco_counter, "wco refresh");
        true
    }

    /// Advances the override counter. `allowed` is false when another slow field
    /// already went out this frame.
    ///
    /// Returns `Some(forced)` when the field goes out, where `forced` tells the
    /// caller to print `A:` regardless of accessory state.
    pub(crate) fn tick_overrides(
        &mut self,
        allowed: bool,
        busy: bool,
        intervals: &RefreshIntervals,
    ) -> Option<bool> {
        if self.ovr_counter > 0 {
            self.ovr_counter -= 1;
            return None;
        }
        if !allowed {
            return None;
        }
        let forced = self.ovr_counter < 0;
        self.ovr_counter = intervals.overrides(busy) - 1;
        trace!(busy, forced, next = self.ovr_counter, "override refresh");
        Some(forced)
    }

    pub(crate) fn take_scaling_changed(&mut self) -> bool {
        let changed = std::mem::take(&mut self.scaling_changed);
        if changed {
            debug!("reporting scaling change");
        }
        changed
    }

    pub(crate) fn take_mpg_changed(&mut self) -> bool {
        let changed = std::mem::take(&mut self.mpg_changed);
        if changed {
            debug!("reporting mpg mode change");
        }
        changed
    }
}
