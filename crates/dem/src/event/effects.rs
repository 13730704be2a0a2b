//! Pure status transitions
//!
//! Each trigger maps `(old status, context) -> (new status, effects)`.
//! Effects are edge triggered: a bit only appears when the underlying
//! status bit changes, so a repeated result inside one operation cycle
//! does not advance any counter twice.

use crate::status::{status_bit, UdsStatus};

/// Storage trigger flags raised by a transition
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventEffects(u8);

pub mod effect {
    pub const TESTFAILED: u8 = 0x01;
    pub const TESTFAILEDTHISCYCLE: u8 = 0x02;
    pub const FIRSTTHISCYCLE: u8 = 0x04;
    pub const PENDING: u8 = 0x08;
    pub const CONFIRMED: u8 = 0x10;
    pub const INDICATOR: u8 = 0x20;
    pub const PASSED: u8 = 0x40;
    /// Warning indicator cleared by healing
    pub const HEALED: u8 = 0x80;
}

impl EventEffects {
    pub const NONE: EventEffects = EventEffects(0);

    pub const fn from_bits(bits: u8) -> Self {
        EventEffects(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn raise(&mut self, flag: u8) {
        self.0 |= flag;
    }
}

impl std::fmt::Debug for EventEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [&str; 8] = [
            "TESTFAILED",
            "TESTFAILEDTHISCYCLE",
            "FIRSTTHISCYCLE",
            "PENDING",
            "CONFIRMED",
            "INDICATOR",
            "PASSED",
            "HEALED",
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "EventEffects({})", names.join("|"))
    }
}

/// Result of one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub old: UdsStatus,
    pub new: UdsStatus,
    pub effects: EventEffects,
}

/// Inputs of the failed transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailedContext {
    /// The event (or its memory representative) owns a fault memory entry
    pub stored: bool,
    pub retry_storage: bool,
    pub tfslc_stored_only: bool,
    /// Event has a DTC and its storage conditions are fulfilled
    pub storage_allowed: bool,
    /// Trip target reached (or zero) and similar conditions met
    pub test_confirmed: bool,
    pub has_indicator: bool,
}

/// A qualified failed result
pub fn on_failed(old: UdsStatus, ctx: &FailedContext) -> Transition {
    let mut new = old
        .with(status_bit::TF | status_bit::TFTOC)
        .without(status_bit::TNCSLC | status_bit::TNCTOC);
    if !ctx.tfslc_stored_only || ctx.stored {
        new = new.with(status_bit::TFSLC);
    }

    let mut effects = EventEffects::NONE;
    if !ctx.stored && ctx.retry_storage {
        effects.raise(effect::TESTFAILED | effect::TESTFAILEDTHISCYCLE | effect::FIRSTTHISCYCLE);
    } else {
        if !old.test_failed() {
            effects.raise(effect::TESTFAILED);
        }
        if !old.test_failed_this_cycle() {
            effects.raise(effect::TESTFAILEDTHISCYCLE);
        }
        if old.not_completed_this_cycle() {
            effects.raise(effect::FIRSTTHISCYCLE);
        }
    }

    if ctx.storage_allowed {
        if !old.pending() {
            effects.raise(effect::PENDING);
            new = new.with(status_bit::PDTC);
        }
        if !old.confirmed() && ctx.test_confirmed {
            effects.raise(effect::CONFIRMED);
            new = new.with(status_bit::CDTC);
            if ctx.has_indicator && !old.warning_indicator() {
                effects.raise(effect::INDICATOR);
                new = new.with(status_bit::WIR);
            }
        }
    }

    Transition { old, new, effects }
}

/// A qualified passed result
///
/// With `heal_immediately` (healing target 0) a set warning indicator is
/// cleared right away.
pub fn on_passed(old: UdsStatus, heal_immediately: bool) -> Transition {
    let mut new = old.without(status_bit::TF | status_bit::TNCSLC | status_bit::TNCTOC);
    let mut effects = EventEffects::NONE;
    if old.test_failed() {
        effects.raise(effect::PASSED);
    }
    if old.not_completed_this_cycle() {
        effects.raise(effect::FIRSTTHISCYCLE);
    }
    if heal_immediately && old.warning_indicator() {
        new = new.without(status_bit::WIR);
        effects.raise(effect::HEALED);
    }
    Transition { old, new, effects }
}

/// Operation cycle (re)start
pub fn on_cycle_start(old: UdsStatus, reset_test_failed: bool) -> UdsStatus {
    let mut new = old.without(status_bit::TFTOC).with(status_bit::TNCTOC);
    if reset_test_failed {
        new = new.without(status_bit::TF);
    }
    new
}

/// Outcome of an operation cycle end for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleEndOutcome {
    pub new: UdsStatus,
    /// Tested and not failed in the ending cycle
    pub passed_cycle: bool,
    /// Failed in the ending cycle while pending; the trip counter advances
    pub trip: bool,
}

/// Operation cycle end
///
/// A cycle that completed without failure resets the pending bit. Healing
/// and aging progress are decided by the caller from `passed_cycle`.
pub fn on_cycle_end(old: UdsStatus) -> CycleEndOutcome {
    let tested = !old.not_completed_this_cycle();
    let failed = old.test_failed_this_cycle();
    let passed_cycle = tested && !failed;
    let new = if passed_cycle {
        old.without(status_bit::PDTC)
    } else {
        old
    };
    CycleEndOutcome {
        new,
        passed_cycle,
        trip: failed && old.pending(),
    }
}

/// Aging completed
///
/// An aging target of 0 additionally clears PDTC and TFTOC.
pub fn on_aged(old: UdsStatus, immediate: bool) -> UdsStatus {
    let mut new = old.without(status_bit::CDTC);
    if immediate {
        new = new.without(status_bit::PDTC | status_bit::TFTOC);
    }
    new
}

/// The fault memory entry was displaced
pub fn on_displaced(old: UdsStatus) -> UdsStatus {
    old.without(status_bit::CDTC | status_bit::TFSLC)
}

/// Repair applied when restoring a status byte
///
/// TFTOC together with TNCTOC cannot be reached; TFTOC is dropped.
pub fn repair_restored(old: UdsStatus) -> UdsStatus {
    if old.test_failed_this_cycle() && old.not_completed_this_cycle() {
        old.without(status_bit::TFTOC)
    } else {
        old
    }
}
