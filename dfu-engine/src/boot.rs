// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decides at reset whether to start the application or stay in update mode.

use bitflags::bitflags;
use consts::{DFU_RESET_REASONS, ERASED_WORD};

use crate::vectors::VectorTable;

bitflags! {
    /// POWER.RESETREAS bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ResetReason: u32 {
        const RESETPIN = 1 << 0;
        const DOG = 1 << 1;
        const SREQ = 1 << 2;
        const LOCKUP = 1 << 3;
        const OFF = 1 << 16;
        const LPCOMP = 1 << 17;
        const DIF = 1 << 18;
        const NFC = 1 << 19;
        const VBUS = 1 << 20;
    }
}

impl ResetReason {
    /// Reset causes that keep the device in the bootloader.
    pub const UPDATE_TRIGGERS: Self = Self::from_bits_retain(DFU_RESET_REASONS);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateCause {
    /// The application reset handler slot is erased.
    NoApplication,
    /// The retained register was non-zero.
    Requested { retained: u32 },
    /// The last reset was a watchdog or soft reset. Carries the raw bits.
    Reset { reasons: u32 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    StartApplication,
    EnterUpdate(UpdateCause),
}

/// Retained register and reset reason of the power peripheral.
pub trait TriggerRegisters {
    /// Value of the retained general purpose register.
    fn retained(&self) -> u32;

    fn reset_reason(&self) -> ResetReason;

    /// Clears `reasons` in the reset reason register (write one to clear).
    fn clear_reset_reason(&mut self, reasons: ResetReason);

    /// Zeroes the retained register.
    fn clear_retained(&mut self);
}

/// Boot decision from the application reset handler word and the trigger state.
///
/// The application is started only when it is present, no update was
/// requested through the retained register and the last reset was neither a
/// watchdog nor a soft reset.
pub fn decide(reset_handler: u32, retained: u32, reset_reason: ResetReason) -> BootDecision {
    if reset_handler == ERASED_WORD {
        return BootDecision::EnterUpdate(UpdateCause::NoApplication);
    }
    if retained != 0 {
        return BootDecision::EnterUpdate(UpdateCause::Requested { retained });
    }
    let triggers = reset_reason & ResetReason::UPDATE_TRIGGERS;
    if !triggers.is_empty() {
        return BootDecision::EnterUpdate(UpdateCause::Reset {
            reasons: triggers.bits(),
        });
    }
    BootDecision::StartApplication
}

/// Runs [`decide`] against the installed application and the live registers.
///
/// The trigger registers are only read when an application is present. When
/// the bootloader stays, the update reset reasons and the retained register
/// are cleared so the next reset starts the application again.
pub fn select<R: TriggerRegisters>(app: &VectorTable, registers: &mut R) -> BootDecision {
    let decision = if app.is_application_present() {
        decide(app.reset_handler(), registers.retained(), registers.reset_reason())
    } else {
        BootDecision::EnterUpdate(UpdateCause::NoApplication)
    };

    if let BootDecision::EnterUpdate(cause) = decision {
        dfu_log!(info, "staying in bootloader: {}", cause);
        registers.clear_reset_reason(ResetReason::UPDATE_TRIGGERS);
        registers.clear_retained();
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors::SLOT_COUNT;

    const APP_RESET: u32 = 0x0002_6101;

    struct FakePower {
        retained: u32,
        reasons: ResetReason,
        clears: usize,
    }

    impl FakePower {
        fn new(retained: u32, reasons: ResetReason) -> Self {
            FakePower {
                retained,
                reasons,
                clears: 0,
            }
        }
    }

    impl TriggerRegisters for FakePower {
        fn retained(&self) -> u32 {
            self.retained
        }

        fn reset_reason(&self) -> ResetReason {
            self.reasons
        }

        fn clear_reset_reason(&mut self, reasons: ResetReason) {
            self.clears += 1;
            self.reasons.remove(reasons);
        }

        fn clear_retained(&mut self) {
            self.retained = 0;
        }
    }

    fn table(reset_handler: u32) -> VectorTable {
        let mut words = [ERASED_WORD; SLOT_COUNT];
        words[0] = 0x2001_0000;
        words[1] = reset_handler;
        VectorTable::new(words)
    }

    #[test]
    fn missing_application_enters_update() {
        assert_eq!(
            decide(ERASED_WORD, 0, ResetReason::RESETPIN),
            BootDecision::EnterUpdate(UpdateCause::NoApplication)
        );
    }

    #[test]
    fn retained_request_enters_update() {
        assert_eq!(
            decide(APP_RESET, 1, ResetReason::empty()),
            BootDecision::EnterUpdate(UpdateCause::Requested { retained: 1 })
        );
    }

    #[test]
    fn watchdog_and_soft_reset_enter_update() {
        assert_eq!(
            decide(APP_RESET, 0, ResetReason::DOG),
            BootDecision::EnterUpdate(UpdateCause::Reset { reasons: 0x2 })
        );
        assert_eq!(
            decide(APP_RESET, 0, ResetReason::SREQ | ResetReason::RESETPIN),
            BootDecision::EnterUpdate(UpdateCause::Reset { reasons: 0x4 })
        );
    }

    #[test]
    fn clean_reset_starts_the_application() {
        assert_eq!(decide(APP_RESET, 0, ResetReason::empty()), BootDecision::StartApplication);
        assert_eq!(
            decide(APP_RESET, 0, ResetReason::RESETPIN | ResetReason::LOCKUP | ResetReason::OFF),
            BootDecision::StartApplication
        );
    }

    #[test]
    fn update_path_clears_the_triggers() {
        let mut power = FakePower::new(0xA5, ResetReason::SREQ | ResetReason::RESETPIN);
        let decision = select(&table(APP_RESET), &mut power);
        assert_eq!(decision, BootDecision::EnterUpdate(UpdateCause::Requested { retained: 0xA5 }));
        assert_eq!(power.retained, 0);
        assert_eq!(power.reasons, ResetReason::RESETPIN);

        assert_eq!(select(&table(APP_RESET), &mut power), BootDecision::StartApplication);
    }

    #[test]
    fn application_path_leaves_the_registers_alone() {
        let mut power = FakePower::new(0, ResetReason::RESETPIN);
        assert_eq!(select(&table(APP_RESET), &mut power), BootDecision::StartApplication);
        assert_eq!(power.clears, 0);
        assert_eq!(power.reasons, ResetReason::RESETPIN);
    }

    #[test]
    fn erased_table_still_clears_pending_triggers() {
        let mut power = FakePower::new(7, ResetReason::DOG);
        assert_eq!(
            select(&table(ERASED_WORD), &mut power),
            BootDecision::EnterUpdate(UpdateCause::NoApplication)
        );
        assert_eq!(power.retained, 0);
        assert!(power.reasons.is_empty());
    }
}
