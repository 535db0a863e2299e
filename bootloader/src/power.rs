// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::pac;
use dfu_engine::{ResetReason, TriggerRegisters};

/// GPREGRET and RESETREAS of the POWER peripheral.
pub struct PowerRegisters {
    pub power: pac::POWER,
}

impl TriggerRegisters for PowerRegisters {
    fn retained(&self) -> u32 {
        self.power.gpregret.read().bits()
    }

    fn reset_reason(&self) -> ResetReason {
        ResetReason::from_bits_retain(self.power.resetreas.read().bits())
    }

    fn clear_reset_reason(&mut self, reasons: ResetReason) {
        self.power.resetreas.write(|w| unsafe { w.bits(reasons.bits()) });
    }

    fn clear_retained(&mut self) {
        self.power.gpregret.write(|w| unsafe { w.bits(0) });
    }
}
