// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Interrupt ownership while the bootloader runs.
//!
//! The bootloader owns no interrupt itself. Every vector belongs either to the
//! BLE stack, whose table sits right after the MBR, or to the application,
//! whose table sits at the application base. The forwarding stubs of the
//! bootloader binary load the handler word at [`handler_slot_address`] and
//! branch to it.

use consts::{Layout, ERASED_WORD, STACK_BASE};

/// Number of words in the nRF52 vector table (16 exceptions + 48 IRQs).
pub const SLOT_COUNT: usize = 64;

/// Whose vector table a forwarded interrupt is looked up in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Owner {
    Stack,
    Application,
}

impl Owner {
    pub const fn table_base(self, layout: &Layout) -> u32 {
        match self {
            Owner::Stack => STACK_BASE,
            Owner::Application => layout.app_code_base,
        }
    }
}

/// Vector table slot of each forwarded exception and interrupt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Vector {
    SVCall = 11,
    PowerClock = 16,
    Radio = 17,
    Uarte0 = 18,
    Spi0Twi0 = 19,
    Spi1Twi1 = 20,
    Nfct = 21,
    Gpiote = 22,
    Saadc = 23,
    Timer0 = 24,
    Timer1 = 25,
    Timer2 = 26,
    Rtc0 = 27,
    Temp = 28,
    Rng = 29,
    Ecb = 30,
    CcmAar = 31,
    Wdt = 32,
    Rtc1 = 33,
    Qdec = 34,
    CompLpcomp = 35,
    Swi0Egu0 = 36,
    Swi1Egu1 = 37,
    Swi2Egu2 = 38,
    Swi3Egu3 = 39,
    Swi4Egu4 = 40,
    Swi5Egu5 = 41,
    Timer3 = 42,
    Timer4 = 43,
    Pwm0 = 44,
    Pdm = 45,
    Mwu = 48,
    Pwm1 = 49,
    Pwm2 = 50,
    Spi2 = 51,
    Rtc2 = 52,
    I2s = 53,
    Fpu = 54,
    Usbd = 55,
    Uarte1 = 56,
    Qspi = 57,
    CryptoCell = 58,
    Pwm3 = 61,
    Spim3 = 63,
}

impl Vector {
    /// Every vector present on the nRF52832.
    pub const NRF52832: [Vector; 38] = [
        Vector::SVCall,
        Vector::PowerClock,
        Vector::Radio,
        Vector::Uarte0,
        Vector::Spi0Twi0,
        Vector::Spi1Twi1,
        Vector::Nfct,
        Vector::Gpiote,
        Vector::Saadc,
        Vector::Timer0,
        Vector::Timer1,
        Vector::Timer2,
        Vector::Rtc0,
        Vector::Temp,
        Vector::Rng,
        Vector::Ecb,
        Vector::CcmAar,
        Vector::Wdt,
        Vector::Rtc1,
        Vector::Qdec,
        Vector::CompLpcomp,
        Vector::Swi0Egu0,
        Vector::Swi1Egu1,
        Vector::Swi2Egu2,
        Vector::Swi3Egu3,
        Vector::Swi4Egu4,
        Vector::Swi5Egu5,
        Vector::Timer3,
        Vector::Timer4,
        Vector::Pwm0,
        Vector::Pdm,
        Vector::Mwu,
        Vector::Pwm1,
        Vector::Pwm2,
        Vector::Spi2,
        Vector::Rtc2,
        Vector::I2s,
        Vector::Fpu,
    ];

    /// Vectors the nRF52840 adds on top of [`Vector::NRF52832`].
    pub const NRF52840_EXTRA: [Vector; 6] = [
        Vector::Usbd,
        Vector::Uarte1,
        Vector::Qspi,
        Vector::CryptoCell,
        Vector::Pwm3,
        Vector::Spim3,
    ];

    pub const fn slot(self) -> usize {
        self as usize
    }

    /// Byte offset of the handler word inside a vector table.
    pub const fn offset(self) -> u32 {
        self as u32 * 4
    }

    pub const fn owner(self) -> Owner {
        match self {
            Vector::SVCall
            | Vector::PowerClock
            | Vector::Radio
            | Vector::Timer0
            | Vector::Rtc0
            | Vector::Temp
            | Vector::Rng
            | Vector::Ecb
            | Vector::CcmAar
            | Vector::Swi1Egu1
            | Vector::Swi5Egu5
            | Vector::Mwu => Owner::Stack,
            _ => Owner::Application,
        }
    }
}

/// Address of the word holding the current handler of `vector`.
pub const fn handler_slot_address(vector: Vector, layout: &Layout) -> u32 {
    vector.owner().table_base(layout) + vector.offset()
}

/// Whether `listed` names the vectors of `expected` in the same order.
///
/// Evaluated at compile time against the forwarding stubs.
pub const fn same_vectors(listed: &[Vector], expected: &[Vector]) -> bool {
    if listed.len() != expected.len() {
        return false;
    }
    let mut i = 0;
    while i < listed.len() {
        if listed[i] as u8 != expected[i] as u8 {
            return false;
        }
        i += 1;
    }
    true
}

/// A Cortex-M vector table as it sits in flash.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct VectorTable {
    words: [u32; SLOT_COUNT],
}

impl VectorTable {
    pub const fn new(words: [u32; SLOT_COUNT]) -> Self {
        VectorTable { words }
    }

    /// Views the vector table stored at `address`.
    ///
    /// # Safety
    ///
    /// `address` must be word aligned and point to `SLOT_COUNT` readable
    /// words that stay unchanged while the reference lives.
    pub unsafe fn at(address: u32) -> &'static VectorTable {
        &*(address as *const VectorTable)
    }

    pub fn initial_stack_pointer(&self) -> u32 {
        self.words[0]
    }

    pub fn reset_handler(&self) -> u32 {
        self.words[1]
    }

    /// An erased reset handler slot means no application is installed.
    pub fn is_application_present(&self) -> bool {
        self.reset_handler() != ERASED_WORD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consts::{NRF52832_S132, NRF52840_S140};

    fn all() -> impl Iterator<Item = Vector> {
        Vector::NRF52832.into_iter().chain(Vector::NRF52840_EXTRA)
    }

    #[test]
    fn stack_owns_exactly_its_peripherals() {
        let stack: usize = all().filter(|v| v.owner() == Owner::Stack).count();
        assert_eq!(stack, 12);
        for v in [
            Vector::SVCall,
            Vector::PowerClock,
            Vector::Radio,
            Vector::Timer0,
            Vector::Rtc0,
            Vector::Temp,
            Vector::Rng,
            Vector::Ecb,
            Vector::CcmAar,
            Vector::Swi1Egu1,
            Vector::Swi5Egu5,
            Vector::Mwu,
        ] {
            assert_eq!(v.owner(), Owner::Stack);
        }
    }

    #[test]
    fn nrf52840_additions_belong_to_the_application() {
        for v in Vector::NRF52840_EXTRA {
            assert_eq!(v.owner(), Owner::Application);
            assert!(v.slot() > Vector::Fpu.slot());
        }
    }

    #[test]
    fn slots_are_unique_and_in_range() {
        let mut seen = [false; SLOT_COUNT];
        for v in all() {
            assert!(v.slot() < SLOT_COUNT);
            assert!(!seen[v.slot()], "{:?} listed twice", v);
            seen[v.slot()] = true;
        }
    }

    #[test]
    fn handler_addresses() {
        assert_eq!(handler_slot_address(Vector::SVCall, &NRF52832_S132), 0x1000 + 11 * 4);
        assert_eq!(handler_slot_address(Vector::Radio, &NRF52832_S132), 0x1044);
        assert_eq!(handler_slot_address(Vector::Uarte0, &NRF52832_S132), 0x26048);
        assert_eq!(handler_slot_address(Vector::Usbd, &NRF52840_S140), 0x26000 + 55 * 4);
    }

    #[test]
    fn every_slot_address_lands_in_its_owner_table() {
        for layout in [NRF52832_S132, NRF52840_S140] {
            for v in all() {
                let address = handler_slot_address(v, &layout);
                let base = match v.owner() {
                    Owner::Stack => STACK_BASE,
                    Owner::Application => layout.app_code_base,
                };
                assert_eq!(address, base + v.slot() as u32 * 4, "{:?}", v);
                assert!(address < base + (SLOT_COUNT * 4) as u32);
            }
        }
    }

    #[test]
    fn vector_lists_compare_in_order() {
        assert!(same_vectors(&Vector::NRF52832, &Vector::NRF52832));
        assert!(same_vectors(&[], &[]));
        assert!(!same_vectors(&Vector::NRF52832[1..], &Vector::NRF52832));
        assert!(!same_vectors(&[Vector::Radio, Vector::SVCall], &[Vector::SVCall, Vector::Radio]));
        assert!(!same_vectors(&[Vector::Usbd], &[Vector::Uarte1]));
    }

    #[test]
    fn application_presence_follows_the_reset_slot() {
        let mut words = [ERASED_WORD; SLOT_COUNT];
        assert!(!VectorTable::new(words).is_application_present());
        words[1] = 0x2_6101;
        let table = VectorTable::new(words);
        assert!(table.is_application_present());
        assert_eq!(table.initial_stack_pointer(), ERASED_WORD);
    }
}
