// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Interrupt forwarding stubs.
//!
//! Each stub replaces the default handler of one vector. It loads the
//! handler word from the vector table of the current owner (BLE stack or
//! application) and branches to it without touching the stack, so the
//! exception frame seen by the real handler is the hardware one.
//!
//! Each list must match the corresponding `Vector` list entry for entry,
//! otherwise the build fails.

use crate::consts::LAYOUT;
use dfu_engine::{handler_slot_address, same_vectors, Vector};

macro_rules! forward {
    ($list:expr; $($symbol:ident => $vector:ident,)*) => {
        const _: () = assert!(
            same_vectors(&[$(Vector::$vector),*], &$list),
            "forwarding stubs do not match the vector list"
        );
        $(
            core::arch::global_asm!(
                concat!(".section .text.", stringify!($symbol), ",\"ax\",%progbits"),
                concat!(".global ", stringify!($symbol)),
                concat!(".type ", stringify!($symbol), ",%function"),
                ".thumb_func",
                concat!(stringify!($symbol), ":"),
                "    ldr r0, ={slot}",
                "    ldr r0, [r0]",
                "    bx r0",
                ".ltorg",
                slot = const handler_slot_address(Vector::$vector, &LAYOUT),
            );
        )*
    };
}

forward! {
    Vector::NRF52832;
    SVCall => SVCall,
    POWER_CLOCK => PowerClock,
    RADIO => Radio,
    UARTE0_UART0 => Uarte0,
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => Spi0Twi0,
    SPIM1_SPIS1_TWIM1_TWIS1_SPI1_TWI1 => Spi1Twi1,
    NFCT => Nfct,
    GPIOTE => Gpiote,
    SAADC => Saadc,
    TIMER0 => Timer0,
    TIMER1 => Timer1,
    TIMER2 => Timer2,
    RTC0 => Rtc0,
    TEMP => Temp,
    RNG => Rng,
    ECB => Ecb,
    CCM_AAR => CcmAar,
    WDT => Wdt,
    RTC1 => Rtc1,
    QDEC => Qdec,
    COMP_LPCOMP => CompLpcomp,
    SWI0_EGU0 => Swi0Egu0,
    SWI1_EGU1 => Swi1Egu1,
    SWI2_EGU2 => Swi2Egu2,
    SWI3_EGU3 => Swi3Egu3,
    SWI4_EGU4 => Swi4Egu4,
    SWI5_EGU5 => Swi5Egu5,
    TIMER3 => Timer3,
    TIMER4 => Timer4,
    PWM0 => Pwm0,
    PDM => Pdm,
    MWU => Mwu,
    PWM1 => Pwm1,
    PWM2 => Pwm2,
    SPIM2_SPIS2_SPI2 => Spi2,
    RTC2 => Rtc2,
    I2S => I2s,
    FPU => Fpu,
}

#[cfg(feature = "nrf52840")]
forward! {
    Vector::NRF52840_EXTRA;
    USBD => Usbd,
    UARTE1 => Uarte1,
    QSPI => Qspi,
    CRYPTOCELL => CryptoCell,
    PWM3 => Pwm3,
    SPIM3 => Spim3,
}
