// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod ble;
mod consts;
mod forward;
mod jump_app;
mod power;
mod softdevice;

#[cfg(feature = "debug")]
use defmt_rtt as _;
use panic_probe as _;

#[cfg(feature = "nrf52832")]
use nrf52832_pac as pac;
#[cfg(all(feature = "nrf52840", not(feature = "nrf52832")))]
use nrf52840_pac as pac;

#[cfg(feature = "s132")]
use nrf_softdevice_s132 as raw;
#[cfg(all(feature = "s140", not(feature = "s132")))]
use nrf_softdevice_s140 as raw;

use ble::{Ble, EventBuffer};
use crate::consts::LAYOUT;
use cortex_m::peripheral::SCB;
use defmt::info;
use dfu_engine::{AppRegion, BootDecision, Dfu, Directive, VectorTable};
use jump_app::{jump_to_app, route_interrupts_to_stack};
use power::PowerRegisters;
use softdevice::SocFlash;
use static_cell::StaticCell;

#[cfg(not(feature = "debug"))]
mod dummy_logging {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}

        unsafe fn flush() {}

        unsafe fn release() {}

        unsafe fn write(_bytes: &[u8]) {}
    }
}

static DFU: StaticCell<Dfu<u16>> = StaticCell::new();
static BLE: StaticCell<Ble> = StaticCell::new();

/// Region the peer may update, as reported by the chip and the installed stack.
#[cfg(feature = "dynamic-info")]
fn app_region(ficr: &pac::FICR) -> AppRegion {
    let code_pages = ficr.codesize.read().bits();
    let stack_end = unsafe { core::ptr::read_volatile(::consts::SD_SIZE_ADDR as *const u32) };
    AppRegion::from_installed(code_pages, stack_end, &LAYOUT)
}

#[cfg(not(feature = "dynamic-info"))]
fn app_region(_ficr: &pac::FICR) -> AppRegion {
    AppRegion::from_layout(&LAYOUT)
}

fn execute(directive: Directive) -> ! {
    match directive {
        Directive::Reset => {
            info!("reset requested");
            SCB::sys_reset()
        }
        Directive::StartApplication => {
            softdevice::disable();
            unsafe { jump_to_app() }
        }
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let Some(p) = pac::Peripherals::take() else {
        SCB::sys_reset()
    };

    route_interrupts_to_stack();

    let app = unsafe { VectorTable::at(LAYOUT.app_code_base) };
    let mut power = PowerRegisters { power: p.POWER };
    if dfu_engine::select(app, &mut power) == BootDecision::StartApplication {
        unsafe { jump_to_app() }
    }

    info!("bootloader started");
    softdevice::enable();

    let region = app_region(&p.FICR);
    info!("application pages {=u16}..{=u16}", region.first_page(), region.end_page());

    let dfu = DFU.init(Dfu::new(region));
    let ble = BLE.init(Ble::new());
    ble.init(&region.device_info());

    let mut flash = SocFlash;
    let mut events = EventBuffer::new();
    loop {
        softdevice::wait_for_event();

        while let Some(event) = softdevice::next_flash_event() {
            dfu.on_flash_event(event, &mut ble.link);
        }
        while let Some(evt) = events.next() {
            if let Some(directive) = ble.on_event(evt, dfu, &mut flash) {
                execute(directive);
            }
        }
    }
}
