// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::consts::LAYOUT;
use crate::raw;
use consts::STACK_BASE;
use cortex_m::peripheral::NVIC;
use defmt::{debug, info};
use dfu_engine::VectorTable;

#[cfg(not(feature = "replaces-mbr"))]
fn mbr_command(command: u32, address: u32) -> u32 {
    use nrf_softdevice_mbr as mbr;

    let mut cmd = mbr::sd_mbr_command_t {
        command,
        params: mbr::sd_mbr_command_t__bindgen_ty_1 {
            irq_forward_address_set: mbr::sd_mbr_command_irq_forward_address_set_t { address },
        },
    };
    unsafe { mbr::sd_mbr_command(&mut cmd) }
}

/// Sends interrupts reaching the MBR straight to the BLE stack.
///
/// Called once at reset, before the stack is enabled.
pub fn route_interrupts_to_stack() {
    #[cfg(not(feature = "replaces-mbr"))]
    {
        let ret = mbr_command(
            nrf_softdevice_mbr::NRF_MBR_COMMANDS_SD_MBR_COMMAND_IRQ_FORWARD_ADDRESS_SET,
            STACK_BASE,
        );
        debug!("MBR forward to stack: {}", ret);
    }
    // Our own stubs forward, the word only matters once the application runs
    #[cfg(feature = "replaces-mbr")]
    unsafe {
        core::ptr::write_volatile(consts::MBR_VECTOR_TABLE as *mut u32, 0)
    }
}

/// Boots the application assuming the BLE stack is present and disabled.
///
/// With `replaces-mbr` there is no MBR to run `INIT_SD`: the forwarding word
/// at `MBR_VECTOR_TABLE` is written here and the stack's own reset handler is
/// never executed. The application must not rely on anything that handler
/// sets up before its own `sd_softdevice_enable`.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run code placed
/// in the application region.
pub unsafe fn jump_to_app() -> ! {
    #[cfg(not(feature = "replaces-mbr"))]
    {
        use nrf_softdevice_mbr as mbr;

        let ret = mbr_command(mbr::NRF_MBR_COMMANDS_SD_MBR_COMMAND_INIT_SD, 0);
        debug!("MBR init stack: {}", ret);
        let ret = mbr_command(mbr::NRF_MBR_COMMANDS_SD_MBR_COMMAND_IRQ_FORWARD_ADDRESS_SET, STACK_BASE);
        debug!("MBR forward to stack: {}", ret);
    }
    #[cfg(feature = "replaces-mbr")]
    core::ptr::write_volatile(consts::MBR_VECTOR_TABLE as *mut u32, STACK_BASE);

    let ret = raw::sd_softdevice_vector_table_base_set(LAYOUT.app_code_base);
    debug!("stack forward to app: {}", ret);

    // Nothing the bootloader enabled may fire into the application
    let nvic = &*NVIC::PTR;
    for i in 0..nvic.icer.len() {
        nvic.icer[i].write(u32::MAX);
        nvic.icpr[i].write(u32::MAX);
    }

    let app = VectorTable::at(LAYOUT.app_code_base);
    let msp = app.initial_stack_pointer();
    let rv = app.reset_handler();

    info!("starting application: msp = {=u32:x}, rv = {=u32:x}", msp, rv);

    // These instructions perform the following operations:
    //
    // * Modify control register to use MSP as stack pointer (clear spsel bit)
    // * Synchronize instruction barrier
    // * Initialize stack pointer
    // * Set link register to not return (0xFF)
    // * Jump to the application reset vector
    core::arch::asm!(
        "mrs {tmp}, CONTROL",
        "bics {tmp}, {spsel}",
        "msr CONTROL, {tmp}",
        "isb",
        "msr MSP, {msp}",
        "mov lr, {new_lr}",
        "bx {rv}",
        // `out(reg) _` is not permitted in a `noreturn` asm! call,
        // so instead use `in(reg) 0` and don't restore it afterwards.
        tmp = in(reg) 0,
        spsel = in(reg) 2,
        new_lr = in(reg) 0xFFFFFFFFu32,
        msp = in(reg) msp,
        rv = in(reg) rv,
        options(noreturn),
    );
}
