// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::consts::LAYOUT;
use crate::raw;
use cortex_m::peripheral::SCB;
use defmt::{error, info, warn};
use dfu_engine::{FlashController, FlashError, FlashEvent};

/// Called by the stack on an unrecoverable error. Never returns.
#[cfg_attr(feature = "replaces-mbr", link_section = ".data.sd_fault_handler")]
unsafe extern "C" fn fault_handler(id: u32, pc: u32, info: u32) {
    error!("stack fault: id = {=u32:#x}, pc = {=u32:#x}, info = {=u32:#x}", id, pc, info);
    SCB::sys_reset();
}

/// Enables the BLE stack running from the internal RC oscillator.
///
/// Failures are logged and the boot continues: there is nothing else the
/// bootloader could do.
pub fn enable() {
    // The stack may still be running after a jump from the application
    let ret = unsafe { raw::sd_softdevice_disable() };
    if ret != raw::NRF_SUCCESS {
        warn!("stack disable: {}", ret);
    }

    let clock = raw::nrf_clock_lf_cfg_t {
        source: raw::NRF_CLOCK_LF_SRC_RC as u8,
        rc_ctiv: 16,
        rc_temp_ctiv: 2,
        accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
    };
    let ret = unsafe { raw::sd_softdevice_enable(&clock, Some(fault_handler)) };
    if ret != raw::NRF_SUCCESS {
        error!("cannot enable stack: {}", ret);
    }

    let mut app_ram_base = LAYOUT.app_ram_base;
    let ret = unsafe { raw::sd_ble_enable(&mut app_ram_base) };
    if ret != raw::NRF_SUCCESS {
        error!("cannot enable BLE: {}, needs RAM from {=u32:#x}", ret, app_ram_base);
    }
}

pub fn disable() {
    let ret = unsafe { raw::sd_softdevice_disable() };
    info!("stack disabled: {}", ret);
}

/// Parks the CPU until the stack has something to report.
pub fn wait_for_event() {
    unsafe { raw::sd_app_evt_wait() };
}

/// Next pending flash completion, skipping unrelated SoC events.
pub fn next_flash_event() -> Option<FlashEvent> {
    loop {
        let mut evt_id = 0u32;
        if unsafe { raw::sd_evt_get(&mut evt_id) } != raw::NRF_SUCCESS {
            return None;
        }
        match evt_id {
            raw::NRF_SOC_EVTS_NRF_EVT_FLASH_OPERATION_SUCCESS => return Some(FlashEvent::Success),
            raw::NRF_SOC_EVTS_NRF_EVT_FLASH_OPERATION_ERROR => return Some(FlashEvent::Error),
            other => info!("SoC event {}", other),
        }
    }
}

/// Flash access through the stack, which schedules it between radio events.
pub struct SocFlash;

fn flash_result(ret: u32) -> Result<(), FlashError> {
    match ret {
        raw::NRF_SUCCESS => Ok(()),
        raw::NRF_ERROR_BUSY => Err(FlashError::Busy),
        raw::NRF_ERROR_INTERNAL => Err(FlashError::Internal),
        raw::NRF_ERROR_INVALID_ADDR | raw::NRF_ERROR_FORBIDDEN => Err(FlashError::InvalidAddress),
        other => Err(FlashError::Other(other)),
    }
}

impl FlashController for SocFlash {
    fn start_erase(&mut self, page: u16) -> Result<(), FlashError> {
        flash_result(unsafe { raw::sd_flash_page_erase(u32::from(page)) })
    }

    fn start_write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let words = (data.len() / 4) as u32;
        flash_result(unsafe { raw::sd_flash_write(address as *mut u32, data.as_ptr() as *const u32, words) })
    }
}
