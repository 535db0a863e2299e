// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{Layout, Placement};

#[cfg(all(feature = "nrf52832", feature = "nrf52840"))]
compile_error!("select exactly one of the `nrf52832` and `nrf52840` features");

#[cfg(feature = "nrf52832")]
const CHIP: Layout = consts::NRF52832_S132;
#[cfg(all(feature = "nrf52840", not(feature = "nrf52832")))]
const CHIP: Layout = consts::NRF52840_S140;

#[cfg(not(feature = "replaces-mbr"))]
const PLACEMENT: Placement = Placement::AboveApplication;
#[cfg(feature = "replaces-mbr")]
const PLACEMENT: Placement = Placement::ReplacesMbr;

/// Flash and RAM layout this image is linked for.
pub const LAYOUT: Layout = CHIP.with_placement(PLACEMENT);

#[used]
/// Start address of the bootloader, read by the MBR from UICR BOOTLOADERADDR
/// to find the bootloader at reset.
#[cfg(not(feature = "replaces-mbr"))]
#[link_section = ".uicr_bootloader_addr"]
pub static BOOTLOADER_ADDR: u32 = LAYOUT.bootloader_base();
