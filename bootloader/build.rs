// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Renders `memory.x` for the selected chip and placement into `OUT_DIR`
//! and puts it on the linker search path.

use consts::{Layout, Placement, MBR_SIZE, NRF52832_S132, NRF52840_S140, UICR_BOOTLOADER_ADDR};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

const RAM_START: u32 = 0x2000_0000;

fn layout() -> Layout {
    let chip = if env::var_os("CARGO_FEATURE_NRF52840").is_some() {
        NRF52840_S140
    } else {
        NRF52832_S132
    };
    if env::var_os("CARGO_FEATURE_REPLACES_MBR").is_some() {
        chip.with_placement(Placement::ReplacesMbr)
    } else {
        chip.with_placement(Placement::AboveApplication)
    }
}

fn memory_x(layout: &Layout) -> String {
    // The stack keeps everything below the application RAM base
    let ram_origin = layout.app_ram_base;
    let ram_length = RAM_START + layout.ram_size - layout.app_ram_base;

    match layout.placement {
        Placement::AboveApplication => format!(
            r##"
            MEMORY
            {{
                /* The bootloader takes the last flash page */
                FLASH (rx) : ORIGIN = {flash_origin:#X}, LENGTH = {flash_length:#X}
                RAM : ORIGIN = {ram_origin:#X}, LENGTH = {ram_length:#X}
                uicr_bootloader_addr (r) : ORIGIN = {uicr:#X}, LENGTH = 0x4
            }}

            SECTIONS {{
                .uicr_bootloader_addr : {{
                    KEEP(*(.uicr_bootloader_addr))
                    . = ALIGN(4);
                }} > uicr_bootloader_addr
            }};
            "##,
            flash_origin = layout.bootloader_base(),
            flash_length = layout.bootloader_size(),
            uicr = UICR_BOOTLOADER_ADDR,
        ),
        Placement::ReplacesMbr => format!(
            r##"
            MEMORY
            {{
                /* The bootloader takes the place of the MBR */
                FLASH (rx) : ORIGIN = 0x00000000, LENGTH = {flash_length:#X}
                RAM : ORIGIN = {ram_origin:#X}, LENGTH = {ram_length:#X}
            }}
            "##,
            flash_length = MBR_SIZE,
        ),
    }
}

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    File::create(out.join("memory.x"))
        .expect("cannot create memory.x")
        .write_all(memory_x(&layout()).as_bytes())
        .expect("cannot write memory.x");
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../consts/src/lib.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
