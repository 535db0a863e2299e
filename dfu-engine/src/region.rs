// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{Layout, Placement, ERASED_WORD, PAGE_SIZE};
use dfu_protocol::DeviceInfo;

/// Flash geometry and the pages the peer may erase and program.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppRegion {
    total_pages: u16,
    first_page: u16,
    end_page: u16,
}

impl AppRegion {
    /// # Panics
    ///
    /// In const context when the region is empty or exceeds the flash.
    pub const fn new(total_pages: u16, first_page: u16, end_page: u16) -> Self {
        assert!(first_page < end_page && end_page <= total_pages);
        AppRegion {
            total_pages,
            first_page,
            end_page,
        }
    }

    /// Region fixed at build time by the chip layout.
    pub const fn from_layout(layout: &Layout) -> Self {
        AppRegion::new(
            layout.page_count() as u16,
            layout.app_first_page() as u16,
            layout.app_end_page() as u16,
        )
    }

    /// Region of the flash actually present.
    ///
    /// `code_pages` is the page count reported by the chip and `stack_end`
    /// the end address published by the installed BLE stack. The pages
    /// reserved for the bootloader by `layout` stay out of the region, both
    /// at the top of the reported flash and where the image is linked.
    /// Values that do not describe a sane region fall back to `layout`.
    pub fn from_installed(code_pages: u32, stack_end: u32, layout: &Layout) -> Self {
        let reserved = layout.bootloader_size() / PAGE_SIZE;
        let fallback = Self::from_layout(layout);

        if stack_end == ERASED_WORD || code_pages > u16::MAX as u32 || code_pages <= reserved {
            dfu_log!(warn, "unusable flash geometry, using build layout");
            return fallback;
        }

        let first_page = stack_end.div_ceil(PAGE_SIZE);
        let mut end_page = code_pages - reserved;
        if layout.placement == Placement::AboveApplication {
            end_page = end_page.min(layout.bootloader_base() / PAGE_SIZE);
        }
        if first_page == 0 || first_page >= end_page {
            dfu_log!(warn, "stack end {=u32:#x} leaves no application pages", stack_end);
            return fallback;
        }

        AppRegion {
            total_pages: code_pages as u16,
            first_page: first_page as u16,
            end_page: end_page as u16,
        }
    }

    pub fn contains(&self, page: u16) -> bool {
        page >= self.first_page && page < self.end_page
    }

    pub fn first_page(&self) -> u16 {
        self.first_page
    }

    /// One past the last application page.
    pub fn end_page(&self) -> u16 {
        self.end_page
    }

    pub fn page_count(&self) -> u16 {
        self.end_page - self.first_page
    }

    pub fn total_pages(&self) -> u16 {
        self.total_pages
    }

    /// Value served on the info characteristic.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(self.total_pages, self.first_page, self.page_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consts::{Placement, NRF52832_S132, NRF52840_S140};

    #[test]
    fn layout_region_skips_the_bootloader_page() {
        let region = AppRegion::from_layout(&NRF52832_S132);
        assert!(!region.contains(0x25));
        assert!(region.contains(0x26));
        assert!(region.contains(126));
        assert!(!region.contains(127));
        assert_eq!(region.page_count(), 127 - 0x26);
    }

    #[test]
    fn installed_geometry_overrides_the_layout() {
        let region = AppRegion::from_installed(256, 0x2_7000, &NRF52840_S140);
        assert_eq!(region.first_page(), 0x27);
        assert_eq!(region.end_page(), 255);
        assert_eq!(region.total_pages(), 256);
    }

    #[test]
    fn unaligned_stack_end_rounds_up() {
        let region = AppRegion::from_installed(128, 0x2_6004, &NRF52832_S132);
        assert_eq!(region.first_page(), 0x27);
    }

    #[test]
    fn replacing_the_mbr_reserves_no_pages() {
        let layout = NRF52832_S132.with_placement(Placement::ReplacesMbr);
        let region = AppRegion::from_installed(128, 0x2_6000, &layout);
        assert_eq!(region.end_page(), 128);
        assert!(region.contains(127));
    }

    #[test]
    fn garbage_geometry_falls_back() {
        let expected = AppRegion::from_layout(&NRF52832_S132);
        assert_eq!(AppRegion::from_installed(128, ERASED_WORD, &NRF52832_S132), expected);
        assert_eq!(AppRegion::from_installed(0, 0x2_6000, &NRF52832_S132), expected);
        assert_eq!(AppRegion::from_installed(128, 0x8_0000, &NRF52832_S132), expected);
        assert_eq!(AppRegion::from_installed(128, 0, &NRF52832_S132), expected);
    }

    #[test]
    fn bootloader_page_stays_out_on_larger_flash() {
        // nRF52832 build on a part reporting 1MiB
        let region = AppRegion::from_installed(256, 0x2_6000, &NRF52832_S132);
        assert!(!region.contains(0x7F));
        assert_eq!(region.end_page(), 0x7F);
        assert_eq!(region.total_pages(), 256);
        assert!(region.contains(0x7E));
    }

    #[test]
    fn info_block_describes_the_region() {
        let info = AppRegion::from_layout(&NRF52832_S132).device_info();
        assert_eq!(info.page_count, 128);
        assert_eq!(info.app_first_page, 0x26);
        assert_eq!(info.app_page_count, 0x59);
    }
}
