#![no_std]

/// Size of a flash page in bytes (4KB).
/// Pages are the erase and program granularity of the nRF52 NVMC, and the
/// unit the update protocol addresses flash in.
pub const PAGE_SIZE: u32 = 4096;

/// Page size as a power of two, published in the device info block.
pub const PAGE_SIZE_LOG2: u8 = 12;

/// Size of the Master Boot Record at the start of flash.
/// The SoftDevice image starts right after it.
pub const MBR_SIZE: u32 = 0x1000;

/// Base address of the SoftDevice image and of its interrupt vector table.
pub const STACK_BASE: u32 = MBR_SIZE;

/// RAM word read by the MBR to decide where to forward interrupts.
/// Writing the SoftDevice base here makes the MBR forward straight to the stack.
pub const MBR_VECTOR_TABLE: u32 = 0x2000_0000;

/// Offset of the SoftDevice info structure relative to the SoftDevice base.
pub const SD_INFO_STRUCT_OFFSET: u32 = 0x2000;

/// Offset of the "size" word inside the SoftDevice info structure.
/// The value stored there is the first flash address after the SoftDevice.
pub const SD_SIZE_OFFSET: u32 = 0x08;

/// Absolute address of the word holding the installed SoftDevice end address.
pub const SD_SIZE_ADDR: u32 = STACK_BASE + SD_INFO_STRUCT_OFFSET + SD_SIZE_OFFSET;

/// UICR register that tells the MBR where the bootloader lives.
pub const UICR_BOOTLOADER_ADDR: u32 = 0x1000_1014;

/// Value of erased flash words.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// RESETREAS bits that force update mode: watchdog (DOG) and soft reset (SREQ).
/// The application requests DFU by setting GPREGRET and issuing a soft reset.
pub const DFU_RESET_REASONS: u32 = (1 << 1) | (1 << 2);

/// Version of the update protocol, published in the device info block.
pub const PROTOCOL_VERSION: u8 = 1;

/// Short chip identifier published in the device info block.
pub const CHIP_MNEMONIC: [u8; 4] = *b"N52a";

/// Where the bootloader image is placed relative to the other images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// The bootloader occupies the last flash page, above the application.
    /// The MBR finds it through UICR `BOOTLOADERADDR`.
    AboveApplication,
    /// The bootloader replaces the MBR at address 0 and owns the hardware
    /// vector table. Nothing is reserved above the application.
    ReplacesMbr,
}

/// Flash and RAM boundaries of one chip + SoftDevice combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Total flash size in bytes.
    pub flash_size: u32,
    /// First byte of the application image, right after the SoftDevice.
    pub app_code_base: u32,
    /// First RAM byte available to whoever enables the SoftDevice.
    pub app_ram_base: u32,
    /// Total RAM size in bytes.
    pub ram_size: u32,
    pub placement: Placement,
}

impl Layout {
    /// Bytes reserved for the bootloader above the application.
    pub const fn bootloader_size(&self) -> u32 {
        match self.placement {
            Placement::AboveApplication => PAGE_SIZE,
            Placement::ReplacesMbr => 0,
        }
    }

    /// Start address of the bootloader image.
    pub const fn bootloader_base(&self) -> u32 {
        match self.placement {
            Placement::AboveApplication => self.flash_size - PAGE_SIZE,
            Placement::ReplacesMbr => 0,
        }
    }

    /// One past the last byte of the application image.
    pub const fn app_code_end(&self) -> u32 {
        self.flash_size - self.bootloader_size()
    }

    pub const fn page_count(&self) -> u32 {
        self.flash_size / PAGE_SIZE
    }

    pub const fn app_first_page(&self) -> u32 {
        self.app_code_base / PAGE_SIZE
    }

    /// One past the last application page.
    pub const fn app_end_page(&self) -> u32 {
        self.app_code_end() / PAGE_SIZE
    }

    pub const fn with_placement(self, placement: Placement) -> Self {
        Layout { placement, ..self }
    }
}

/// nRF52832 with S132 v6: 512KB flash, 64KB RAM.
pub const NRF52832_S132: Layout = Layout {
    flash_size: 0x0008_0000,
    app_code_base: 0x0002_6000,
    app_ram_base: 0x2000_3800,
    ram_size: 0x0001_0000,
    placement: Placement::AboveApplication,
};

/// nRF52840 with S140 v6: 1MB flash, 256KB RAM.
pub const NRF52840_S140: Layout = Layout {
    flash_size: 0x0010_0000,
    app_code_base: 0x0002_6000,
    app_ram_base: 0x2000_3800,
    ram_size: 0x0004_0000,
    placement: Placement::AboveApplication,
};

/// Complete local name advertised while in update mode.
pub const DEVICE_NAME: &[u8] = b"DFU";

/// 128-bit vendor base UUID, little-endian as the SoftDevice expects it.
/// Bytes 12 and 13 are replaced by the 16-bit service and characteristic ids.
pub const UUID_BASE: [u8; 16] = [
    0xf4, 0x22, 0xb8, 0xef, 0x72, 0xba, 0x4b, 0xf8, 0x8c, 0xf5, 0xae, 0x83, 0x01, 0x00, 0xfc, 0x67,
];

/// 16-bit alias of the DFU service within the vendor base.
pub const UUID_DFU_SERVICE: u16 = 0x0001;
/// Read-only device info characteristic.
pub const UUID_DFU_CHAR_INFO: u16 = 0x0002;
/// Command characteristic (write + notify replies).
pub const UUID_DFU_CHAR_COMMAND: u16 = 0x0003;
/// Bulk buffer characteristic (write without response).
pub const UUID_DFU_CHAR_BUFFER: u16 = 0x0004;

/// Default ATT MTU. The bootloader never negotiates a larger one.
pub const ATT_MTU: usize = 23;

/// Largest attribute value that fits in one write with the default MTU.
pub const MAX_ATTR_LEN: usize = ATT_MTU - 3;

/// Advertising interval in 0.625ms units (about 100ms).
pub const ADV_INTERVAL: u32 = 160;

/// Connection interval in 1.25ms units: 7.5ms, the fastest allowed.
pub const CONN_INTERVAL: u16 = 6;

/// Supervision timeout in 10ms units: 4 seconds, the longest allowed.
pub const CONN_SUP_TIMEOUT: u16 = 400;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nrf52832_application_region() {
        let layout = NRF52832_S132;
        assert_eq!(layout.page_count(), 128);
        assert_eq!(layout.app_first_page(), 0x26);
        assert_eq!(layout.app_end_page(), 127);
        assert_eq!(layout.bootloader_base(), 0x7F000);
    }

    #[test]
    fn replacing_the_mbr_reserves_nothing_at_the_top() {
        let layout = NRF52840_S140.with_placement(Placement::ReplacesMbr);
        assert_eq!(layout.bootloader_size(), 0);
        assert_eq!(layout.app_code_end(), layout.flash_size);
        assert_eq!(layout.app_end_page(), 256);
    }

    #[test]
    fn sd_size_word_lives_in_the_info_struct() {
        assert_eq!(SD_SIZE_ADDR, 0x3008);
    }

    #[test]
    fn page_size_matches_its_log2() {
        assert_eq!(1u32 << PAGE_SIZE_LOG2, PAGE_SIZE);
    }
}
