// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire format of the BLE update protocol.
//! The peer writes command frames to the command characteristic and raw page
//! data to the buffer characteristic. Replies are single byte notifications.
//! All multi-byte fields are little-endian and unaligned.

#![no_std]

use consts::{CHIP_MNEMONIC, PAGE_SIZE_LOG2, PROTOCOL_VERSION};

/// First byte of every command frame.
pub mod tag {
    pub const RESET: u8 = 0x01;
    pub const ERASE_PAGE: u8 = 0x02;
    pub const WRITE_BUFFER: u8 = 0x03;
    pub const APPEND_BUFFER: u8 = 0x04;
    pub const PING: u8 = 0x10;
    pub const START_APPLICATION: u8 = 0x11;
}

/// Which logical endpoint delivered a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Endpoint {
    /// Tagged command frames.
    Command,
    /// Untagged payload appended to the write buffer.
    Buffer,
}

/// A parsed command frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    /// Restart the device.
    Reset,
    /// Erase one flash page.
    ErasePage { page: u16 },
    /// Program `words` 32-bit words from the write buffer at the start of `page`.
    WriteBuffer { page: u16, words: u16 },
    /// Append payload to the write buffer (inline framing).
    AppendBuffer(&'a [u8]),
    /// Ask for a success reply (diagnostics).
    Ping,
    /// Leave the bootloader and boot the application (diagnostics).
    StartApplication,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Zero length write.
    Empty,
    /// The frame is shorter than the layout of its tag.
    TooShort { tag: u8, len: usize, min: usize },
    UnknownTag(u8),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    BufferTooSmall { needed: usize },
}

/// Minimum frame length of every known tag.
pub const fn min_len(tag: u8) -> Option<usize> {
    match tag {
        tag::RESET | tag::PING | tag::START_APPLICATION => Some(1),
        tag::ERASE_PAGE => Some(Command::ERASE_LEN),
        tag::WRITE_BUFFER => Some(Command::WRITE_LEN),
        tag::APPEND_BUFFER => Some(Command::APPEND_HEADER_LEN),
        _ => None,
    }
}

fn le_u16(frame: &[u8], at: usize) -> u16 {
    let lo = frame.get(at).copied().unwrap_or(0);
    let hi = frame.get(at + 1).copied().unwrap_or(0);
    u16::from_le_bytes([lo, hi])
}

impl<'a> Command<'a> {
    /// tag, pad, page
    pub const ERASE_LEN: usize = 4;
    /// tag, pad, page, word count
    pub const WRITE_LEN: usize = 6;
    /// tag, pad, u16 pad; payload follows
    pub const APPEND_HEADER_LEN: usize = 4;

    /// Parses a frame, rejecting frames shorter than their tag's layout.
    pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
        let tag = *frame.first().ok_or(FrameError::Empty)?;
        let min = min_len(tag).ok_or(FrameError::UnknownTag(tag))?;
        if frame.len() < min {
            return Err(FrameError::TooShort {
                tag,
                len: frame.len(),
                min,
            });
        }
        Self::decode(tag, frame)
    }

    /// Parses a frame without length validation.
    /// Fields past the end of the frame read as zero and an empty frame reads
    /// as tag 0, which is unknown.
    pub fn parse_padded(frame: &'a [u8]) -> Result<Self, FrameError> {
        let tag = frame.first().copied().unwrap_or(0);
        Self::decode(tag, frame)
    }

    fn decode(tag: u8, frame: &'a [u8]) -> Result<Self, FrameError> {
        let command = match tag {
            tag::RESET => Command::Reset,
            tag::ERASE_PAGE => Command::ErasePage { page: le_u16(frame, 2) },
            tag::WRITE_BUFFER => Command::WriteBuffer {
                page: le_u16(frame, 2),
                words: le_u16(frame, 4),
            },
            tag::APPEND_BUFFER => Command::AppendBuffer(frame.get(Self::APPEND_HEADER_LEN..).unwrap_or(&[])),
            tag::PING => Command::Ping,
            tag::START_APPLICATION => Command::StartApplication,
            other => return Err(FrameError::UnknownTag(other)),
        };
        Ok(command)
    }

    pub fn tag(&self) -> u8 {
        match self {
            Command::Reset => tag::RESET,
            Command::ErasePage { .. } => tag::ERASE_PAGE,
            Command::WriteBuffer { .. } => tag::WRITE_BUFFER,
            Command::AppendBuffer(_) => tag::APPEND_BUFFER,
            Command::Ping => tag::PING,
            Command::StartApplication => tag::START_APPLICATION,
        }
    }

    /// Number of bytes `encode` produces.
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::ErasePage { .. } => Self::ERASE_LEN,
            Command::WriteBuffer { .. } => Self::WRITE_LEN,
            Command::AppendBuffer(payload) => Self::APPEND_HEADER_LEN + payload.len(),
            Command::Reset | Command::Ping | Command::StartApplication => 1,
        }
    }

    /// Serializes the frame as a peer sends it. Padding bytes are zero.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, EncodeError> {
        let len = self.encoded_len();
        let out = out.get_mut(..len).ok_or(EncodeError::BufferTooSmall { needed: len })?;
        out.fill(0);
        out[0] = self.tag();
        match self {
            Command::ErasePage { page } => out[2..4].copy_from_slice(&page.to_le_bytes()),
            Command::WriteBuffer { page, words } => {
                out[2..4].copy_from_slice(&page.to_le_bytes());
                out[4..6].copy_from_slice(&words.to_le_bytes());
            }
            Command::AppendBuffer(payload) => out[Self::APPEND_HEADER_LEN..].copy_from_slice(payload),
            Command::Reset | Command::Ping | Command::StartApplication => {}
        }
        Ok(len)
    }
}

/// Status notification sent back on the command characteristic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Reply {
    Success = 0,
    Failure = 1,
}

impl Reply {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Value of the read-only info characteristic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub version: u8,
    /// Page size as a log2, actual page size is 2^page_size_log2.
    pub page_size_log2: u8,
    /// Total number of flash pages.
    pub page_count: u16,
    pub chip: [u8; 4],
    pub app_first_page: u16,
    pub app_page_count: u16,
}

impl DeviceInfo {
    pub const SIZE: usize = 12;

    /// Info block for this protocol version with the given flash geometry.
    pub const fn new(page_count: u16, app_first_page: u16, app_page_count: u16) -> Self {
        DeviceInfo {
            version: PROTOCOL_VERSION,
            page_size_log2: PAGE_SIZE_LOG2,
            page_count,
            chip: CHIP_MNEMONIC,
            app_first_page,
            app_page_count,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.version;
        out[1] = self.page_size_log2;
        out[2..4].copy_from_slice(&self.page_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.chip);
        out[8..10].copy_from_slice(&self.app_first_page.to_le_bytes());
        out[10..12].copy_from_slice(&self.app_page_count.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_erase_page() {
        assert_eq!(Command::parse(&[0x02, 0x00, 0x27, 0x00]), Ok(Command::ErasePage { page: 0x27 }));
    }

    #[test]
    fn parses_write_buffer() {
        let frame = [0x03, 0x00, 0x05, 0x00, 0x01, 0x00];
        assert_eq!(Command::parse(&frame), Ok(Command::WriteBuffer { page: 5, words: 1 }));
    }

    #[test]
    fn append_payload_follows_the_header() {
        let frame = [0x04, 0x00, 0x00, 0x00, 0xAA, 0xBB];
        assert_eq!(Command::parse(&frame), Ok(Command::AppendBuffer(&[0xAA, 0xBB])));
        assert_eq!(Command::parse(&frame[..4]), Ok(Command::AppendBuffer(&[])));
    }

    #[test]
    fn single_byte_commands() {
        assert_eq!(Command::parse(&[0x01]), Ok(Command::Reset));
        assert_eq!(Command::parse(&[0x10, 0xFF]), Ok(Command::Ping));
        assert_eq!(Command::parse(&[0x11]), Ok(Command::StartApplication));
    }

    #[test]
    fn rejects_short_frames() {
        assert_eq!(Command::parse(&[]), Err(FrameError::Empty));
        assert_eq!(
            Command::parse(&[0x02, 0x00, 0x27]),
            Err(FrameError::TooShort { tag: 0x02, len: 3, min: 4 })
        );
        assert_eq!(
            Command::parse(&[0x03, 0x00, 0x05, 0x00, 0x01]),
            Err(FrameError::TooShort { tag: 0x03, len: 5, min: 6 })
        );
        assert_eq!(
            Command::parse(&[0x04, 0x00]),
            Err(FrameError::TooShort { tag: 0x04, len: 2, min: 4 })
        );
    }

    #[test]
    fn unknown_tags() {
        assert_eq!(Command::parse(&[0x05, 0x00]), Err(FrameError::UnknownTag(0x05)));
        assert_eq!(Command::parse_padded(&[]), Err(FrameError::UnknownTag(0)));
    }

    #[test]
    fn padded_parse_reads_missing_fields_as_zero() {
        assert_eq!(Command::parse_padded(&[0x02, 0x00, 0x27]), Ok(Command::ErasePage { page: 0x27 }));
        assert_eq!(
            Command::parse_padded(&[0x03, 0x00, 0x30]),
            Ok(Command::WriteBuffer { page: 0x30, words: 0 })
        );
        assert_eq!(Command::parse_padded(&[0x04, 0x00]), Ok(Command::AppendBuffer(&[])));
    }

    #[test]
    fn encode_matches_the_wire_layout() {
        let mut buf = [0xEEu8; 32];
        let n = Command::WriteBuffer { page: 5, words: 1 }.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x03, 0x00, 0x05, 0x00, 0x01, 0x00]);

        let n = Command::AppendBuffer(&[0xAA, 0xBB]).encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x04, 0x00, 0x00, 0x00, 0xAA, 0xBB]);

        let n = Command::ErasePage { page: 0x0102 }.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x02, 0x00, 0x02, 0x01]);
    }

    #[test]
    fn encode_needs_room() {
        let mut buf = [0u8; 3];
        assert_eq!(
            Command::ErasePage { page: 1 }.encode(&mut buf),
            Err(EncodeError::BufferTooSmall { needed: 4 })
        );
    }

    #[test]
    fn reply_bytes() {
        assert_eq!(Reply::Success.as_byte(), 0);
        assert_eq!(Reply::Failure.as_byte(), 1);
    }

    #[test]
    fn device_info_layout() {
        let info = DeviceInfo::new(128, 0x26, 127 - 0x26);
        let bytes = info.to_bytes();
        assert_eq!(bytes, [1, 12, 128, 0, b'N', b'5', b'2', b'a', 0x26, 0, 0x59, 0]);
    }
}
