// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Page-granular Intel HEX merge.
//!
//! Inputs are cut into flash pages. A page present in a later input replaces
//! the whole page of earlier inputs, so stale bytes of an old image never
//! survive next to a new one. UICR registers are single words and are merged
//! one register at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use ihex::Record;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 1024;

/// Data bytes per output record.
const LINE_LEN: usize = 16;

const UICR_MASK: u32 = 0xFFFF_F000;
const UICR_BASE: u32 = 0x1000_1000;

#[derive(Debug)]
pub enum MergeError {
    Io(std::io::Error),
    Parse(ihex::ReaderError),
    Write(ihex::WriterError),
    /// A flash block does not start on a page boundary.
    Unaligned { address: u32, page_size: u32 },
    /// A UICR block is not exactly one aligned register.
    UicrBlock { address: u32, len: usize },
    InvalidPageSize(u32),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Io(e) => write!(f, "i/o error: {e}"),
            MergeError::Parse(e) => write!(f, "invalid hex input: {e}"),
            MergeError::Write(e) => write!(f, "cannot encode hex output: {e}"),
            MergeError::Unaligned { address, page_size } => {
                write!(f, "block at {address:#x} is not aligned to the page size ({page_size:#x})")
            }
            MergeError::UicrBlock { address, len } => {
                write!(f, "UICR block at {address:#x} is {len} bytes, expected one aligned word")
            }
            MergeError::InvalidPageSize(size) => write!(f, "page size {size} is not a power of two"),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        MergeError::Io(e)
    }
}

/// Contiguous bytes starting at an absolute address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub address: u32,
    pub data: Vec<u8>,
}

impl Block {
    fn end(&self) -> u32 {
        self.address + self.data.len() as u32
    }

    fn is_uicr(&self) -> bool {
        self.address & UICR_MASK == UICR_BASE
    }

    /// Splits the block into page sized blocks.
    fn into_pages(self, page_size: u32) -> Result<Vec<Block>, MergeError> {
        if self.is_uicr() {
            if self.data.len() != 4 || self.address % 4 != 0 {
                return Err(MergeError::UicrBlock {
                    address: self.address,
                    len: self.data.len(),
                });
            }
            return Ok(vec![self]);
        }
        if self.address % page_size != 0 {
            return Err(MergeError::Unaligned {
                address: self.address,
                page_size,
            });
        }
        Ok(self
            .data
            .chunks(page_size as usize)
            .enumerate()
            .map(|(i, chunk)| Block {
                address: self.address + (i as u32) * page_size,
                data: chunk.to_vec(),
            })
            .collect())
    }
}

/// Reads the data of one hex file as blocks of contiguous bytes.
pub fn read_blocks(text: &str) -> Result<Vec<Block>, MergeError> {
    let mut blocks = vec![];
    let mut current: Option<Block> = None;
    let mut base = 0u32;

    for record in ihex::Reader::new(text) {
        match record.map_err(MergeError::Parse)? {
            Record::Data { offset, value } => {
                let address = base + u32::from(offset);
                match current.as_mut() {
                    Some(block) if block.end() == address => block.data.extend_from_slice(&value),
                    _ => {
                        blocks.extend(current.take());
                        current = Some(Block { address, data: value });
                    }
                }
            }
            Record::ExtendedSegmentAddress(segment) => {
                blocks.extend(current.take());
                base = u32::from(segment) << 4;
            }
            Record::ExtendedLinearAddress(upper) => {
                blocks.extend(current.take());
                base = u32::from(upper) << 16;
            }
            // Entry points do not place any data
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) | Record::EndOfFile => {}
        }
    }
    blocks.extend(current);
    Ok(blocks)
}

/// Pages of all inputs, keyed by start address. Later inputs win.
pub fn merge_pages<'a, I>(inputs: I, page_size: u32) -> Result<BTreeMap<u32, Block>, MergeError>
where
    I: IntoIterator<Item = &'a str>,
{
    if !page_size.is_power_of_two() {
        return Err(MergeError::InvalidPageSize(page_size));
    }

    let mut pages = BTreeMap::new();
    for text in inputs {
        for block in read_blocks(text)? {
            for page in block.into_pages(page_size)? {
                pages.insert(page.address, page);
            }
        }
    }
    Ok(pages)
}

/// Encodes pages as records, emitting an extended linear address record
/// whenever a page lies 64KiB or more past the current base.
pub fn to_records(pages: &BTreeMap<u32, Block>) -> Vec<Record> {
    let mut records = vec![];
    let mut base = 0u32;

    for page in pages.values() {
        if page.address - base >= 0x1_0000 {
            let upper = page.address >> 16;
            base = upper << 16;
            records.push(Record::ExtendedLinearAddress(upper as u16));
        }
        for (i, line) in page.data.chunks(LINE_LEN).enumerate() {
            let address = page.address + (i * LINE_LEN) as u32;
            records.push(Record::Data {
                offset: (address - base) as u16,
                value: line.to_vec(),
            });
        }
    }
    records.push(Record::EndOfFile);
    records
}

pub fn merge<'a, I>(inputs: I, page_size: u32) -> Result<String, MergeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let pages = merge_pages(inputs, page_size)?;
    ihex::create_object_file_representation(&to_records(&pages)).map_err(MergeError::Write)
}

/// Merges hex files from disk into `output`.
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: impl AsRef<Path>, page_size: u32) -> Result<(), MergeError> {
    let texts = inputs
        .iter()
        .map(|path| {
            tracing::debug!("reading {}", path.as_ref().display());
            fs::read_to_string(path)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let merged = merge(texts.iter().map(String::as_str), page_size)?;
    fs::write(output, merged)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(records: &[Record]) -> String {
        ihex::create_object_file_representation(records).unwrap()
    }

    fn data(offset: u16, value: &[u8]) -> Record {
        Record::Data {
            offset,
            value: value.to_vec(),
        }
    }

    #[test]
    fn contiguous_records_form_one_block() {
        let text = hex(&[data(0x0000, &[1; 16]), data(0x0010, &[2; 16]), data(0x0100, &[3; 4]), Record::EndOfFile]);
        let blocks = read_blocks(&text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].address, 0);
        assert_eq!(blocks[0].data.len(), 32);
        assert_eq!(blocks[1].address, 0x100);
    }

    #[test]
    fn linear_address_records_move_the_base() {
        let text = hex(&[
            Record::ExtendedLinearAddress(0x0002),
            data(0x6000, &[0xAA; 4]),
            Record::StartLinearAddress(0x0002_6101),
            Record::EndOfFile,
        ]);
        assert_eq!(
            read_blocks(&text).unwrap(),
            vec![Block {
                address: 0x2_6000,
                data: vec![0xAA; 4],
            }]
        );
    }

    #[test]
    fn later_inputs_replace_whole_pages() {
        let old = hex(&[data(0x0000, &[0x11; 16]), data(0x0010, &[0x11; 16]), data(0x0400, &[0x33; 16]), Record::EndOfFile]);
        let new = hex(&[data(0x0000, &[0x22; 8]), Record::EndOfFile]);

        let pages = merge_pages([old.as_str(), new.as_str()], 1024).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&0].data, vec![0x22; 8]);
        assert_eq!(pages[&0x400].data, vec![0x33; 16]);
    }

    #[test]
    fn blocks_are_cut_at_page_boundaries() {
        let records: Vec<Record> = (0..0x60u16)
            .map(|i| data(i * 16, &[i as u8; 16]))
            .chain([Record::EndOfFile])
            .collect();
        let pages = merge_pages([hex(&records).as_str()], 1024).unwrap();
        assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![0, 0x400]);
        assert_eq!(pages[&0x400].data.len(), 0x200);
    }

    #[test]
    fn uicr_words_merge_one_register_at_a_time() {
        let bootloader = hex(&[
            Record::ExtendedLinearAddress(0x1000),
            data(0x1014, &[0x00, 0xF0, 0x07, 0x00]),
            Record::EndOfFile,
        ]);
        let pages = merge_pages([bootloader.as_str()], 4096).unwrap();
        assert_eq!(pages[&0x1000_1014].data, vec![0x00, 0xF0, 0x07, 0x00]);
    }

    #[test]
    fn uicr_block_longer_than_a_word_is_refused() {
        let text = hex(&[Record::ExtendedLinearAddress(0x1000), data(0x1014, &[0; 8]), Record::EndOfFile]);
        assert!(matches!(
            merge_pages([text.as_str()], 4096),
            Err(MergeError::UicrBlock { address: 0x1000_1014, len: 8 })
        ));
    }

    #[test]
    fn unaligned_block_is_refused() {
        let text = hex(&[data(0x0200, &[0; 4]), Record::EndOfFile]);
        assert!(matches!(
            merge_pages([text.as_str()], 1024),
            Err(MergeError::Unaligned { address: 0x200, page_size: 1024 })
        ));
    }

    #[test]
    fn page_size_must_be_a_power_of_two() {
        assert!(matches!(merge_pages([], 1000), Err(MergeError::InvalidPageSize(1000))));
    }

    #[test]
    fn output_switches_segment_past_64k() {
        let text = hex(&[
            data(0x0000, &[1; 20]),
            Record::ExtendedLinearAddress(0x0001),
            data(0x0000, &[2; 4]),
            Record::EndOfFile,
        ]);
        let records = to_records(&merge_pages([text.as_str()], 4096).unwrap());
        assert_eq!(
            records,
            vec![
                data(0x0000, &[1; 16]),
                data(0x0010, &[1; 4]),
                Record::ExtendedLinearAddress(0x0001),
                data(0x0000, &[2; 4]),
                Record::EndOfFile,
            ]
        );
    }

    #[test]
    fn merged_output_reads_back() {
        let softdevice = hex(&[data(0x1000, &[0x5A; 32]), Record::EndOfFile]);
        let bootloader = hex(&[
            Record::ExtendedLinearAddress(0x0007),
            data(0xF000, &[0xB0; 16]),
            Record::ExtendedLinearAddress(0x1000),
            data(0x1014, &[0x00, 0xF0, 0x07, 0x00]),
            Record::EndOfFile,
        ]);
        let merged = merge([softdevice.as_str(), bootloader.as_str()], 4096).unwrap();
        let blocks = read_blocks(&merged).unwrap();
        let addresses: Vec<u32> = blocks.iter().map(|b| b.address).collect();
        assert_eq!(addresses, vec![0x1000, 0x7_F000, 0x1000_1014]);
    }
}
