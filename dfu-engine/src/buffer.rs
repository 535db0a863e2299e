// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::PAGE_SIZE;

const CAPACITY: usize = PAGE_SIZE as usize;

#[repr(C, align(4))]
struct Page([u8; CAPACITY]);

/// One page of staging RAM filled by appends and drained by page writes.
///
/// Bytes past the cursor keep whatever the previous page left there; only
/// the cursor is reset between pages.
pub struct WriteBuffer {
    page: Page,
    cursor: usize,
}

impl WriteBuffer {
    pub const CAPACITY: usize = CAPACITY;
    pub const CAPACITY_WORDS: usize = CAPACITY / 4;

    pub const fn new() -> Self {
        WriteBuffer {
            page: Page([0; CAPACITY]),
            cursor: 0,
        }
    }

    /// Bytes appended since the last reset.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn remaining(&self) -> usize {
        CAPACITY - self.cursor
    }

    /// Copies as much of `bytes` as fits and returns the number of bytes taken.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.page.0[self.cursor..self.cursor + n].copy_from_slice(&bytes[..n]);
        self.cursor += n;
        n
    }

    /// Rewinds the cursor and hands out the first `len` bytes of the page.
    ///
    /// The slice starts on a word boundary. `len` is clamped to the capacity.
    pub fn take_and_reset(&mut self, len: usize) -> &[u8] {
        self.cursor = 0;
        &self.page.0[..len.min(CAPACITY)]
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_accumulate() {
        let mut buffer = WriteBuffer::new();
        assert_eq!(buffer.append(&[1, 2, 3]), 3);
        assert_eq!(buffer.append(&[4]), 1);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.take_and_reset(4), &[1, 2, 3, 4]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn overflow_is_clamped() {
        let mut buffer = WriteBuffer::new();
        let chunk = [0x5Au8; 1000];
        let mut taken = 0;
        for _ in 0..5 {
            taken += buffer.append(&chunk);
        }
        assert_eq!(taken, WriteBuffer::CAPACITY);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.append(&[1]), 0);
        assert_eq!(buffer.len(), WriteBuffer::CAPACITY);
    }

    #[test]
    fn stale_bytes_survive_a_reset() {
        let mut buffer = WriteBuffer::new();
        buffer.append(&[0xAA; 8]);
        buffer.clear();
        buffer.append(&[0x11; 4]);
        assert_eq!(buffer.take_and_reset(8), &[0x11, 0x11, 0x11, 0x11, 0xAA, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn take_is_word_aligned_and_clamped() {
        let mut buffer = WriteBuffer::new();
        let data = buffer.take_and_reset(usize::MAX);
        assert_eq!(data.len(), WriteBuffer::CAPACITY);
        assert_eq!(data.as_ptr() as usize % 4, 0);
    }
}
