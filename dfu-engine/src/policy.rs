// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Compile-time behaviour switches of the update engine.
///
/// The defaults are the hardened behaviour. [`BuildPolicy`] picks the values
/// from cargo features so the bootloader binary can shed code it does not
/// need.
pub trait Policy {
    /// Drop short frames instead of reading missing fields as zero, and drop
    /// writes asking for more words than the buffer holds.
    const INPUT_CHECKS: bool = true;

    /// Reject erases and writes outside the application region.
    const PAGE_CHECKS: bool = true;

    /// Reply with a failure when the controller refuses an erase.
    const REPLY_ON_ERASE_REJECT: bool = true;

    /// Reply with a failure when the controller refuses a write.
    const REPLY_ON_WRITE_REJECT: bool = true;

    /// Reply with a failure when a page is outside the application region.
    const REPLY_ON_RANGE_REJECT: bool = true;

    /// Reply with a failure when a started operation completes with an error.
    const REPLY_ON_FLASH_ERROR: bool = true;

    /// Accept AppendBuffer frames on the command endpoint.
    const INLINE_APPEND: bool = false;

    /// Accept Ping and StartApplication.
    const DIAGNOSTICS: bool = false;
}

/// Policy selected by the enabled cargo features.
pub struct BuildPolicy;

impl Policy for BuildPolicy {
    const INPUT_CHECKS: bool = cfg!(feature = "input-checks");
    const PAGE_CHECKS: bool = cfg!(feature = "page-checks");
    const REPLY_ON_ERASE_REJECT: bool = cfg!(feature = "error-reporting");
    const REPLY_ON_WRITE_REJECT: bool = cfg!(feature = "error-reporting");
    const REPLY_ON_RANGE_REJECT: bool = cfg!(feature = "error-reporting");
    const REPLY_ON_FLASH_ERROR: bool = cfg!(feature = "error-reporting");
    const INLINE_APPEND: bool = !cfg!(feature = "buffer-endpoint");
    const DIAGNOSTICS: bool = cfg!(feature = "diagnostics");
}
