// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update engine of the BLE bootloader.
//!
//! Everything here is hardware independent: the bootloader binary provides
//! the trigger registers, the flash controller and the transport through the
//! traits below and feeds events into [`Dfu`].

#![no_std]

#[macro_use]
mod log;

pub mod boot;
pub mod buffer;
pub mod engine;
pub mod events;
pub mod policy;
pub mod region;
pub mod vectors;

pub use boot::{decide, select, BootDecision, ResetReason, TriggerRegisters, UpdateCause};
pub use buffer::WriteBuffer;
pub use engine::{Directive, Dfu, FlashEvent, Operation};
pub use events::{PeripheralAction, PeripheralEvent};
pub use policy::{BuildPolicy, Policy};
pub use region::AppRegion;
pub use vectors::{handler_slot_address, same_vectors, Owner, Vector, VectorTable};

pub use dfu_protocol::{Command, DeviceInfo, Endpoint, FrameError, Reply};

/// Synchronous rejection of a flash operation by the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Another flash operation is still pending.
    Busy,
    /// The controller failed internally.
    Internal,
    /// Source or destination not acceptable to the controller.
    InvalidAddress,
    /// Any other status code reported by the controller.
    Other(u32),
}

/// Why a reply could not be handed to the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// The session handle no longer refers to a connection.
    InvalidSession,
    /// The peer has not enabled notifications, or the stack is not ready.
    InvalidState,
    Other(u32),
}

/// Flash controller whose operations complete asynchronously.
///
/// A successful `start_*` call is always followed by exactly one
/// [`FlashEvent`] fed back through [`Dfu::on_flash_event`].
pub trait FlashController {
    /// Starts erasing page `page`.
    fn start_erase(&mut self, page: u16) -> Result<(), FlashError>;

    /// Starts programming `data` at `address`.
    ///
    /// `data` is word aligned, its length is a multiple of four, and it is
    /// left untouched until the completion event.
    fn start_write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;
}

/// Outbound side of the wireless link.
pub trait Transport {
    /// Handle of the remote connection a frame arrived on.
    type Session: Copy;

    /// Delivers a reply notification. Best effort, never retried.
    fn send_reply(&mut self, session: Self::Session, reply: Reply) -> Result<(), SendError>;
}
