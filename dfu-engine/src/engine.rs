// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command state machine of the update protocol.
//!
//! The engine is single threaded: the bootloader feeds it link writes and
//! flash completions from one event loop, so at most one flash operation is
//! in flight and the buffer is never touched while it is being programmed.

use core::marker::PhantomData;

use consts::PAGE_SIZE;
use dfu_protocol::{Command, Endpoint, Reply};

use crate::buffer::WriteBuffer;
use crate::events::{PeripheralAction, PeripheralEvent};
use crate::policy::{BuildPolicy, Policy};
use crate::region::AppRegion;
use crate::{FlashController, Transport};

/// Completion of a started flash operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashEvent {
    Success,
    Error,
}

/// Flash operation started and not yet completed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Erase { page: u16 },
    Write { page: u16, len: usize },
}

/// Terminal action requested by the peer. The caller performs it and does
/// not return.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Directive {
    Reset,
    StartApplication,
}

pub struct Dfu<S, P = BuildPolicy> {
    buffer: WriteBuffer,
    region: AppRegion,
    session: Option<S>,
    in_flight: Option<Operation>,
    _policy: PhantomData<P>,
}

impl<S: Copy, P: Policy> Dfu<S, P> {
    pub const fn new(region: AppRegion) -> Self {
        Dfu {
            buffer: WriteBuffer::new(),
            region,
            session: None,
            in_flight: None,
            _policy: PhantomData,
        }
    }

    pub fn region(&self) -> &AppRegion {
        &self.region
    }

    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    /// Session replies are sent to, the last one a frame arrived on.
    pub fn session(&self) -> Option<S> {
        self.session
    }

    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    /// Entry point for every write the peer makes.
    pub fn on_frame_received<F, T>(
        &mut self,
        session: S,
        endpoint: Endpoint,
        bytes: &[u8],
        flash: &mut F,
        transport: &mut T,
    ) -> Option<Directive>
    where
        F: FlashController,
        T: Transport<Session = S>,
    {
        self.session = Some(session);
        match endpoint {
            Endpoint::Command => self.dispatch(bytes, flash, transport),
            Endpoint::Buffer => {
                self.append(bytes);
                None
            }
        }
    }

    /// Appends page data. Bytes past the buffer capacity are dropped.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let taken = self.buffer.append(bytes);
        if taken < bytes.len() {
            dfu_log!(warn, "write buffer full, dropped {=usize} bytes", bytes.len() - taken);
        }
        taken
    }

    /// Handles one frame from the command endpoint.
    pub fn dispatch<F, T>(&mut self, frame: &[u8], flash: &mut F, transport: &mut T) -> Option<Directive>
    where
        F: FlashController,
        T: Transport<Session = S>,
    {
        let parsed = if P::INPUT_CHECKS {
            Command::parse(frame)
        } else {
            Command::parse_padded(frame)
        };
        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                dfu_log!(warn, "dropping frame: {}", e);
                return None;
            }
        };

        match command {
            Command::Reset => {
                dfu_log!(info, "reset requested");
                return Some(Directive::Reset);
            }
            Command::ErasePage { page } => self.erase(page, flash, transport),
            Command::WriteBuffer { page, words } => self.write(page, words, flash, transport),
            Command::AppendBuffer(payload) if P::INLINE_APPEND => {
                self.append(payload);
            }
            Command::Ping if P::DIAGNOSTICS => self.reply(Reply::Success, transport),
            Command::StartApplication if P::DIAGNOSTICS => {
                dfu_log!(info, "application start requested");
                return Some(Directive::StartApplication);
            }
            other => dfu_log!(warn, "command {=u8:#x} not enabled", other.tag()),
        }
        None
    }

    fn erase<F, T>(&mut self, page: u16, flash: &mut F, transport: &mut T)
    where
        F: FlashController,
        T: Transport<Session = S>,
    {
        if P::PAGE_CHECKS && !self.region.contains(page) {
            dfu_log!(warn, "erase of page {=u16} outside the application", page);
            if P::REPLY_ON_RANGE_REJECT {
                self.reply(Reply::Failure, transport);
            }
            return;
        }

        match flash.start_erase(page) {
            Ok(()) => {
                dfu_log!(debug, "erasing page {=u16}", page);
                self.in_flight = Some(Operation::Erase { page });
            }
            Err(e) => {
                dfu_log!(warn, "erase of page {=u16} refused: {}", page, e);
                if P::REPLY_ON_ERASE_REJECT {
                    self.reply(Reply::Failure, transport);
                }
            }
        }
    }

    fn write<F, T>(&mut self, page: u16, words: u16, flash: &mut F, transport: &mut T)
    where
        F: FlashController,
        T: Transport<Session = S>,
    {
        let words = usize::from(words);
        if P::INPUT_CHECKS && words > WriteBuffer::CAPACITY_WORDS {
            dfu_log!(warn, "write of {=usize} words exceeds the buffer", words);
            return;
        }
        if P::PAGE_CHECKS && !self.region.contains(page) {
            dfu_log!(warn, "write to page {=u16} outside the application", page);
            self.buffer.clear();
            if P::REPLY_ON_RANGE_REJECT {
                self.reply(Reply::Failure, transport);
            }
            return;
        }

        let address = u32::from(page) * PAGE_SIZE;
        let data = self.buffer.take_and_reset(words * 4);
        let len = data.len();
        match flash.start_write(address, data) {
            Ok(()) => {
                dfu_log!(debug, "writing {=usize} bytes to page {=u16}", len, page);
                self.in_flight = Some(Operation::Write { page, len });
            }
            Err(e) => {
                dfu_log!(warn, "write to page {=u16} refused: {}", page, e);
                if P::REPLY_ON_WRITE_REJECT {
                    self.reply(Reply::Failure, transport);
                }
            }
        }
    }

    /// Completion of the operation started by the last erase or write.
    pub fn on_flash_event<T>(&mut self, event: FlashEvent, transport: &mut T)
    where
        T: Transport<Session = S>,
    {
        let operation = self.in_flight.take();
        match event {
            FlashEvent::Success => {
                dfu_log!(debug, "flash operation done: {}", operation);
                self.reply(Reply::Success, transport);
            }
            FlashEvent::Error => {
                dfu_log!(error, "flash operation failed: {}", operation);
                if P::REPLY_ON_FLASH_ERROR {
                    self.reply(Reply::Failure, transport);
                }
            }
        }
    }

    pub fn on_peripheral_event(&mut self, event: PeripheralEvent) -> PeripheralAction {
        if event == PeripheralEvent::Disconnected {
            dfu_log!(info, "peer disconnected");
            self.session = None;
        }
        event.action()
    }

    fn reply<T>(&self, reply: Reply, transport: &mut T)
    where
        T: Transport<Session = S>,
    {
        let Some(session) = self.session else {
            dfu_log!(warn, "no session for reply {}", reply);
            return;
        };
        if let Err(e) = transport.send_reply(session, reply) {
            dfu_log!(warn, "reply {} not sent: {}", reply, e);
        }
    }
}
