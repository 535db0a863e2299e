// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Link events the engine cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralEvent {
    Connected,
    Disconnected,
    /// The peer wants to negotiate a larger ATT MTU.
    MtuExchangeRequest,
    /// A write arrived before the stack had system attributes for the peer.
    SystemAttributesMissing,
}

/// What the transport must do in response to a [`PeripheralEvent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralAction {
    /// Ask the central for the fastest connection interval.
    RequestFastConnection,
    /// Start advertising again.
    RestartAdvertising,
    /// Answer with the default MTU.
    KeepDefaultMtu,
    /// Install empty system attributes.
    InitSystemAttributes,
}

impl PeripheralEvent {
    pub fn action(self) -> PeripheralAction {
        match self {
            PeripheralEvent::Connected => PeripheralAction::RequestFastConnection,
            PeripheralEvent::Disconnected => PeripheralAction::RestartAdvertising,
            PeripheralEvent::MtuExchangeRequest => PeripheralAction::KeepDefaultMtu,
            PeripheralEvent::SystemAttributesMissing => PeripheralAction::InitSystemAttributes,
        }
    }
}
