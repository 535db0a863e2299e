// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! GATT service of the update protocol, on top of the raw stack API.

use crate::raw;
use crate::softdevice::SocFlash;
use consts::{
    ADV_INTERVAL, ATT_MTU, CONN_INTERVAL, CONN_SUP_TIMEOUT, DEVICE_NAME, MAX_ATTR_LEN, UUID_BASE, UUID_DFU_CHAR_COMMAND,
    UUID_DFU_CHAR_INFO, UUID_DFU_SERVICE,
};
use core::{mem, ptr};
use defmt::{debug, error, info, warn};
use dfu_engine::{DeviceInfo, Dfu, Directive, Endpoint, PeripheralAction, PeripheralEvent, Reply, SendError, Transport};

/// Flags, complete local name and the complete 128-bit service UUID.
const ADV_DATA_LEN: usize = 3 + 2 + DEVICE_NAME.len() + 2 + 16;

const CONN_PARAMS: raw::ble_gap_conn_params_t = raw::ble_gap_conn_params_t {
    min_conn_interval: CONN_INTERVAL,
    max_conn_interval: CONN_INTERVAL,
    slave_latency: 0,
    conn_sup_timeout: CONN_SUP_TIMEOUT,
};

fn check(what: &str, ret: u32) -> bool {
    if ret != raw::NRF_SUCCESS {
        error!("{=str}: {}", what, ret);
    }
    ret == raw::NRF_SUCCESS
}

fn advertising_data() -> [u8; ADV_DATA_LEN] {
    let mut data = [0u8; ADV_DATA_LEN];
    let name_end = 5 + DEVICE_NAME.len();

    data[..3].copy_from_slice(&[
        2,
        raw::BLE_GAP_AD_TYPE_FLAGS as u8,
        raw::BLE_GAP_ADV_FLAGS_LE_ONLY_GENERAL_DISC_MODE as u8,
    ]);
    data[3] = DEVICE_NAME.len() as u8 + 1;
    data[4] = raw::BLE_GAP_AD_TYPE_COMPLETE_LOCAL_NAME as u8;
    data[5..name_end].copy_from_slice(DEVICE_NAME);
    data[name_end] = 17;
    data[name_end + 1] = raw::BLE_GAP_AD_TYPE_128BIT_SERVICE_UUID_COMPLETE as u8;

    let uuid = &mut data[name_end + 2..];
    uuid.copy_from_slice(&UUID_BASE);
    uuid[12..14].copy_from_slice(&UUID_DFU_SERVICE.to_le_bytes());
    data
}

/// `BLE_GAP_CONN_SEC_MODE_SET_OPEN`
fn open_access() -> raw::ble_gap_conn_sec_mode_t {
    let mut mode: raw::ble_gap_conn_sec_mode_t = unsafe { mem::zeroed() };
    mode._bitfield_1 = raw::ble_gap_conn_sec_mode_t::new_bitfield_1(1, 1);
    mode
}

fn properties(read: bool, write_wo_resp: bool, write: bool, notify: bool) -> raw::ble_gatts_char_md_t {
    let mut md: raw::ble_gatts_char_md_t = unsafe { mem::zeroed() };
    md.char_props._bitfield_1 = raw::ble_gatt_char_props_t::new_bitfield_1(
        0,
        read as u8,
        write_wo_resp as u8,
        write as u8,
        notify as u8,
        0,
        0,
    );
    md
}

/// Sends replies as notifications of the command characteristic.
pub struct BleLink {
    command_handle: u16,
}

impl Transport for BleLink {
    type Session = u16;

    fn send_reply(&mut self, conn: u16, reply: Reply) -> Result<(), SendError> {
        let data = [reply.as_byte()];
        let mut len = data.len() as u16;
        let params = raw::ble_gatts_hvx_params_t {
            handle: self.command_handle,
            type_: raw::BLE_GATT_HVX_NOTIFICATION as u8,
            offset: 0,
            p_len: &mut len,
            p_data: data.as_ptr(),
        };
        match unsafe { raw::sd_ble_gatts_hvx(conn, &params) } {
            raw::NRF_SUCCESS => Ok(()),
            raw::BLE_ERROR_INVALID_CONN_HANDLE => Err(SendError::InvalidSession),
            raw::NRF_ERROR_INVALID_STATE | raw::BLE_ERROR_GATTS_SYS_ATTR_MISSING => Err(SendError::InvalidState),
            other => Err(SendError::Other(other)),
        }
    }
}

/// GATT server and advertiser state.
///
/// Lives in a static: the stack keeps pointing at the advertising data for
/// as long as it advertises.
pub struct Ble {
    adv_handle: u8,
    adv_data: [u8; ADV_DATA_LEN],
    buffer_handle: Option<u16>,
    pub link: BleLink,
}

impl Ble {
    pub fn new() -> Self {
        Ble {
            adv_handle: raw::BLE_GAP_ADV_SET_HANDLE_NOT_SET as u8,
            adv_data: advertising_data(),
            buffer_handle: None,
            link: BleLink { command_handle: 0 },
        }
    }

    /// Sets up GAP, starts advertising and registers the service.
    ///
    /// A failing step is logged and the remaining ones still run.
    pub fn init(&mut self, info: &DeviceInfo) {
        let access = open_access();
        check("cannot set device name", unsafe {
            raw::sd_ble_gap_device_name_set(&access, DEVICE_NAME.as_ptr(), DEVICE_NAME.len() as u16)
        });
        check("cannot set PPCP parameters", unsafe { raw::sd_ble_gap_ppcp_set(&CONN_PARAMS) });

        self.start_advertising();
        self.add_service(info);
    }

    fn start_advertising(&mut self) {
        let data = raw::ble_gap_adv_data_t {
            adv_data: raw::ble_data_t {
                p_data: self.adv_data.as_mut_ptr(),
                len: ADV_DATA_LEN as u16,
            },
            scan_rsp_data: raw::ble_data_t {
                p_data: ptr::null_mut(),
                len: 0,
            },
        };
        let mut params: raw::ble_gap_adv_params_t = unsafe { mem::zeroed() };
        params.properties.type_ = raw::BLE_GAP_ADV_TYPE_CONNECTABLE_SCANNABLE_UNDIRECTED as u8;
        params.interval = ADV_INTERVAL;
        params.duration = raw::BLE_GAP_ADV_TIMEOUT_GENERAL_UNLIMITED as u16;

        check("cannot configure advertisement", unsafe {
            raw::sd_ble_gap_adv_set_configure(&mut self.adv_handle, &data, &params)
        });
        check("cannot start advertisement", unsafe {
            raw::sd_ble_gap_adv_start(self.adv_handle, raw::BLE_CONN_CFG_TAG_DEFAULT as u8)
        });
    }

    fn add_service(&mut self, info: &DeviceInfo) {
        let mut uuid = raw::ble_uuid_t {
            uuid: UUID_DFU_SERVICE,
            type_: 0,
        };
        let base = raw::ble_uuid128_t { uuid128: UUID_BASE };
        check("cannot add UUID", unsafe { raw::sd_ble_uuid_vs_add(&base, &mut uuid.type_) });

        let mut service = 0u16;
        check("cannot add service", unsafe {
            raw::sd_ble_gatts_service_add(raw::BLE_GATTS_SRVC_TYPE_PRIMARY as u8, &uuid, &mut service)
        });

        let mut readable: raw::ble_gatts_attr_md_t = unsafe { mem::zeroed() };
        readable.read_perm = open_access();
        readable._bitfield_1 = raw::ble_gatts_attr_md_t::new_bitfield_1(1, raw::BLE_GATTS_VLOC_STACK as u8, 0, 0);

        let mut writable: raw::ble_gatts_attr_md_t = unsafe { mem::zeroed() };
        writable.write_perm = open_access();
        writable._bitfield_1 = raw::ble_gatts_attr_md_t::new_bitfield_1(1, raw::BLE_GATTS_VLOC_STACK as u8, 0, 0);

        // The stack copies the value, the local only has to live through the call
        let mut value = info.to_bytes();
        uuid.uuid = UUID_DFU_CHAR_INFO;
        let attr = raw::ble_gatts_attr_t {
            p_uuid: &uuid,
            p_attr_md: &readable,
            init_len: DeviceInfo::SIZE as u16,
            init_offs: 0,
            max_len: DeviceInfo::SIZE as u16,
            p_value: value.as_mut_ptr(),
        };
        self.add_characteristic("info", service, &properties(true, false, false, false), &attr);

        uuid.uuid = UUID_DFU_CHAR_COMMAND;
        let attr = raw::ble_gatts_attr_t {
            p_uuid: &uuid,
            p_attr_md: &writable,
            init_len: 0,
            init_offs: 0,
            max_len: MAX_ATTR_LEN as u16,
            p_value: ptr::null_mut(),
        };
        self.link.command_handle = self
            .add_characteristic("command", service, &properties(false, false, true, true), &attr)
            .unwrap_or_default();

        #[cfg(feature = "buffer-endpoint")]
        {
            uuid.uuid = consts::UUID_DFU_CHAR_BUFFER;
            let attr = raw::ble_gatts_attr_t {
                p_uuid: &uuid,
                ..attr
            };
            self.buffer_handle =
                self.add_characteristic("buffer", service, &properties(false, true, false, false), &attr);
        }
    }

    /// Value handle of the new characteristic.
    fn add_characteristic(
        &self,
        name: &str,
        service: u16,
        md: &raw::ble_gatts_char_md_t,
        attr: &raw::ble_gatts_attr_t,
    ) -> Option<u16> {
        let mut handles: raw::ble_gatts_char_handles_t = unsafe { mem::zeroed() };
        let ret = unsafe { raw::sd_ble_gatts_characteristic_add(service, md, attr, &mut handles) };
        if ret != raw::NRF_SUCCESS {
            error!("cannot add {=str} characteristic: {}", name, ret);
            return None;
        }
        debug!("{=str} characteristic at {=u16}", name, handles.value_handle);
        Some(handles.value_handle)
    }

    /// Handles one stack event. Writes are fed to `dfu`.
    pub fn on_event(&mut self, evt: &raw::ble_evt_t, dfu: &mut Dfu<u16>, flash: &mut SocFlash) -> Option<Directive> {
        match u32::from(evt.header.evt_id) {
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONNECTED => {
                info!("connected");
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                self.on_link_event(conn, PeripheralEvent::Connected, dfu);
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => {
                let conn = unsafe { evt.evt.gap_evt.conn_handle };
                self.on_link_event(conn, PeripheralEvent::Disconnected, dfu);
            }
            raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONN_PARAM_UPDATE => {
                let params = unsafe { evt.evt.gap_evt.params.conn_param_update.conn_params };
                debug!("connection interval {=u16}", params.min_conn_interval);
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_EXCHANGE_MTU_REQUEST => {
                let conn = unsafe { evt.evt.gatts_evt.conn_handle };
                self.on_link_event(conn, PeripheralEvent::MtuExchangeRequest, dfu);
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_SYS_ATTR_MISSING => {
                let conn = unsafe { evt.evt.gatts_evt.conn_handle };
                self.on_link_event(conn, PeripheralEvent::SystemAttributesMissing, dfu);
            }
            raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_WRITE => {
                let gatts = unsafe { &evt.evt.gatts_evt };
                let write = unsafe { &gatts.params.write };
                let endpoint = if write.handle == self.link.command_handle {
                    Endpoint::Command
                } else if Some(write.handle) == self.buffer_handle {
                    Endpoint::Buffer
                } else {
                    warn!("write to unknown handle {=u16}", write.handle);
                    return None;
                };
                let data = unsafe { write.data.as_slice(usize::from(write.len)) };
                return dfu.on_frame_received(gatts.conn_handle, endpoint, data, flash, &mut self.link);
            }
            other => debug!("BLE event {=u32}", other),
        }
        None
    }

    fn on_link_event(&mut self, conn: u16, event: PeripheralEvent, dfu: &mut Dfu<u16>) {
        match dfu.on_peripheral_event(event) {
            PeripheralAction::RequestFastConnection => {
                check("cannot update connection parameters", unsafe {
                    raw::sd_ble_gap_conn_param_update(conn, &CONN_PARAMS)
                });
            }
            PeripheralAction::RestartAdvertising => {
                check("cannot restart advertising", unsafe {
                    raw::sd_ble_gap_adv_start(self.adv_handle, raw::BLE_CONN_CFG_TAG_DEFAULT as u8)
                });
            }
            PeripheralAction::KeepDefaultMtu => {
                check("cannot answer MTU exchange", unsafe {
                    raw::sd_ble_gatts_exchange_mtu_reply(conn, ATT_MTU as u16)
                });
            }
            PeripheralAction::InitSystemAttributes => {
                check("cannot set system attributes", unsafe {
                    raw::sd_ble_gatts_sys_attr_set(conn, ptr::null(), 0, 0)
                });
            }
        }
    }
}

/// Word aligned landing area for stack events.
#[repr(C, align(4))]
pub struct EventBuffer([u8; mem::size_of::<raw::ble_evt_t>() + ATT_MTU]);

impl EventBuffer {
    pub const fn new() -> Self {
        EventBuffer([0; mem::size_of::<raw::ble_evt_t>() + ATT_MTU])
    }

    /// Pulls the next pending stack event, if any.
    pub fn next(&mut self) -> Option<&raw::ble_evt_t> {
        let mut len = self.0.len() as u16;
        match unsafe { raw::sd_ble_evt_get(self.0.as_mut_ptr(), &mut len) } {
            raw::NRF_SUCCESS => Some(unsafe { &*(self.0.as_ptr() as *const raw::ble_evt_t) }),
            raw::NRF_ERROR_NOT_FOUND => None,
            ret => {
                warn!("BLE event error: {}", ret);
                None
            }
        }
    }
}
