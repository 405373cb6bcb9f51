//! Central-side GATT operations against a remote peripheral.
//!
//! Discovery walks the remote attribute database with handle-range
//! requests; each loop advances past the last handle seen and stops on an
//! AttributeNotFound error, on reaching 0xFFFF, or when the range is
//! exhausted.

use crate::att::constants::*;
use crate::att::{AttClient, AttError, AttResult};
use crate::gatt::types::Property;
use crate::uuid::Uuid;
use log::warn;
use std::sync::Arc;

/// A primary service discovered on a remote peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub start_handle: u16,
    pub end_handle: u16,
}

/// A characteristic discovered within a remote service.
#[derive(Debug, Clone)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    pub properties: Property,
    pub decl_handle: u16,
    pub value_handle: u16,
    pub end_handle: u16,
    pub cccd_handle: Option<u16>,
    pub descriptors: Vec<RemoteDescriptor>,
}

/// A descriptor discovered within a remote characteristic.
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    pub uuid: Uuid,
    pub handle: u16,
}

/// A remote peripheral as seen from the central role.
pub struct Peripheral {
    att: Arc<AttClient>,
    addr: [u8; 6],
    name: String,
    services: Vec<RemoteService>,
}

impl Peripheral {
    pub fn new(att: Arc<AttClient>, addr: [u8; 6], name: String) -> Self {
        Peripheral {
            att,
            addr,
            name,
            services: Vec::new(),
        }
    }

    /// Platform-unique id: the MAC, most significant byte first.
    pub fn id(&self) -> String {
        let a = &self.addr;
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> [u8; 6] {
        self.addr
    }

    /// Services found by the last discovery.
    pub fn services(&self) -> &[RemoteService] {
        &self.services
    }

    pub fn att(&self) -> &Arc<AttClient> {
        &self.att
    }

    /// Negotiates the connection MTU up to `mtu`.
    pub fn exchange_mtu(&self, mtu: u16) -> AttResult<u16> {
        self.att.exchange_mtu(mtu)
    }

    /// Discovers primary services. With a filter, only services whose UUID
    /// appears in it are returned; `None` returns everything.
    pub fn discover_services(&mut self, filter: Option<&[Uuid]>) -> AttResult<Vec<RemoteService>> {
        self.services.clear();
        let mut start = ATT_HANDLE_MIN;
        loop {
            let rsp = match self.att.read_by_group_type(
                start,
                ATT_HANDLE_MAX,
                Uuid::from_u16(PRIMARY_SERVICE_UUID),
            ) {
                Ok(rsp) => rsp,
                Err(e) if e.is_attr_not_found() => break,
                Err(e) => return Err(e),
            };
            if !matches!(rsp.element_len, 6 | 20) {
                warn!("service discovery: bad element length {}", rsp.element_len);
                break;
            }
            let mut done = rsp.elements.is_empty();
            for el in rsp.elements {
                let uuid = match Uuid::from_wire(&el.value) {
                    Some(uuid) => uuid,
                    None => continue,
                };
                self.services.push(RemoteService {
                    uuid,
                    start_handle: el.handle,
                    end_handle: el.end_handle,
                });
                done = el.end_handle == ATT_HANDLE_MAX;
                start = el.end_handle.wrapping_add(1);
            }
            if done || start < ATT_HANDLE_MIN {
                break;
            }
        }
        let mut found = self.services.clone();
        if let Some(filter) = filter {
            found.retain(|s| filter.contains(&s.uuid));
        }
        Ok(found)
    }

    /// Discovers the characteristics of `service`. Each characteristic's
    /// end handle is patched to just before the next sibling's declaration;
    /// the last one extends to the service end.
    pub fn discover_characteristics(
        &mut self,
        filter: Option<&[Uuid]>,
        service: &RemoteService,
    ) -> AttResult<Vec<RemoteCharacteristic>> {
        let mut chars: Vec<RemoteCharacteristic> = Vec::new();
        let mut start = service.start_handle;
        'outer: loop {
            let rsp = match self.att.read_by_type(
                start,
                service.end_handle,
                Uuid::from_u16(CHARACTERISTIC_UUID),
            ) {
                Ok(rsp) => rsp,
                Err(e) if e.is_attr_not_found() => break,
                Err(e) => return Err(e),
            };
            if !matches!(rsp.element_len, 7 | 21) {
                warn!(
                    "characteristic discovery: bad element length {}",
                    rsp.element_len
                );
                break;
            }
            if rsp.elements.is_empty() {
                break;
            }
            for (decl_handle, value) in rsp.elements {
                // props:1 | value_handle:2 | uuid:2|16
                let properties = Property(value[0]);
                let value_handle = u16::from_le_bytes([value[1], value[2]]);
                let uuid = match Uuid::from_wire(&value[3..]) {
                    Some(uuid) => uuid,
                    None => continue,
                };
                if let Some(prev) = chars.last_mut() {
                    prev.end_handle = decl_handle.wrapping_sub(1);
                }
                chars.push(RemoteCharacteristic {
                    uuid,
                    properties,
                    decl_handle,
                    value_handle,
                    end_handle: service.end_handle,
                    cccd_handle: None,
                    descriptors: Vec::new(),
                });
                if value_handle >= service.end_handle {
                    break 'outer;
                }
                start = value_handle.wrapping_add(1);
            }
        }
        if let Some(last) = chars.last_mut() {
            last.end_handle = service.end_handle;
        }
        if let Some(filter) = filter {
            chars.retain(|c| filter.contains(&c.uuid));
        }
        Ok(chars)
    }

    /// Discovers the descriptors sitting between a characteristic's value
    /// attribute and its end handle, noting the CCCD when present.
    pub fn discover_descriptors(
        &mut self,
        characteristic: &mut RemoteCharacteristic,
    ) -> AttResult<Vec<RemoteDescriptor>> {
        characteristic.descriptors.clear();
        characteristic.cccd_handle = None;
        let mut start = characteristic.value_handle.wrapping_add(1);
        let end = characteristic.end_handle;
        while start != 0 && start <= end {
            let pairs = match self.att.find_information(start, end) {
                Ok(pairs) => pairs,
                Err(e) if e.is_attr_not_found() => break,
                Err(e) => return Err(e),
            };
            if pairs.is_empty() {
                break;
            }
            let mut done = false;
            for (handle, uuid) in pairs {
                if uuid == CLIENT_CHAR_CONFIG_UUID {
                    characteristic.cccd_handle = Some(handle);
                }
                characteristic
                    .descriptors
                    .push(RemoteDescriptor { uuid, handle });
                done = handle == end;
                start = handle.wrapping_add(1);
            }
            if done {
                break;
            }
        }
        Ok(characteristic.descriptors.clone())
    }

    /// Reads a characteristic value.
    pub fn read_characteristic(&self, c: &RemoteCharacteristic) -> AttResult<Vec<u8>> {
        self.att.read(c.value_handle)
    }

    /// Reads a characteristic value starting at `offset`.
    pub fn read_characteristic_blob(
        &self,
        c: &RemoteCharacteristic,
        offset: u16,
    ) -> AttResult<Vec<u8>> {
        self.att.read_blob(c.value_handle, offset)
    }

    /// Writes a characteristic value; `no_rsp` selects Write Command.
    pub fn write_characteristic(
        &self,
        c: &RemoteCharacteristic,
        value: &[u8],
        no_rsp: bool,
    ) -> AttResult<()> {
        if no_rsp {
            self.att.write_command(c.value_handle, value)
        } else {
            self.att.write(c.value_handle, value)
        }
    }

    /// Reads a descriptor value.
    pub fn read_descriptor(&self, d: &RemoteDescriptor) -> AttResult<Vec<u8>> {
        self.att.read(d.handle)
    }

    /// Writes a descriptor value.
    pub fn write_descriptor(&self, d: &RemoteDescriptor, value: &[u8]) -> AttResult<()> {
        self.att.write(d.handle, value)
    }

    /// Subscribes to notifications, or unsubscribes when `f` is `None`.
    ///
    /// The callback is registered before the CCCD write so the first
    /// notification cannot race past it; on disable it is removed after
    /// the write completes.
    pub fn set_notify(
        &self,
        c: &RemoteCharacteristic,
        f: Option<Box<dyn FnMut(&[u8]) + Send>>,
    ) -> AttResult<()> {
        self.set_cccd(c, f, CCC_NOTIFY_FLAG)
    }

    /// Subscribes to indications, or unsubscribes when `f` is `None`.
    pub fn set_indicate(
        &self,
        c: &RemoteCharacteristic,
        f: Option<Box<dyn FnMut(&[u8]) + Send>>,
    ) -> AttResult<()> {
        self.set_cccd(c, f, CCC_INDICATE_FLAG)
    }

    fn set_cccd(
        &self,
        c: &RemoteCharacteristic,
        f: Option<Box<dyn FnMut(&[u8]) + Send>>,
        flag: u16,
    ) -> AttResult<()> {
        let cccd = c.cccd_handle.ok_or(AttError::NoCccd)?;
        match f {
            Some(f) => {
                self.att.subscribe(c.value_handle, f);
                match self.att.write(cccd, &flag.to_le_bytes()) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.att.unsubscribe(c.value_handle);
                        Err(e)
                    }
                }
            }
            None => {
                let result = self.att.write(cccd, &0u16.to_le_bytes());
                self.att.unsubscribe(c.value_handle);
                result
            }
        }
    }
}
