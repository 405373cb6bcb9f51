//! Advertising and scan-response payloads.
//!
//! Payloads are TLV sequences capped at 31 bytes. The builder refuses
//! fields that do not fit, except the local name, which is truncated.

use crate::error::Error;
use crate::uuid::Uuid;
use byteorder::{BigEndian, ByteOrder};

/// Maximum advertising payload length.
pub const MAX_ADV_LEN: usize = 31;

// AD field types
pub const ADV_FLAGS: u8 = 0x01;
pub const ADV_16BIT_UUID_COMPLETE: u8 = 0x03;
pub const ADV_128BIT_UUID_COMPLETE: u8 = 0x07;
pub const ADV_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const ADV_TX_POWER: u8 = 0x0A;
pub const ADV_SERVICE_DATA: u8 = 0x16;
pub const ADV_MANUFACTURER_DATA: u8 = 0xFF;

/// Flags value: LE General Discoverable Mode, BR/EDR not supported.
pub const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

const APPLE_COMPANY_ID: u16 = 0x004C;
const IBEACON_TYPE: u8 = 0x02;
const IBEACON_DATA_LEN: u8 = 0x15;

/// Builds an advertising or scan-response payload.
#[derive(Debug, Clone, Default)]
pub struct AdvPacket {
    buf: Vec<u8>,
}

impl AdvPacket {
    pub fn new() -> Self {
        AdvPacket::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends one TLV field; fails if it would exceed 31 bytes.
    pub fn append_field(&mut self, typ: u8, data: &[u8]) -> Result<&mut Self, Error> {
        let total = self.buf.len() + 2 + data.len();
        if total > MAX_ADV_LEN {
            return Err(Error::AdvertisementTooLong(total));
        }
        self.buf.push(data.len() as u8 + 1);
        self.buf.push(typ);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    /// Appends the flags field (LE-only, general discoverable).
    pub fn append_flags(&mut self, flags: u8) -> Result<&mut Self, Error> {
        self.append_field(ADV_FLAGS, &[flags])
    }

    /// Appends the complete local name, truncated to the remaining space.
    pub fn append_name(&mut self, name: &str) -> Result<&mut Self, Error> {
        let avail = MAX_ADV_LEN.saturating_sub(self.buf.len() + 2);
        let n = name.len().min(avail);
        self.append_field(ADV_COMPLETE_LOCAL_NAME, &name.as_bytes()[..n])
    }

    /// Appends a complete service UUID list. All UUIDs must share a width;
    /// a mixed list is split by the caller.
    pub fn append_uuids(&mut self, uuids: &[Uuid]) -> Result<&mut Self, Error> {
        if uuids.is_empty() {
            return Ok(self);
        }
        let shorts: Vec<&Uuid> = uuids.iter().filter(|u| u.wire_len() == 2).collect();
        let longs: Vec<&Uuid> = uuids.iter().filter(|u| u.wire_len() == 16).collect();
        if !shorts.is_empty() {
            let mut data = Vec::with_capacity(shorts.len() * 2);
            for u in shorts {
                data.extend_from_slice(&u.wire_bytes());
            }
            self.append_field(ADV_16BIT_UUID_COMPLETE, &data)?;
        }
        if !longs.is_empty() {
            let mut data = Vec::with_capacity(longs.len() * 16);
            for u in longs {
                data.extend_from_slice(&u.wire_bytes());
            }
            self.append_field(ADV_128BIT_UUID_COMPLETE, &data)?;
        }
        Ok(self)
    }

    /// Appends manufacturer-specific data: company id (LE) then payload.
    pub fn append_manufacturer_data(
        &mut self,
        company: u16,
        data: &[u8],
    ) -> Result<&mut Self, Error> {
        let mut field = Vec::with_capacity(2 + data.len());
        field.extend_from_slice(&company.to_le_bytes());
        field.extend_from_slice(data);
        self.append_field(ADV_MANUFACTURER_DATA, &field)
    }
}

/// Builds the default advertising payload for a set of service UUIDs.
pub fn service_adv_packet(uuids: &[Uuid]) -> Result<AdvPacket, Error> {
    let mut pkt = AdvPacket::new();
    pkt.append_flags(FLAGS_GENERAL_DISCOVERABLE)?;
    pkt.append_uuids(uuids)?;
    Ok(pkt)
}

/// Builds the default scan response: the complete local name.
pub fn name_scan_response(name: &str) -> AdvPacket {
    let mut pkt = AdvPacket::new();
    // Name is truncated to fit, so this cannot fail.
    let _ = pkt.append_name(name);
    pkt
}

/// Builds an iBeacon advertising payload.
///
/// The proximity UUID, major, and minor ride big-endian, unlike the rest
/// of the protocol.
pub fn ibeacon_packet(uuid: Uuid, major: u16, minor: u16, power: i8) -> Result<AdvPacket, Error> {
    let mut data = Vec::with_capacity(23);
    data.push(IBEACON_TYPE);
    data.push(IBEACON_DATA_LEN);
    data.extend_from_slice(&uuid.as_bytes_be());
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(power as u8);

    let mut pkt = AdvPacket::new();
    pkt.append_flags(FLAGS_GENERAL_DISCOVERABLE)?;
    pkt.append_manufacturer_data(APPLE_COMPANY_ID, &data)?;
    Ok(pkt)
}

/// Fields decoded from a received advertising payload.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub flags: Option<u8>,
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: Option<Vec<u8>>,
    pub tx_power: Option<i8>,
    pub service_data: Vec<(Uuid, Vec<u8>)>,
    pub connectable: bool,
}

impl Advertisement {
    /// Decodes a raw advertising payload, skipping malformed fields.
    pub fn unmarshal(data: &[u8]) -> Self {
        let mut adv = Advertisement::default();
        for (typ, field) in fields(data) {
            match typ {
                ADV_FLAGS if field.len() == 1 => adv.flags = Some(field[0]),
                ADV_SHORT_LOCAL_NAME | ADV_COMPLETE_LOCAL_NAME => {
                    if let Ok(name) = std::str::from_utf8(field) {
                        adv.local_name = Some(name.to_string());
                    }
                }
                ADV_16BIT_UUID_COMPLETE | 0x02 => {
                    for chunk in field.chunks_exact(2) {
                        if let Some(u) = Uuid::from_wire(chunk) {
                            adv.service_uuids.push(u);
                        }
                    }
                }
                ADV_128BIT_UUID_COMPLETE | 0x06 => {
                    for chunk in field.chunks_exact(16) {
                        if let Some(u) = Uuid::from_wire(chunk) {
                            adv.service_uuids.push(u);
                        }
                    }
                }
                ADV_TX_POWER if field.len() == 1 => adv.tx_power = Some(field[0] as i8),
                ADV_SERVICE_DATA if field.len() >= 2 => {
                    if let Some(u) = Uuid::from_wire(&field[..2]) {
                        adv.service_data.push((u, field[2..].to_vec()));
                    }
                }
                ADV_MANUFACTURER_DATA => adv.manufacturer_data = Some(field.to_vec()),
                _ => {}
            }
        }
        adv
    }

    /// Decodes iBeacon fields out of the manufacturer data, if present.
    pub fn ibeacon(&self) -> Option<(Uuid, u16, u16, i8)> {
        let md = self.manufacturer_data.as_deref()?;
        if md.len() != 25
            || u16::from_le_bytes([md[0], md[1]]) != APPLE_COMPANY_ID
            || md[2] != IBEACON_TYPE
            || md[3] != IBEACON_DATA_LEN
        {
            return None;
        }
        let mut uuid_be = [0u8; 16];
        uuid_be.copy_from_slice(&md[4..20]);
        let uuid = Uuid::from_bytes_be(uuid_be);
        let major = BigEndian::read_u16(&md[20..22]);
        let minor = BigEndian::read_u16(&md[22..24]);
        Some((uuid, major, minor, md[24] as i8))
    }
}

/// Iterates the TLV fields of an advertising payload.
fn fields(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    std::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let len = data[i] as usize;
        if len == 0 || i + 1 + len > data.len() {
            return None;
        }
        let typ = data[i + 1];
        let field = &data[i + 2..i + 1 + len];
        i += 1 + len;
        Some((typ, field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ibeacon_round_trip() {
        let uuid: Uuid = "e2c56db5-dffb-48d2-b060-d0f5a71096e0".parse().unwrap();
        let pkt = ibeacon_packet(uuid, 1047, 13, -59).unwrap();
        assert!(pkt.len() <= MAX_ADV_LEN);

        let adv = Advertisement::unmarshal(pkt.bytes());
        assert_eq!(adv.flags, Some(FLAGS_GENERAL_DISCOVERABLE));
        let (u, major, minor, power) = adv.ibeacon().unwrap();
        assert_eq!(u, uuid);
        assert_eq!(major, 1047);
        assert_eq!(minor, 13);
        assert_eq!(power, -59);
    }

    #[test]
    fn service_packet_lists_uuids() {
        let pkt =
            service_adv_packet(&[Uuid::from_u16(0x1800), Uuid::from_u16(0x180F)]).unwrap();
        let adv = Advertisement::unmarshal(pkt.bytes());
        assert_eq!(adv.service_uuids.len(), 2);
        assert_eq!(adv.service_uuids[0], 0x1800u16);
        assert_eq!(adv.service_uuids[1], 0x180Fu16);
    }

    #[test]
    fn name_is_truncated_to_fit() {
        let long = "a-device-name-well-past-thirty-one-bytes-long";
        let pkt = name_scan_response(long);
        assert!(pkt.len() <= MAX_ADV_LEN);
        let adv = Advertisement::unmarshal(pkt.bytes());
        let name = adv.local_name.unwrap();
        assert!(long.starts_with(&name));
        assert_eq!(name.len(), MAX_ADV_LEN - 2);
    }

    #[test]
    fn oversized_field_is_rejected() {
        let mut pkt = AdvPacket::new();
        assert!(pkt.append_field(ADV_MANUFACTURER_DATA, &[0u8; 30]).is_err());
    }
}
