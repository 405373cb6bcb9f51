//! ATT PDU encoding and decoding.
//!
//! Every PDU is `opcode:1 | payload`, little-endian throughout. Each PDU
//! type implements [`AttPdu`]; `parse` rejects short buffers with
//! `AttError::InvalidPdu` and checks the leading opcode byte.

use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A parseable, serializable ATT PDU.
pub trait AttPdu: Sized {
    const OPCODE: u8;

    fn parse(data: &[u8]) -> AttResult<Self>;
    fn serialize(&self) -> Vec<u8>;
}

fn check(data: &[u8], min_len: usize, opcode: u8) -> AttResult<()> {
    if data.len() < min_len || data[0] != opcode {
        return Err(AttError::InvalidPdu);
    }
    Ok(())
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> AttResult<u16> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| AttError::InvalidPdu)
}

/// Error Response: `req_op:1 | handle:2 | ecode:1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub request_opcode: u8,
    pub handle: u16,
    pub ecode: AttErrorCode,
}

impl AttPdu for ErrorResponse {
    const OPCODE: u8 = ATT_ERROR_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 5, Self::OPCODE)?;
        Ok(Self {
            request_opcode: data[1],
            handle: u16::from_le_bytes([data[2], data[3]]),
            ecode: data[4].into(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(Self::OPCODE);
        pdu.push(self.request_opcode);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu.push(self.ecode.into());
        pdu
    }
}

/// Exchange MTU Request: `mtu:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuRequest {
    pub client_mtu: u16,
}

impl AttPdu for ExchangeMtuRequest {
    const OPCODE: u8 = ATT_EXCHANGE_MTU_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            client_mtu: u16::from_le_bytes([data[1], data[2]]),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3);
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.client_mtu.to_le_bytes());
        pdu
    }
}

/// Exchange MTU Response: `mtu:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuResponse {
    pub server_mtu: u16,
}

impl AttPdu for ExchangeMtuResponse {
    const OPCODE: u8 = ATT_EXCHANGE_MTU_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            server_mtu: u16::from_le_bytes([data[1], data[2]]),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3);
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.server_mtu.to_le_bytes());
        pdu
    }
}

/// Find Information Request: `start:2 | end:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationRequest {
    pub start_handle: u16,
    pub end_handle: u16,
}

impl AttPdu for FindInformationRequest {
    const OPCODE: u8 = ATT_FIND_INFO_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 5, Self::OPCODE)?;
        let mut cursor = Cursor::new(&data[1..]);
        Ok(Self {
            start_handle: read_u16(&mut cursor)?,
            end_handle: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.start_handle.to_le_bytes());
        pdu.extend_from_slice(&self.end_handle.to_le_bytes());
        pdu
    }
}

/// Find Information Response: `format:1 | list of (handle:2, uuid:2|16)`.
///
/// All pairs in one response share a UUID width; the format byte says
/// which. Serialization takes the width from the first pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationResponse {
    pub pairs: Vec<(u16, Uuid)>,
}

impl AttPdu for FindInformationResponse {
    const OPCODE: u8 = ATT_FIND_INFO_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 2, Self::OPCODE)?;
        let uuid_len = match data[1] {
            ATT_FIND_INFO_FORMAT_16BIT => 2,
            ATT_FIND_INFO_FORMAT_128BIT => 16,
            _ => return Err(AttError::InvalidPdu),
        };
        let pair_len = 2 + uuid_len;
        let body = &data[2..];
        if body.is_empty() || body.len() % pair_len != 0 {
            return Err(AttError::InvalidPdu);
        }
        let mut pairs = Vec::with_capacity(body.len() / pair_len);
        for chunk in body.chunks_exact(pair_len) {
            let handle = u16::from_le_bytes([chunk[0], chunk[1]]);
            let uuid = Uuid::from_wire(&chunk[2..]).ok_or(AttError::InvalidPdu)?;
            pairs.push((handle, uuid));
        }
        Ok(Self { pairs })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = vec![Self::OPCODE];
        let uuid_len = self.pairs.first().map_or(2, |(_, u)| u.wire_len());
        pdu.push(if uuid_len == 2 {
            ATT_FIND_INFO_FORMAT_16BIT
        } else {
            ATT_FIND_INFO_FORMAT_128BIT
        });
        for (handle, uuid) in &self.pairs {
            pdu.extend_from_slice(&handle.to_le_bytes());
            if uuid_len == 2 {
                pdu.extend_from_slice(&uuid.as_u16().unwrap_or(0).to_le_bytes());
            } else {
                pdu.extend_from_slice(uuid.as_bytes_le());
            }
        }
        pdu
    }
}

/// Find By Type Value Request: `start:2 | end:2 | type:2 | value:n`.
///
/// The attribute type is restricted to 16-bit UUIDs by the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindByTypeValueRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub attribute_type: u16,
    pub value: Vec<u8>,
}

impl AttPdu for FindByTypeValueRequest {
    const OPCODE: u8 = ATT_FIND_BY_TYPE_VALUE_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 7, Self::OPCODE)?;
        let mut cursor = Cursor::new(&data[1..]);
        Ok(Self {
            start_handle: read_u16(&mut cursor)?,
            end_handle: read_u16(&mut cursor)?,
            attribute_type: read_u16(&mut cursor)?,
            value: data[7..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(7 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.start_handle.to_le_bytes());
        pdu.extend_from_slice(&self.end_handle.to_le_bytes());
        pdu.extend_from_slice(&self.attribute_type.to_le_bytes());
        pdu.extend_from_slice(&self.value);
        pdu
    }
}

/// Find By Type Value Response: list of `(found:2, group_end:2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindByTypeValueResponse {
    pub handles: Vec<(u16, u16)>,
}

impl AttPdu for FindByTypeValueResponse {
    const OPCODE: u8 = ATT_FIND_BY_TYPE_VALUE_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 5, Self::OPCODE)?;
        let body = &data[1..];
        if body.len() % 4 != 0 {
            return Err(AttError::InvalidPdu);
        }
        let handles = body
            .chunks_exact(4)
            .map(|c| {
                (
                    u16::from_le_bytes([c[0], c[1]]),
                    u16::from_le_bytes([c[2], c[3]]),
                )
            })
            .collect();
        Ok(Self { handles })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(1 + self.handles.len() * 4);
        pdu.push(Self::OPCODE);
        for (found, group_end) in &self.handles {
            pdu.extend_from_slice(&found.to_le_bytes());
            pdu.extend_from_slice(&group_end.to_le_bytes());
        }
        pdu
    }
}

/// Read By Type Request: `start:2 | end:2 | type:2|16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub attribute_type: Uuid,
}

impl AttPdu for ReadByTypeRequest {
    const OPCODE: u8 = ATT_READ_BY_TYPE_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 7, Self::OPCODE)?;
        let mut cursor = Cursor::new(&data[1..]);
        let start_handle = read_u16(&mut cursor)?;
        let end_handle = read_u16(&mut cursor)?;
        let attribute_type = match data.len() {
            7 | 21 => Uuid::from_wire(&data[5..]).ok_or(AttError::InvalidPdu)?,
            _ => return Err(AttError::InvalidPdu),
        };
        Ok(Self {
            start_handle,
            end_handle,
            attribute_type,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = vec![Self::OPCODE];
        pdu.extend_from_slice(&self.start_handle.to_le_bytes());
        pdu.extend_from_slice(&self.end_handle.to_le_bytes());
        pdu.extend_from_slice(&self.attribute_type.wire_bytes());
        pdu
    }
}

/// Read By Type Response: `len:1 | list of (handle:2, value[len-2])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeResponse {
    pub element_len: u8,
    pub elements: Vec<(u16, Vec<u8>)>,
}

impl AttPdu for ReadByTypeResponse {
    const OPCODE: u8 = ATT_READ_BY_TYPE_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 2, Self::OPCODE)?;
        let element_len = data[1] as usize;
        let body = &data[2..];
        if element_len < 2 || body.is_empty() || body.len() % element_len != 0 {
            return Err(AttError::InvalidPdu);
        }
        let elements = body
            .chunks_exact(element_len)
            .map(|c| (u16::from_le_bytes([c[0], c[1]]), c[2..].to_vec()))
            .collect();
        Ok(Self {
            element_len: element_len as u8,
            elements,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = vec![Self::OPCODE, self.element_len];
        for (handle, value) in &self.elements {
            pdu.extend_from_slice(&handle.to_le_bytes());
            pdu.extend_from_slice(value);
        }
        pdu
    }
}

/// Read Request: `handle:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub handle: u16,
}

impl AttPdu for ReadRequest {
    const OPCODE: u8 = ATT_READ_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            handle: u16::from_le_bytes([data[1], data[2]]),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3);
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu
    }
}

/// Read Response: `value:n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub value: Vec<u8>,
}

impl AttPdu for ReadResponse {
    const OPCODE: u8 = ATT_READ_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 1, Self::OPCODE)?;
        Ok(Self {
            value: data[1..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(1 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.value);
        pdu
    }
}

/// Read Blob Request: `handle:2 | offset:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlobRequest {
    pub handle: u16,
    pub offset: u16,
}

impl AttPdu for ReadBlobRequest {
    const OPCODE: u8 = ATT_READ_BLOB_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 5, Self::OPCODE)?;
        let mut cursor = Cursor::new(&data[1..]);
        Ok(Self {
            handle: read_u16(&mut cursor)?,
            offset: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu.extend_from_slice(&self.offset.to_le_bytes());
        pdu
    }
}

/// Read Blob Response: `value:n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlobResponse {
    pub value: Vec<u8>,
}

impl AttPdu for ReadBlobResponse {
    const OPCODE: u8 = ATT_READ_BLOB_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 1, Self::OPCODE)?;
        Ok(Self {
            value: data[1..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(1 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.value);
        pdu
    }
}

/// Read By Group Type Request: `start:2 | end:2 | type:2|16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub group_type: Uuid,
}

impl AttPdu for ReadByGroupTypeRequest {
    const OPCODE: u8 = ATT_READ_BY_GROUP_TYPE_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 7, Self::OPCODE)?;
        let mut cursor = Cursor::new(&data[1..]);
        let start_handle = read_u16(&mut cursor)?;
        let end_handle = read_u16(&mut cursor)?;
        let group_type = match data.len() {
            7 | 21 => Uuid::from_wire(&data[5..]).ok_or(AttError::InvalidPdu)?,
            _ => return Err(AttError::InvalidPdu),
        };
        Ok(Self {
            start_handle,
            end_handle,
            group_type,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = vec![Self::OPCODE];
        pdu.extend_from_slice(&self.start_handle.to_le_bytes());
        pdu.extend_from_slice(&self.end_handle.to_le_bytes());
        pdu.extend_from_slice(&self.group_type.wire_bytes());
        pdu
    }
}

/// One element of a Read By Group Type Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupElement {
    pub handle: u16,
    pub end_handle: u16,
    pub value: Vec<u8>,
}

/// Read By Group Type Response: `len:1 | list of (handle:2, end:2, value[len-4])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeResponse {
    pub element_len: u8,
    pub elements: Vec<GroupElement>,
}

impl AttPdu for ReadByGroupTypeResponse {
    const OPCODE: u8 = ATT_READ_BY_GROUP_TYPE_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 2, Self::OPCODE)?;
        let element_len = data[1] as usize;
        let body = &data[2..];
        if element_len < 6 || body.is_empty() || body.len() % element_len != 0 {
            return Err(AttError::InvalidPdu);
        }
        let elements = body
            .chunks_exact(element_len)
            .map(|c| GroupElement {
                handle: u16::from_le_bytes([c[0], c[1]]),
                end_handle: u16::from_le_bytes([c[2], c[3]]),
                value: c[4..].to_vec(),
            })
            .collect();
        Ok(Self {
            element_len: element_len as u8,
            elements,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = vec![Self::OPCODE, self.element_len];
        for element in &self.elements {
            pdu.extend_from_slice(&element.handle.to_le_bytes());
            pdu.extend_from_slice(&element.end_handle.to_le_bytes());
            pdu.extend_from_slice(&element.value);
        }
        pdu
    }
}

/// Write Request: `handle:2 | value:n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPdu for WriteRequest {
    const OPCODE: u8 = ATT_WRITE_REQ;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            handle: u16::from_le_bytes([data[1], data[2]]),
            value: data[3..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu.extend_from_slice(&self.value);
        pdu
    }
}

/// Write Response: empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse;

impl AttPdu for WriteResponse {
    const OPCODE: u8 = ATT_WRITE_RSP;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 1, Self::OPCODE)?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::OPCODE]
    }
}

/// Write Command: `handle:2 | value:n`, never answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPdu for WriteCommand {
    const OPCODE: u8 = ATT_WRITE_CMD;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            handle: u16::from_le_bytes([data[1], data[2]]),
            value: data[3..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu.extend_from_slice(&self.value);
        pdu
    }
}

/// Handle Value Notification: `handle:2 | value:n`, server-initiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueNotification {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPdu for HandleValueNotification {
    const OPCODE: u8 = ATT_HANDLE_VALUE_NTF;

    fn parse(data: &[u8]) -> AttResult<Self> {
        check(data, 3, Self::OPCODE)?;
        Ok(Self {
            handle: u16::from_le_bytes([data[1], data[2]]),
            value: data[3..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(3 + self.value.len());
        pdu.push(Self::OPCODE);
        pdu.extend_from_slice(&self.handle.to_le_bytes());
        pdu.extend_from_slice(&self.value);
        pdu
    }
}
