//! ATT protocol constants.

// ATT opcodes
pub const ATT_ERROR_RSP: u8 = 0x01;
pub const ATT_EXCHANGE_MTU_REQ: u8 = 0x02;
pub const ATT_EXCHANGE_MTU_RSP: u8 = 0x03;
pub const ATT_FIND_INFO_REQ: u8 = 0x04;
pub const ATT_FIND_INFO_RSP: u8 = 0x05;
pub const ATT_FIND_BY_TYPE_VALUE_REQ: u8 = 0x06;
pub const ATT_FIND_BY_TYPE_VALUE_RSP: u8 = 0x07;
pub const ATT_READ_BY_TYPE_REQ: u8 = 0x08;
pub const ATT_READ_BY_TYPE_RSP: u8 = 0x09;
pub const ATT_READ_REQ: u8 = 0x0A;
pub const ATT_READ_RSP: u8 = 0x0B;
pub const ATT_READ_BLOB_REQ: u8 = 0x0C;
pub const ATT_READ_BLOB_RSP: u8 = 0x0D;
pub const ATT_READ_BY_GROUP_TYPE_REQ: u8 = 0x10;
pub const ATT_READ_BY_GROUP_TYPE_RSP: u8 = 0x11;
pub const ATT_WRITE_REQ: u8 = 0x12;
pub const ATT_WRITE_RSP: u8 = 0x13;
pub const ATT_WRITE_CMD: u8 = 0x52;
pub const ATT_HANDLE_VALUE_NTF: u8 = 0x1B;

/// Maps a request opcode to the opcode of its response.
pub fn rsp_opcode_for(req: u8) -> Option<u8> {
    match req {
        ATT_EXCHANGE_MTU_REQ => Some(ATT_EXCHANGE_MTU_RSP),
        ATT_FIND_INFO_REQ => Some(ATT_FIND_INFO_RSP),
        ATT_FIND_BY_TYPE_VALUE_REQ => Some(ATT_FIND_BY_TYPE_VALUE_RSP),
        ATT_READ_BY_TYPE_REQ => Some(ATT_READ_BY_TYPE_RSP),
        ATT_READ_REQ => Some(ATT_READ_RSP),
        ATT_READ_BLOB_REQ => Some(ATT_READ_BLOB_RSP),
        ATT_READ_BY_GROUP_TYPE_REQ => Some(ATT_READ_BY_GROUP_TYPE_RSP),
        ATT_WRITE_REQ => Some(ATT_WRITE_RSP),
        _ => None,
    }
}

// ATT error codes
pub const ATT_ECODE_INVALID_HANDLE: u8 = 0x01;
pub const ATT_ECODE_READ_NOT_PERMITTED: u8 = 0x02;
pub const ATT_ECODE_WRITE_NOT_PERMITTED: u8 = 0x03;
pub const ATT_ECODE_INVALID_PDU: u8 = 0x04;
pub const ATT_ECODE_REQUEST_NOT_SUPPORTED: u8 = 0x06;
pub const ATT_ECODE_INVALID_OFFSET: u8 = 0x07;
pub const ATT_ECODE_ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
pub const ATT_ECODE_ATTRIBUTE_NOT_LONG: u8 = 0x0B;
pub const ATT_ECODE_UNLIKELY: u8 = 0x0E;
pub const ATT_ECODE_UNSUPPORTED_GROUP_TYPE: u8 = 0x10;
pub const ATT_ECODE_INSUFFICIENT_RESOURCES: u8 = 0x11;

// Handle range
pub const ATT_HANDLE_MIN: u16 = 0x0001;
pub const ATT_HANDLE_MAX: u16 = 0xFFFF;

// MTU bounds. L2CAP implementations shall support an MTU of at least 23
// for the ATT fixed channel; 672 is the L2CAP default upper bound.
pub const ATT_DEFAULT_MTU: u16 = 23;
pub const ATT_MAX_MTU: u16 = 672;

// Find Information response formats
pub const ATT_FIND_INFO_FORMAT_16BIT: u8 = 0x01;
pub const ATT_FIND_INFO_FORMAT_128BIT: u8 = 0x02;

// L2CAP fixed channel for ATT
pub const ATT_CID: u16 = 0x0004;

// Declaration and descriptor type UUIDs
pub const PRIMARY_SERVICE_UUID: u16 = 0x2800;
pub const SECONDARY_SERVICE_UUID: u16 = 0x2801;
pub const INCLUDE_UUID: u16 = 0x2802;
pub const CHARACTERISTIC_UUID: u16 = 0x2803;
pub const CLIENT_CHAR_CONFIG_UUID: u16 = 0x2902;
pub const SERVER_CHAR_CONFIG_UUID: u16 = 0x2903;

// Well-known GAP/GATT service and characteristic UUIDs
pub const GAP_SERVICE_UUID: u16 = 0x1800;
pub const GATT_SERVICE_UUID: u16 = 0x1801;
pub const DEVICE_NAME_UUID: u16 = 0x2A00;
pub const APPEARANCE_UUID: u16 = 0x2A01;
pub const SERVICE_CHANGED_UUID: u16 = 0x2A05;

// CCCD value bits
pub const CCC_NOTIFY_FLAG: u16 = 0x0001;
pub const CCC_INDICATE_FLAG: u16 = 0x0002;
