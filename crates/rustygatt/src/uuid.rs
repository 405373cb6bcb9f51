//! Bluetooth UUIDs.
//!
//! A UUID is either a 16-bit SIG-assigned value or a full 128-bit value.
//! Internally every UUID is stored as 16 bytes in little-endian order, so
//! a 16-bit value expanded against the Bluetooth base UUID
//! (`0000xxxx-0000-1000-8000-00805F9B34FB`) compares equal to the same
//! UUID written out in full.

use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// The Bluetooth base UUID, little-endian.
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset within the base UUID where the 16-bit value sits.
const BASE_OFFSET: usize = 12;

/// A 128-bit Bluetooth UUID, stored little-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid {
    bytes: [u8; 16],
}

impl Uuid {
    /// Creates a UUID from 16 bytes in little-endian (wire) order.
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    /// Creates a UUID from 16 bytes in big-endian (string) order.
    pub fn from_bytes_be(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid { bytes }
    }

    /// Creates a UUID from a 16-bit SIG-assigned value.
    pub const fn from_u16(uuid16: u16) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid16 as u8;
        bytes[BASE_OFFSET + 1] = (uuid16 >> 8) as u8;
        Uuid { bytes }
    }

    /// Tries to create a UUID from little-endian wire bytes.
    ///
    /// Accepts slices of length 2 (16-bit) or 16 (128-bit); anything else
    /// returns `None`.
    pub fn from_wire(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    /// Generates a random 128-bit UUID.
    pub fn new_random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Uuid { bytes }
    }

    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
            && self.bytes[BASE_OFFSET + 2] == 0
            && self.bytes[BASE_OFFSET + 3] == 0
    }

    /// Returns the 16-bit value if this UUID is a SIG-assigned short UUID.
    pub fn as_u16(&self) -> Option<u16> {
        if self.is_sig_assigned() {
            Some(u16::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
            ]))
        } else {
            None
        }
    }

    /// Returns the full 16 bytes in little-endian order.
    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// Returns the full 16 bytes in big-endian (string) order.
    pub fn as_bytes_be(&self) -> [u8; 16] {
        let mut bytes = self.bytes;
        bytes.reverse();
        bytes
    }

    /// Returns the on-wire encoding: two bytes little-endian for a
    /// SIG-assigned UUID, 16 bytes little-endian otherwise.
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self.as_u16() {
            Some(uuid16) => uuid16.to_le_bytes().to_vec(),
            None => self.bytes.to_vec(),
        }
    }

    /// Length of the on-wire encoding (2 or 16).
    pub fn wire_len(&self) -> usize {
        if self.as_u16().is_some() {
            2
        } else {
            16
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<[u8; 16]> for Uuid {
    /// Bytes are taken in little-endian (wire) order.
    fn from(bytes: [u8; 16]) -> Self {
        Uuid::from_bytes_le(bytes)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl PartialEq<Uuid> for u16 {
    fn eq(&self, other: &Uuid) -> bool {
        other.as_u16() == Some(*self)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uuid16) = self.as_u16() {
            return write!(f, "{:04x}", uuid16);
        }
        let b = self.as_bytes_be();
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uuid16) = self.as_u16() {
            write!(f, "Uuid(0x{:04X})", uuid16)
        } else {
            write!(f, "Uuid({})", self)
        }
    }
}

/// Error parsing a UUID from a string.
#[derive(Debug, thiserror::Error)]
pub enum UuidParseError {
    #[error("uuid must be 4 or 32 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid 16-bit uuid")]
    InvalidShortForm,
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Parses `"2a00"` style 16-bit UUIDs and 32-hex-digit 128-bit UUIDs
    /// (hyphens optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| *c != '-').collect();
        match cleaned.len() {
            4 => {
                let val = u16::from_str_radix(&cleaned, 16)
                    .map_err(|_| UuidParseError::InvalidShortForm)?;
                Ok(Uuid::from_u16(val))
            }
            32 => {
                let mut bytes_be = [0u8; 16];
                hex::decode_to_slice(&cleaned, &mut bytes_be)?;
                Ok(Uuid::from_bytes_be(bytes_be))
            }
            n => Err(UuidParseError::InvalidLength(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_expands_against_base() {
        let short = Uuid::from_u16(0x2A00);
        let full: Uuid = "00002a00-0000-1000-8000-00805f9b34fb".parse().unwrap();
        assert_eq!(short, full);
        assert_eq!(short.as_u16(), Some(0x2A00));
    }

    #[test]
    fn parse_display_round_trip() {
        let u = Uuid::from_u16(0x180A);
        assert_eq!(u.to_string(), "180a");
        assert_eq!(u.to_string().parse::<Uuid>().unwrap(), u);

        let s = "f000aa00-0451-4000-b000-000000000000";
        let u: Uuid = s.parse().unwrap();
        assert_eq!(u.to_string(), s);
        assert_eq!(u.to_string().parse::<Uuid>().unwrap(), u);
    }

    #[test]
    fn wire_encoding_picks_short_form() {
        assert_eq!(Uuid::from_u16(0x1800).wire_bytes(), vec![0x00, 0x18]);
        let u: Uuid = "f000aa00-0451-4000-b000-000000000000".parse().unwrap();
        assert_eq!(u.wire_bytes().len(), 16);
        // 128-bit wire order is the reverse of the string order.
        assert_eq!(u.wire_bytes()[15], 0xF0);
        assert_eq!(Uuid::from_wire(&u.wire_bytes()).unwrap(), u);
    }

    #[test]
    fn rejects_bad_strings() {
        assert!("xyz".parse::<Uuid>().is_err());
        assert!("123".parse::<Uuid>().is_err());
        assert!("00002a0".parse::<Uuid>().is_err());
    }

    #[test]
    fn random_uuids_are_long_form() {
        let u = Uuid::new_random();
        // Overwhelmingly unlikely to land in the SIG base range.
        assert_eq!(u.wire_len(), 16);
        assert_ne!(u, Uuid::new_random());
    }
}
