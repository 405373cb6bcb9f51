//! L2CAP basic-frame encoding.
//!
//! ATT traffic rides the fixed channel 0x0004 in basic L2CAP frames:
//! `len:2 | cid:2 | payload`, little-endian.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A basic L2CAP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2capFrame {
    pub cid: u16,
    pub payload: Vec<u8>,
}

impl L2capFrame {
    pub fn new(cid: u16, payload: Vec<u8>) -> Self {
        L2capFrame { cid, payload }
    }

    /// Parses one complete frame. Returns `None` when the buffer is short
    /// or the length field disagrees with the payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let mut cursor = Cursor::new(data);
        let len = cursor.read_u16::<LittleEndian>().ok()? as usize;
        let cid = cursor.read_u16::<LittleEndian>().ok()?;
        if data.len() < 4 + len {
            return None;
        }
        Some(L2capFrame {
            cid,
            payload: data[4..4 + len].to_vec(),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.cid.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}
