//! Unit tests for L2CAP framing and the loopback endpoint.

use super::packet::L2capFrame;
use super::{loopback, L2capConn};
use crate::att::constants::ATT_CID;

#[test]
fn frame_round_trip() {
    let frame = L2capFrame::new(ATT_CID, vec![0x0A, 0x03, 0x00]);
    let bytes = frame.serialize();
    assert_eq!(bytes, vec![0x03, 0x00, 0x04, 0x00, 0x0A, 0x03, 0x00]);
    assert_eq!(L2capFrame::parse(&bytes).unwrap(), frame);
}

#[test]
fn frame_parse_rejects_short_or_inconsistent_buffers() {
    assert!(L2capFrame::parse(&[0x01, 0x00, 0x04]).is_none());
    // Length field claims more payload than present.
    assert!(L2capFrame::parse(&[0x05, 0x00, 0x04, 0x00, 0xAA]).is_none());
}

#[test]
fn empty_payload_frame() {
    let frame = L2capFrame::new(0x0005, Vec::new());
    let bytes = frame.serialize();
    assert_eq!(L2capFrame::parse(&bytes).unwrap(), frame);
}

#[test]
fn loopback_passes_pdus_both_ways() {
    let (a, b) = loopback();
    a.write_pdu(&[1, 2, 3]).unwrap();
    assert_eq!(b.read_pdu().unwrap(), vec![1, 2, 3]);
    b.write_pdu(&[4]).unwrap();
    assert_eq!(a.read_pdu().unwrap(), vec![4]);
}

#[test]
fn loopback_close_reads_as_eof() {
    let (a, b) = loopback();
    a.close();
    assert!(b.read_pdu().unwrap().is_empty());
    // Writing into the closed side fails.
    assert!(a.write_pdu(&[1]).is_err());
}
