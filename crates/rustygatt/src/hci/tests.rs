//! Unit tests for HCI packet construction and event parsing.

use super::constants::*;
use super::packet::*;

#[test]
fn opcode_packing() {
    assert_eq!(opcode(OGF_LE_CTL, OCF_LE_SET_ADVERTISE_ENABLE), 0x200A);
    assert_eq!(opcode(OGF_HOST_CTL, OCF_RESET), 0x0C03);
}

#[test]
fn reset_packet_bytes() {
    assert_eq!(HciCommand::Reset.to_packet(), vec![0x01, 0x03, 0x0C, 0x00]);
}

#[test]
fn advertising_parameter_packet() {
    let pkt = HciCommand::LeSetAdvertisingParameters {
        min_interval: 0x00F4,
        max_interval: 0x00F4,
        channel_map: 7,
    }
    .to_packet();
    assert_eq!(pkt[0], HCI_COMMAND_PKT);
    assert_eq!(u16::from_le_bytes([pkt[1], pkt[2]]), 0x2006);
    assert_eq!(pkt[3], 15); // parameter length
    assert_eq!(u16::from_le_bytes([pkt[4], pkt[5]]), 0x00F4);
    assert_eq!(u16::from_le_bytes([pkt[6], pkt[7]]), 0x00F4);
    assert_eq!(pkt[17], 7); // channel map
}

#[test]
fn advertising_data_packet_carries_all_31_bytes() {
    let mut data = [0u8; 31];
    data[0] = 0x02;
    data[1] = 0x01;
    data[2] = 0x06;
    let pkt = HciCommand::LeSetAdvertisingData { len: 3, data }.to_packet();
    assert_eq!(pkt[3], 32); // len byte + fixed 31-byte buffer
    assert_eq!(pkt[4], 3);
    assert_eq!(&pkt[5..8], &[0x02, 0x01, 0x06]);
    assert_eq!(pkt.len(), 4 + 32);
}

#[test]
fn event_parsing_honors_the_length_field() {
    assert!(HciEvent::parse(&[EVT_CMD_COMPLETE]).is_none());
    assert!(HciEvent::parse(&[EVT_CMD_COMPLETE, 4, 1, 0]).is_none());

    let event = HciEvent::parse(&[EVT_CMD_COMPLETE, 4, 1, 0x09, 0x10, 0x00]).unwrap();
    assert_eq!(event.event_code, EVT_CMD_COMPLETE);
    assert!(event.is_command_complete(opcode(OGF_INFO_PARAM, OCF_READ_BD_ADDR)));
    assert_eq!(event.status(), 0x00);
}

#[test]
fn le_connection_complete_parsing() {
    let mut params = vec![EVT_LE_CONN_COMPLETE, 0x00];
    params.extend_from_slice(&0x0040u16.to_le_bytes());
    params.push(0x01); // role: peripheral
    params.push(0x00); // peer address type
    params.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    params.extend_from_slice(&0x0010u16.to_le_bytes()); // interval
    params.extend_from_slice(&0x0000u16.to_le_bytes()); // latency
    params.extend_from_slice(&0x00C8u16.to_le_bytes()); // timeout
    params.push(0x00);

    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };
    let cc = LeConnectionComplete::parse(&event).unwrap();
    assert_eq!(cc.status, 0);
    assert_eq!(cc.handle, 0x0040);
    assert_eq!(cc.role, 0x01);
    assert_eq!(cc.peer_addr, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    // Wrong subevent code.
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: vec![EVT_LE_ADVERTISING_REPORT; 19],
    };
    assert!(LeConnectionComplete::parse(&event).is_none());
}

#[test]
fn disconnection_complete_parsing() {
    let event = HciEvent {
        event_code: EVT_DISCONN_COMPLETE,
        parameters: vec![0x00, 0x40, 0x00, 0x13],
    };
    let dc = DisconnectionComplete::parse(&event).unwrap();
    assert_eq!(dc.handle, 0x0040);
    assert_eq!(dc.reason, 0x13);

    let short = HciEvent {
        event_code: EVT_DISCONN_COMPLETE,
        parameters: vec![0x00],
    };
    assert!(DisconnectionComplete::parse(&short).is_none());
}

#[test]
fn advertising_report_parsing() {
    let mut params = vec![EVT_LE_ADVERTISING_REPORT, 1]; // subevent, num reports
    params.push(0x00); // ADV_IND
    params.push(0x01); // random address
    params.extend_from_slice(&[0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]);
    params.push(3); // data length
    params.extend_from_slice(&[0x02, 0x01, 0x06]);
    params.push(0xC0); // rssi: -64

    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };
    let report = LeAdvertisingReport::parse(&event).unwrap();
    assert_eq!(report.addr, [0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]);
    assert_eq!(report.data, vec![0x02, 0x01, 0x06]);
    assert_eq!(report.rssi, -64);
    assert!(report.connectable());
}
