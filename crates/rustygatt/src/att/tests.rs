//! Unit tests for the ATT codec, database, and server state machine.

use super::constants::*;
use super::db::AttrDb;
use super::error::AttErrorCode;
use super::pdu::*;
use super::server::{AttServer, AttServerConfig};
use crate::gatt::handler::{Notifier, Request, STATUS_SUCCESS};
use crate::gatt::types::{Property, Service};
use crate::l2cap::{loopback, L2capConn, LoopbackConn};
use crate::uuid::Uuid;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn assert_involution<P: AttPdu + PartialEq + std::fmt::Debug>(pdu: P) {
    let bytes = pdu.serialize();
    assert_eq!(P::parse(&bytes).unwrap(), pdu);
}

#[test]
fn pdu_codec_is_an_involution() {
    assert_involution(ErrorResponse {
        request_opcode: ATT_READ_REQ,
        handle: 0x0102,
        ecode: AttErrorCode::AttributeNotFound,
    });
    assert_involution(ExchangeMtuRequest { client_mtu: 517 });
    assert_involution(ExchangeMtuResponse { server_mtu: 23 });
    assert_involution(FindInformationRequest {
        start_handle: 1,
        end_handle: 0xFFFF,
    });
    assert_involution(FindInformationResponse {
        pairs: vec![(1, Uuid::from_u16(0x2800)), (2, Uuid::from_u16(0x2803))],
    });
    assert_involution(FindInformationResponse {
        pairs: vec![(9, "f000aa00-0451-4000-b000-000000000000".parse().unwrap())],
    });
    assert_involution(FindByTypeValueRequest {
        start_handle: 1,
        end_handle: 0xFFFF,
        attribute_type: 0x2800,
        value: vec![0x00, 0x18],
    });
    assert_involution(FindByTypeValueResponse {
        handles: vec![(1, 3), (4, 9)],
    });
    assert_involution(ReadByTypeRequest {
        start_handle: 1,
        end_handle: 3,
        attribute_type: Uuid::from_u16(0x2803),
    });
    assert_involution(ReadByTypeResponse {
        element_len: 7,
        elements: vec![(2, vec![0x02, 0x03, 0x00, 0x00, 0x2A])],
    });
    assert_involution(ReadRequest { handle: 3 });
    assert_involution(ReadResponse {
        value: b"gopher".to_vec(),
    });
    assert_involution(ReadBlobRequest {
        handle: 3,
        offset: 2,
    });
    assert_involution(ReadBlobResponse {
        value: b"pher".to_vec(),
    });
    assert_involution(ReadByGroupTypeRequest {
        start_handle: 1,
        end_handle: 0xFFFF,
        group_type: Uuid::from_u16(0x2800),
    });
    assert_involution(ReadByGroupTypeResponse {
        element_len: 6,
        elements: vec![GroupElement {
            handle: 1,
            end_handle: 3,
            value: vec![0x00, 0x18],
        }],
    });
    assert_involution(WriteRequest {
        handle: 4,
        value: vec![0x01, 0x00],
    });
    assert_involution(WriteResponse);
    assert_involution(WriteCommand {
        handle: 4,
        value: vec![0xAB],
    });
    assert_involution(HandleValueNotification {
        handle: 3,
        value: b"ping".to_vec(),
    });
}

#[test]
fn pdu_parse_rejects_short_buffers() {
    assert!(ErrorResponse::parse(&[ATT_ERROR_RSP, 0x0A]).is_err());
    assert!(ExchangeMtuRequest::parse(&[ATT_EXCHANGE_MTU_REQ, 23]).is_err());
    assert!(ReadRequest::parse(&[ATT_READ_REQ]).is_err());
    assert!(ReadByTypeRequest::parse(&[ATT_READ_BY_TYPE_REQ, 1, 0, 3, 0]).is_err());
    // UUID must be exactly 2 or 16 bytes.
    assert!(ReadByTypeRequest::parse(&[ATT_READ_BY_TYPE_REQ, 1, 0, 3, 0, 0x00, 0x28, 0xFF]).is_err());
    assert!(HandleValueNotification::parse(&[ATT_HANDLE_VALUE_NTF, 3]).is_err());
}

/// The database from the end-to-end scenarios: one service 0x1800 holding
/// one readable characteristic 0x2A00 with the static value "gopher".
fn gopher_db() -> AttrDb {
    let mut svc = Service::new(Uuid::from_u16(0x1800));
    svc.add_characteristic(Uuid::from_u16(0x2A00))
        .set_value(b"gopher");
    AttrDb::new(vec![svc])
}

#[test]
fn handles_are_contiguous_and_groups_are_patched() {
    let mut svc1 = Service::new(Uuid::from_u16(0x1800));
    svc1.add_characteristic(Uuid::from_u16(0x2A00))
        .set_value(b"gopher");
    let mut svc2 = Service::new(Uuid::from_u16(0x180F));
    {
        let c = svc2.add_characteristic(Uuid::from_u16(0x2A19));
        c.set_value(&[100]);
        c.handle_notify_fn(|_req, _n| {});
    }
    svc2.add_characteristic(Uuid::from_u16(0x2A1A)).set_value(&[1]);

    let db = AttrDb::new(vec![svc1, svc2]);
    assert_eq!(db.len(), 9);
    for (i, attr) in db.range(1, 0xFFFF).enumerate() {
        assert_eq!(attr.handle, i as u16 + 1);
    }
    let svcs = db.services();
    assert_eq!(svcs[0].handle(), 1);
    assert_eq!(svcs[0].end_handle(), 3);
    assert_eq!(svcs[1].handle(), 4);
    // svc2: decl 5, value 6, cccd 7, decl 8, value 9.
    assert_eq!(svcs[1].end_handle(), 9);
    assert_eq!(svcs[1].characteristics()[0].end_handle, 7);
    assert_eq!(svcs[1].characteristics()[1].end_handle, 9);
    // Every attribute's group end matches its service.
    for attr in db.range(1, 3) {
        assert_eq!(attr.group_end, 3);
    }
    for attr in db.range(4, 9) {
        assert_eq!(attr.group_end, 9);
    }
}

#[test]
fn declaration_value_embeds_props_handle_uuid() {
    let db = gopher_db();
    let decl = db.by_handle(2).unwrap();
    assert_eq!(decl.typ, 0x2803u16);
    assert_eq!(decl.value[0], Property::READ.0);
    assert_eq!(u16::from_le_bytes([decl.value[1], decl.value[2]]), 3);
    assert_eq!(Uuid::from_wire(&decl.value[3..]).unwrap(), 0x2A00u16);

    let value = db.by_handle(3).unwrap();
    assert_eq!(value.typ, 0x2A00u16);
    assert_eq!(value.value, b"gopher");
}

#[test]
fn preamble_prepends_gap_and_gatt_services() {
    let db = AttrDb::with_preamble("cricket", vec![Service::new(Uuid::from_u16(0xFFF0))]);
    let gap = db.by_handle(1).unwrap();
    assert_eq!(gap.typ, 0x2800u16);
    assert_eq!(gap.value, vec![0x00, 0x18]);
    // Device name characteristic value.
    let name = db.by_handle(3).unwrap();
    assert_eq!(name.typ, 0x2A00u16);
    assert_eq!(name.value, b"cricket");
}

/// Starts an ATT server over a loopback endpoint; returns the peer end.
fn start_server(db: AttrDb) -> LoopbackConn {
    let (server_end, client_end) = loopback();
    let server = AttServer::new(
        Arc::new(db),
        Arc::new(server_end),
        [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        AttServerConfig::default(),
    );
    thread::spawn(move || server.serve());
    client_end
}

fn round_trip(conn: &LoopbackConn, req: &[u8]) -> Vec<u8> {
    conn.write_pdu(req).unwrap();
    conn.read_pdu().unwrap()
}

#[test]
fn read_by_group_type_returns_the_expected_bytes() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(
        &conn,
        &ReadByGroupTypeRequest {
            start_handle: 0x0001,
            end_handle: 0xFFFF,
            group_type: Uuid::from_u16(0x2800),
        }
        .serialize(),
    );
    assert_eq!(
        rsp,
        vec![0x11, 6, 0x01, 0x00, 0x03, 0x00, 0x00, 0x18]
    );
}

#[test]
fn read_by_type_returns_the_expected_bytes() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(
        &conn,
        &ReadByTypeRequest {
            start_handle: 0x0001,
            end_handle: 0x0003,
            attribute_type: Uuid::from_u16(0x2803),
        }
        .serialize(),
    );
    assert_eq!(
        rsp,
        vec![0x09, 7, 0x02, 0x00, 0x02, 0x03, 0x00, 0x00, 0x2A]
    );
}

#[test]
fn read_returns_the_stored_value() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(&conn, &ReadRequest { handle: 3 }.serialize());
    assert_eq!(rsp[0], 0x0B);
    assert_eq!(&rsp[1..], b"gopher");
}

#[test]
fn find_information_lists_every_attribute_type() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(
        &conn,
        &FindInformationRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
        }
        .serialize(),
    );
    let rsp = FindInformationResponse::parse(&rsp).unwrap();
    assert_eq!(
        rsp.pairs,
        vec![
            (1, Uuid::from_u16(0x2800)),
            (2, Uuid::from_u16(0x2803)),
            (3, Uuid::from_u16(0x2A00)),
        ]
    );
}

#[test]
fn find_by_type_value_maps_service_groups() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(
        &conn,
        &FindByTypeValueRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            attribute_type: 0x2800,
            value: vec![0x00, 0x18],
        }
        .serialize(),
    );
    let rsp = FindByTypeValueResponse::parse(&rsp).unwrap();
    assert_eq!(rsp.handles, vec![(1, 3)]);
}

#[test]
fn mtu_floor_is_twenty_three() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(&conn, &ExchangeMtuRequest { client_mtu: 9 }.serialize());
    let rsp = ExchangeMtuResponse::parse(&rsp).unwrap();
    assert_eq!(rsp.server_mtu, ATT_MAX_MTU);

    // The effective MTU is floored at 23: a 30-byte value reads back
    // truncated to mtu - 1 = 22 bytes.
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    svc.add_characteristic(Uuid::from_u16(0xFFF1))
        .set_value(&[0xAA; 30]);
    let conn = start_server(AttrDb::new(vec![svc]));
    let _ = round_trip(&conn, &ExchangeMtuRequest { client_mtu: 9 }.serialize());
    let rsp = round_trip(&conn, &ReadRequest { handle: 3 }.serialize());
    assert_eq!(rsp.len(), 23);
    assert_eq!(&rsp[1..], &[0xAA; 22][..]);
}

#[test]
fn every_response_fits_the_default_mtu() {
    let mut svcs = Vec::new();
    for i in 0..8u16 {
        let mut svc = Service::new(Uuid::from_u16(0xFF00 + i));
        svc.add_characteristic(Uuid::from_u16(0xFE00 + i))
            .set_value(&[i as u8; 20]);
        svcs.push(svc);
    }
    let conn = start_server(AttrDb::new(svcs));
    for req in [
        ReadByGroupTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            group_type: Uuid::from_u16(0x2800),
        }
        .serialize(),
        FindInformationRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
        }
        .serialize(),
        ReadByTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            attribute_type: Uuid::from_u16(0x2803),
        }
        .serialize(),
    ] {
        let rsp = round_trip(&conn, &req);
        assert!(rsp.len() <= ATT_DEFAULT_MTU as usize, "{} > mtu", rsp.len());
    }
}

#[test]
fn group_elements_are_homogeneous() {
    // A 128-bit service after two 16-bit ones must not join their batch.
    let long_uuid: Uuid = "f000aa00-0451-4000-b000-000000000000".parse().unwrap();
    let svcs = vec![
        Service::new(Uuid::from_u16(0x1800)),
        Service::new(Uuid::from_u16(0x180F)),
        Service::new(long_uuid),
    ];
    let conn = start_server(AttrDb::new(svcs));
    let rsp = round_trip(
        &conn,
        &ReadByGroupTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            group_type: Uuid::from_u16(0x2800),
        }
        .serialize(),
    );
    let rsp = ReadByGroupTypeResponse::parse(&rsp).unwrap();
    assert_eq!(rsp.element_len, 6);
    assert_eq!(rsp.elements.len(), 2);

    // The client resumes after the last group and gets the long one.
    let conn2 = conn;
    let rsp = round_trip(
        &conn2,
        &ReadByGroupTypeRequest {
            start_handle: 3,
            end_handle: 0xFFFF,
            group_type: Uuid::from_u16(0x2800),
        }
        .serialize(),
    );
    let rsp = ReadByGroupTypeResponse::parse(&rsp).unwrap();
    assert_eq!(rsp.element_len, 20);
    assert_eq!(rsp.elements.len(), 1);
}

#[test]
fn errors_map_to_error_responses() {
    let conn = start_server(gopher_db());

    // Read of a missing handle.
    let rsp = round_trip(&conn, &ReadRequest { handle: 42 }.serialize());
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.request_opcode, ATT_READ_REQ);
    assert_eq!(err.handle, 42);
    assert_eq!(err.ecode, AttErrorCode::InvalidHandle);

    // Write to a read-only attribute.
    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 3,
            value: vec![1],
        }
        .serialize(),
    );
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.ecode, AttErrorCode::WriteNotPermitted);

    // Blob read past the end of the value.
    let rsp = round_trip(
        &conn,
        &ReadBlobRequest {
            handle: 3,
            offset: 7,
        }
        .serialize(),
    );
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.ecode, AttErrorCode::InvalidOffset);

    // Grouping on anything but the primary service type.
    let rsp = round_trip(
        &conn,
        &ReadByGroupTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            group_type: Uuid::from_u16(0x2803),
        }
        .serialize(),
    );
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.ecode, AttErrorCode::UnsupportedGroupType);

    // Range with no matches.
    let rsp = round_trip(
        &conn,
        &ReadByTypeRequest {
            start_handle: 1,
            end_handle: 3,
            attribute_type: Uuid::from_u16(0x2902),
        }
        .serialize(),
    );
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.ecode, AttErrorCode::AttributeNotFound);

    // Unknown request opcode.
    let rsp = round_trip(&conn, &[0x7F, 0x00]);
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.request_opcode, 0x7F);
    assert_eq!(err.ecode, AttErrorCode::RequestNotSupported);
}

#[test]
fn blob_read_honors_the_offset() {
    let conn = start_server(gopher_db());
    let rsp = round_trip(
        &conn,
        &ReadBlobRequest {
            handle: 3,
            offset: 2,
        }
        .serialize(),
    );
    assert_eq!(rsp[0], 0x0D);
    assert_eq!(&rsp[1..], b"pher");
}

#[test]
fn read_handler_is_invoked_with_the_request_context() {
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    svc.add_characteristic(Uuid::from_u16(0xFFF1))
        .handle_read_fn(|resp, req| {
            assert_eq!(req.request.characteristic.uuid, 0xFFF1u16);
            assert_eq!(req.cap, 22);
            resp.write(b"dynamic").unwrap();
        });
    let conn = start_server(AttrDb::new(vec![svc]));
    let rsp = round_trip(&conn, &ReadRequest { handle: 3 }.serialize());
    assert_eq!(&rsp[1..], b"dynamic");
}

#[test]
fn write_handler_status_maps_to_att_errors() {
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    {
        let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
        c.handle_write_fn(|_req, data| {
            if data == b"bad" {
                crate::gatt::STATUS_UNEXPECTED_ERROR
            } else {
                STATUS_SUCCESS
            }
        });
    }
    let conn = start_server(AttrDb::new(vec![svc]));

    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 3,
            value: b"ok".to_vec(),
        }
        .serialize(),
    );
    assert_eq!(rsp, vec![0x13]);

    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 3,
            value: b"bad".to_vec(),
        }
        .serialize(),
    );
    let err = ErrorResponse::parse(&rsp).unwrap();
    assert_eq!(err.ecode, AttErrorCode::Unlikely);
}

#[test]
fn cccd_write_starts_and_stops_the_notify_producer() {
    let (done_tx, done_rx) = channel();
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    {
        let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
        c.handle_notify_fn(move |_req: &Request, n: Notifier| {
            assert_eq!(n.cap(), 20);
            n.write(b"ping").unwrap();
            while !n.done() {
                thread::sleep(Duration::from_millis(5));
            }
            done_tx.send(()).unwrap();
        });
    }
    // svc 1, decl 2, value 3, cccd 4.
    let conn = start_server(AttrDb::new(vec![svc]));

    // Subscribing acks the write, then the first notification arrives.
    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 4,
            value: vec![0x01, 0x00],
        }
        .serialize(),
    );
    assert_eq!(rsp, vec![0x13]);
    let ntf = conn.read_pdu().unwrap();
    assert_eq!(ntf, HandleValueNotification {
        handle: 3,
        value: b"ping".to_vec(),
    }
    .serialize());

    // The CCCD reads back as 0x0001 for this connection.
    let rsp = round_trip(&conn, &ReadRequest { handle: 4 }.serialize());
    assert_eq!(rsp, vec![0x0B, 0x01, 0x00]);

    // Clearing the bits flips done() within a round trip.
    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 4,
            value: vec![0x00, 0x00],
        }
        .serialize(),
    );
    assert_eq!(rsp, vec![0x13]);
    done_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("producer observed done()");
}

#[test]
fn disconnect_terminates_the_producer() {
    let (done_tx, done_rx) = channel();
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    {
        let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
        c.handle_notify_fn(move |_req: &Request, n: Notifier| {
            while !n.done() {
                if n.write(b"tick").is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
            let _ = done_tx.send(());
        });
    }
    let conn = start_server(AttrDb::new(vec![svc]));
    let rsp = round_trip(
        &conn,
        &WriteRequest {
            handle: 4,
            value: vec![0x01, 0x00],
        }
        .serialize(),
    );
    assert_eq!(rsp, vec![0x13]);
    let _ = conn.read_pdu().unwrap();

    conn.close();
    done_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("producer exited after disconnect");
}
