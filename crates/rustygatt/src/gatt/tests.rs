//! Unit tests for the GATT object model and the central-side client,
//! exercised end-to-end against a real ATT server over a loopback
//! endpoint.

use crate::att::db::AttrDb;
use crate::att::server::{AttServer, AttServerConfig};
use crate::att::AttClient;
use crate::gatt::client::Peripheral;
use crate::gatt::handler::{Notifier, Request, ResponseWriter};
use crate::gatt::types::{Property, Service};
use crate::l2cap::{loopback, L2capConn};
use crate::uuid::Uuid;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn gopher_db() -> AttrDb {
    let mut svc = Service::new(Uuid::from_u16(0x1800));
    svc.add_characteristic(Uuid::from_u16(0x2A00))
        .set_value(b"gopher");
    AttrDb::new(vec![svc])
}

/// A service with a notifying characteristic that echoes written values
/// back as notifications.
fn echo_db() -> AttrDb {
    let (tx, rx) = channel::<Vec<u8>>();
    let rx = std::sync::Mutex::new(rx);
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    {
        let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
        c.handle_write_fn(move |_req: &Request, data: &[u8]| {
            tx.send(data.to_vec()).ok();
            crate::gatt::STATUS_SUCCESS
        });
        c.handle_notify_fn(move |_req: &Request, n: Notifier| {
            while !n.done() {
                match rx.lock().unwrap().recv_timeout(Duration::from_millis(20)) {
                    Ok(v) => {
                        if n.write(&v).is_err() {
                            break;
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(_) => break,
                }
            }
        });
    }
    AttrDb::new(vec![svc])
}

/// Serves `db` over a loopback pair and returns a connected peripheral.
fn connect(db: AttrDb) -> Peripheral {
    let (server_end, client_end) = loopback();
    let server = AttServer::new(
        Arc::new(db),
        Arc::new(server_end),
        [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        AttServerConfig::default(),
    );
    thread::spawn(move || server.serve());
    let att = AttClient::new(Arc::new(client_end));
    Peripheral::new(att, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], "emu".into())
}

#[test]
fn discovery_and_read_against_an_emulated_peer() {
    let mut p = connect(gopher_db());

    let services = p.discover_services(None).unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].uuid, 0x1800u16);
    assert_eq!(services[0].start_handle, 1);
    assert_eq!(services[0].end_handle, 3);

    let svc = services[0].clone();
    let chars = p.discover_characteristics(None, &svc).unwrap();
    assert_eq!(chars.len(), 1);
    assert_eq!(chars[0].uuid, 0x2A00u16);
    assert_eq!(chars[0].decl_handle, 2);
    assert_eq!(chars[0].value_handle, 3);
    assert_eq!(chars[0].end_handle, 3);
    assert!(chars[0].properties.can_read());

    assert_eq!(p.read_characteristic(&chars[0]).unwrap(), b"gopher");
}

#[test]
fn discovery_filters_by_uuid() {
    let mut svcs = Vec::new();
    for uuid in [0x1800u16, 0x180Fu16] {
        let mut svc = Service::new(Uuid::from_u16(uuid));
        svc.add_characteristic(Uuid::from_u16(uuid - 0x100)).set_value(&[0]);
        svcs.push(svc);
    }
    let mut p = connect(AttrDb::new(svcs));

    let all = p.discover_services(None).unwrap();
    assert_eq!(all.len(), 2);

    let only = p
        .discover_services(Some(&[Uuid::from_u16(0x180F)]))
        .unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].uuid, 0x180Fu16);
}

#[test]
fn descriptor_discovery_finds_the_cccd() {
    let mut p = connect(echo_db());
    let services = p.discover_services(None).unwrap();
    let svc = services[0].clone();
    let mut chars = p.discover_characteristics(None, &svc).unwrap();
    assert_eq!(chars.len(), 1);

    let descs = p.discover_descriptors(&mut chars[0]).unwrap();
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].uuid, 0x2902u16);
    assert_eq!(chars[0].cccd_handle, Some(descs[0].handle));

    // The CCCD starts out cleared.
    assert_eq!(p.read_descriptor(&descs[0]).unwrap(), vec![0x00, 0x00]);
}

#[test]
fn subscribe_receives_notifications_in_order() {
    let mut p = connect(echo_db());
    let services = p.discover_services(None).unwrap();
    let svc = services[0].clone();
    let mut chars = p.discover_characteristics(None, &svc).unwrap();
    p.discover_descriptors(&mut chars[0]).unwrap();
    let c = chars[0].clone();

    let (tx, rx) = channel();
    p.set_notify(
        &c,
        Some(Box::new(move |value: &[u8]| {
            tx.send(value.to_vec()).ok();
        })),
    )
    .unwrap();

    p.write_characteristic(&c, b"one", false).unwrap();
    p.write_characteristic(&c, b"two", false).unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), b"one");
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), b"two");

    // Disable; the subscription is gone after the write completes.
    p.set_notify(&c, None).unwrap();
    p.write_characteristic(&c, b"three", false).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn subscribe_without_cccd_is_rejected() {
    let mut p = connect(gopher_db());
    let services = p.discover_services(None).unwrap();
    let svc = services[0].clone();
    let chars = p.discover_characteristics(None, &svc).unwrap();
    let err = p
        .set_notify(&chars[0], Some(Box::new(|_| {})))
        .unwrap_err();
    assert!(matches!(err, crate::att::AttError::NoCccd));
}

#[test]
fn write_command_reaches_the_handler() {
    let mut p = connect(echo_db());
    let services = p.discover_services(None).unwrap();
    let svc = services[0].clone();
    let mut chars = p.discover_characteristics(None, &svc).unwrap();
    p.discover_descriptors(&mut chars[0]).unwrap();
    let c = chars[0].clone();

    let (tx, rx) = channel();
    p.set_notify(
        &c,
        Some(Box::new(move |value: &[u8]| {
            tx.send(value.to_vec()).ok();
        })),
    )
    .unwrap();

    // Write without response still lands and gets echoed back.
    p.write_characteristic(&c, b"silent", true).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), b"silent");
}

#[test]
fn mismatched_response_is_a_protocol_error() {
    let (peer_end, client_end) = loopback();
    let att = AttClient::new(Arc::new(client_end));

    // A bogus peer that answers a read with an MTU response.
    thread::spawn(move || {
        let req = peer_end.read_pdu().unwrap();
        assert_eq!(req[0], 0x0A);
        peer_end.write_pdu(&[0x03, 0x17, 0x00]).unwrap();
    });

    let err = att.read(3).unwrap_err();
    assert!(matches!(err, crate::att::AttError::UnexpectedResponse(0x03)));
}

#[test]
fn requests_fail_once_disconnected() {
    let (peer_end, client_end) = loopback();
    let att = AttClient::new(Arc::new(client_end));
    peer_end.close();
    drop(peer_end);
    let err = att.read(3).unwrap_err();
    assert!(matches!(
        err,
        crate::att::AttError::Disconnected | crate::att::AttError::Transport(_)
    ));
}

#[test]
#[should_panic(expected = "already contains a characteristic")]
fn duplicate_characteristic_uuid_panics() {
    let mut svc = Service::new(Uuid::from_u16(0x1800));
    svc.add_characteristic(Uuid::from_u16(0x2A00));
    svc.add_characteristic(Uuid::from_u16(0x2A00));
}

#[test]
fn handle_notify_attaches_a_single_cccd() {
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    {
        let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
        c.handle_notify_fn(|_req, _n| {});
        c.handle_notify_fn(|_req, _n| {});
        assert!(c.properties().can_notify());
        assert!(c.properties().can_indicate());
        assert_eq!(c.descriptors().len(), 1);
        assert_eq!(c.descriptors()[0].uuid(), 0x2902u16);
    }
}

#[test]
fn set_value_enables_read() {
    let mut svc = Service::new(Uuid::from_u16(0xFFF0));
    let c = svc.add_characteristic(Uuid::from_u16(0xFFF1));
    assert!(!c.properties().can_read());
    c.set_value(b"v");
    assert!(c.properties().can_read());
}

#[test]
fn response_writer_enforces_its_capacity() {
    let mut w = ResponseWriter::new(4);
    assert_eq!(w.write(b"ab").unwrap(), 2);
    assert!(w.write(b"cde").is_err());
    assert_eq!(w.write(b"cd").unwrap(), 2);
    assert_eq!(w.status(), crate::gatt::STATUS_SUCCESS);
    assert_eq!(w.into_bytes(), b"abcd");
}

#[test]
fn property_bits_match_the_declaration_byte() {
    let p = Property::READ | Property::NOTIFY;
    assert_eq!(p.0, 0x12);
    assert_eq!(p.to_string(), "read notify");
    assert!(Property::WRITE_NR.can_write());
}
