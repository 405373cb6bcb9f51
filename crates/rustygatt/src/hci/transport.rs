//! The controller transport: HCI commands out, events and ACL data in.
//!
//! [`Hci`] drives a Linux controller through [`HciSocket`]. Accepted
//! connections surface as [`L2capConn`] endpoints carrying ATT PDUs; the
//! [`Transport`] trait is the seam the device facade talks through, so a
//! test double can stand in for real hardware.

use super::constants::*;
use super::packet::*;
use super::socket::HciSocket;
use crate::att::constants::ATT_CID;
use crate::error::{HciError, HciResult};
use crate::l2cap::{L2capConn, L2capFrame};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Largest ACL data fragment we hand the controller.
const ACL_FRAGMENT_LEN: usize = 27;

/// How long a ping may wait for the controller to answer.
const PING_DEADLINE: Duration = Duration::from_secs(5);

/// Platform data describing a peer, delivered with every callback.
#[derive(Debug, Clone, Default)]
pub struct PlatData {
    pub addr: [u8; 6],
    pub addr_type: u8,
    pub name: String,
    pub rssi: i8,
    /// Raw advertising payload, when seen via scanning.
    pub adv_data: Vec<u8>,
    pub connectable: bool,
    pub conn_handle: Option<u16>,
}

/// Callbacks fired by the transport's event loop.
pub struct TransportCallbacks {
    /// A remote central connected; we are the peripheral (server) side.
    pub accept_master: Box<dyn Fn(PlatData, Arc<dyn L2capConn>) + Send + Sync>,
    /// A connection we initiated completed; we are the central side.
    pub accept_slave: Box<dyn Fn(PlatData, Arc<dyn L2capConn>) + Send + Sync>,
    /// An advertisement was received while scanning.
    pub advertisement: Box<dyn Fn(PlatData) + Send + Sync>,
}

impl Default for TransportCallbacks {
    fn default() -> Self {
        TransportCallbacks {
            accept_master: Box::new(|_, _| {}),
            accept_slave: Box::new(|_, _| {}),
            advertisement: Box::new(|_| {}),
        }
    }
}

/// Commands the device facade needs from a controller.
pub trait Transport: Send + Sync {
    fn set_advertising_parameters(&self, min: u16, max: u16, channel_map: u8) -> HciResult<()>;
    fn set_advertising_data(&self, len: u8, data: [u8; 31]) -> HciResult<()>;
    fn set_scan_response_packet(&self, len: u8, data: [u8; 31]) -> HciResult<()>;
    fn set_advertise_enable(&self, enable: bool) -> HciResult<()>;
    fn set_scan_enable(&self, enable: bool, filter_duplicates: bool) -> HciResult<()>;
    fn connect(&self, pd: &PlatData) -> HciResult<()>;
    fn cancel_connection(&self, pd: &PlatData) -> HciResult<()>;
    fn ping(&self) -> HciResult<()>;
    fn close(&self) -> HciResult<()>;
}

struct ConnState {
    tx: Sender<Vec<u8>>,
    /// Partially reassembled L2CAP frame.
    buf: Vec<u8>,
}

/// A live Linux HCI controller.
pub struct Hci {
    socket: Arc<HciSocket>,
    conns: Arc<Mutex<HashMap<u16, ConnState>>>,
    pong_rx: Mutex<Receiver<()>>,
    closed: Arc<AtomicBool>,
}

impl Hci {
    /// Opens device `dev_id`, resets the controller, and starts the event
    /// loop delivering `callbacks`.
    pub fn new(dev_id: u16, callbacks: TransportCallbacks) -> HciResult<Self> {
        let socket = Arc::new(HciSocket::open(dev_id)?);
        socket.send_command(&HciCommand::Reset)?;
        socket.send_command(&HciCommand::SetEventMask {
            event_mask: 0x2000_8000_0020_1010,
        })?;

        let (pong_tx, pong_rx) = channel();
        let conns: Arc<Mutex<HashMap<u16, ConnState>>> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        {
            let socket = socket.clone();
            let conns = conns.clone();
            let closed = closed.clone();
            thread::spawn(move || event_loop(socket, conns, callbacks, pong_tx, closed));
        }

        Ok(Hci {
            socket,
            conns,
            pong_rx: Mutex::new(pong_rx),
            closed,
        })
    }

    fn check_open(&self) -> HciResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HciError::Closed);
        }
        Ok(())
    }
}

impl Transport for Hci {
    fn set_advertising_parameters(&self, min: u16, max: u16, channel_map: u8) -> HciResult<()> {
        self.check_open()?;
        self.socket.send_command(&HciCommand::LeSetAdvertisingParameters {
            min_interval: min,
            max_interval: max,
            channel_map,
        })
    }

    fn set_advertising_data(&self, len: u8, data: [u8; 31]) -> HciResult<()> {
        self.check_open()?;
        self.socket
            .send_command(&HciCommand::LeSetAdvertisingData { len, data })
    }

    fn set_scan_response_packet(&self, len: u8, data: [u8; 31]) -> HciResult<()> {
        self.check_open()?;
        self.socket
            .send_command(&HciCommand::LeSetScanResponseData { len, data })
    }

    fn set_advertise_enable(&self, enable: bool) -> HciResult<()> {
        self.check_open()?;
        self.socket
            .send_command(&HciCommand::LeSetAdvertiseEnable { enable })
    }

    fn set_scan_enable(&self, enable: bool, filter_duplicates: bool) -> HciResult<()> {
        self.check_open()?;
        if enable {
            self.socket.send_command(&HciCommand::LeSetScanParameters {
                scan_type: 0x01,
                scan_interval: 0x0010,
                scan_window: 0x0010,
                own_address_type: 0x00,
                filter_policy: 0x00,
            })?;
        }
        self.socket.send_command(&HciCommand::LeSetScanEnable {
            enable,
            filter_duplicates,
        })
    }

    fn connect(&self, pd: &PlatData) -> HciResult<()> {
        self.check_open()?;
        self.socket.send_command(&HciCommand::LeCreateConnection {
            peer_addr: pd.addr,
            peer_addr_type: pd.addr_type,
        })
    }

    fn cancel_connection(&self, pd: &PlatData) -> HciResult<()> {
        self.check_open()?;
        if let Some(handle) = pd.conn_handle {
            self.socket.send_command(&HciCommand::Disconnect {
                handle,
                reason: 0x13,
            })
        } else {
            self.socket.send_command(&HciCommand::LeCreateConnectionCancel)
        }
    }

    /// Sends a harmless command and waits for the controller to answer.
    fn ping(&self) -> HciResult<()> {
        self.check_open()?;
        let pong_rx = self.pong_rx.lock().unwrap();
        while pong_rx.try_recv().is_ok() {} // discard stale pongs
        self.socket.send_command(&HciCommand::ReadBdAddr)?;
        pong_rx
            .recv_timeout(PING_DEADLINE)
            .map_err(|_| HciError::ControllerTimeout)
    }

    fn close(&self) -> HciResult<()> {
        self.closed.store(true, Ordering::Release);
        self.conns.lock().unwrap().clear();
        self.socket.shutdown();
        Ok(())
    }
}

fn event_loop(
    socket: Arc<HciSocket>,
    conns: Arc<Mutex<HashMap<u16, ConnState>>>,
    callbacks: TransportCallbacks,
    pong_tx: Sender<()>,
    closed: Arc<AtomicBool>,
) {
    let callbacks = Arc::new(callbacks);
    while !closed.load(Ordering::Acquire) {
        let packet = match socket.read_packet() {
            Ok(p) if p.is_empty() => break,
            Ok(p) => p,
            Err(e) => {
                if !closed.load(Ordering::Acquire) {
                    warn!("hci read failed: {}", e);
                }
                break;
            }
        };
        match packet[0] {
            HCI_EVENT_PKT => {
                let event = match HciEvent::parse(&packet[1..]) {
                    Some(e) => e,
                    None => {
                        warn!("malformed hci event dropped");
                        continue;
                    }
                };
                handle_event(&event, &socket, &conns, &callbacks, &pong_tx);
            }
            HCI_ACLDATA_PKT => handle_acl(&packet[1..], &conns),
            other => trace!("ignoring hci packet type 0x{:02x}", other),
        }
    }
    // Dropping the senders EOFs every connection endpoint.
    conns.lock().unwrap().clear();
    debug!("hci event loop exited");
}

fn handle_event(
    event: &HciEvent,
    socket: &Arc<HciSocket>,
    conns: &Arc<Mutex<HashMap<u16, ConnState>>>,
    callbacks: &Arc<TransportCallbacks>,
    pong_tx: &Sender<()>,
) {
    match event.event_code {
        EVT_CMD_COMPLETE => {
            if event.is_command_complete(opcode(OGF_INFO_PARAM, OCF_READ_BD_ADDR)) {
                let _ = pong_tx.send(());
            }
        }
        EVT_LE_META_EVENT => {
            if let Some(cc) = LeConnectionComplete::parse(event) {
                if cc.status != 0 {
                    debug!("connection failed, status 0x{:02x}", cc.status);
                    return;
                }
                let (tx, rx) = channel();
                conns.lock().unwrap().insert(
                    cc.handle,
                    ConnState {
                        tx,
                        buf: Vec::new(),
                    },
                );
                let conn: Arc<dyn L2capConn> = Arc::new(AclConn {
                    handle: cc.handle,
                    socket: socket.clone(),
                    rx: Mutex::new(rx),
                });
                let pd = PlatData {
                    addr: cc.peer_addr,
                    addr_type: cc.peer_addr_type,
                    conn_handle: Some(cc.handle),
                    ..PlatData::default()
                };
                debug!("connection 0x{:04x} up, role 0x{:02x}", cc.handle, cc.role);
                let callbacks = callbacks.clone();
                // Handlers run the connection loop; keep the event loop free.
                thread::spawn(move || {
                    if cc.role == 0x01 {
                        (callbacks.accept_master)(pd, conn);
                    } else {
                        (callbacks.accept_slave)(pd, conn);
                    }
                });
            } else if let Some(report) = LeAdvertisingReport::parse(event) {
                let pd = PlatData {
                    addr: report.addr,
                    addr_type: report.addr_type,
                    rssi: report.rssi,
                    connectable: report.connectable(),
                    adv_data: report.data.clone(),
                    ..PlatData::default()
                };
                (callbacks.advertisement)(pd);
            }
        }
        EVT_DISCONN_COMPLETE => {
            if let Some(dc) = DisconnectionComplete::parse(event) {
                debug!("connection 0x{:04x} down, reason 0x{:02x}", dc.handle, dc.reason);
                conns.lock().unwrap().remove(&dc.handle);
            }
        }
        _ => {}
    }
}

/// Reassembles ACL fragments into L2CAP frames and feeds ATT payloads to
/// the owning connection endpoint.
fn handle_acl(data: &[u8], conns: &Arc<Mutex<HashMap<u16, ConnState>>>) {
    if data.len() < 4 {
        return;
    }
    let raw_handle = u16::from_le_bytes([data[0], data[1]]);
    let handle = raw_handle & 0x0FFF;
    let pb_flag = (raw_handle >> 12) & 0x03;
    let payload = &data[4..];

    let mut conns = conns.lock().unwrap();
    let state = match conns.get_mut(&handle) {
        Some(s) => s,
        None => return,
    };
    if pb_flag == 0x01 {
        state.buf.extend_from_slice(payload);
    } else {
        state.buf = payload.to_vec();
    }
    if let Some(frame) = L2capFrame::parse(&state.buf) {
        state.buf.clear();
        if frame.cid == ATT_CID {
            let _ = state.tx.send(frame.payload);
        } else {
            trace!("dropping l2cap frame on cid 0x{:04x}", frame.cid);
        }
    }
}

/// An accepted connection's ATT endpoint over ACL data packets.
struct AclConn {
    handle: u16,
    socket: Arc<HciSocket>,
    rx: Mutex<Receiver<Vec<u8>>>,
}

impl L2capConn for AclConn {
    fn read_pdu(&self) -> io::Result<Vec<u8>> {
        match self.rx.lock().unwrap().recv() {
            Ok(pdu) => Ok(pdu),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn write_pdu(&self, pdu: &[u8]) -> io::Result<usize> {
        let frame = L2capFrame::new(ATT_CID, pdu.to_vec()).serialize();
        let mut first = true;
        for chunk in frame.chunks(ACL_FRAGMENT_LEN) {
            let flags = if first { 0x00 } else { 0x01 };
            let mut packet = vec![HCI_ACLDATA_PKT];
            packet.extend_from_slice(&(self.handle | (flags << 12)).to_le_bytes());
            packet.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
            packet.extend_from_slice(chunk);
            self.socket
                .send_raw(&packet)
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
            first = false;
        }
        Ok(pdu.len())
    }

    fn close(&self) {
        let _ = self.socket.send_command(&HciCommand::Disconnect {
            handle: self.handle,
            reason: 0x13,
        });
    }
}
