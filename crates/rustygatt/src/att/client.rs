//! The ATT client: one-outstanding-request engine over an L2CAP endpoint.
//!
//! A background reader drains the endpoint and splits inbound traffic into
//! responses, delivered to the caller blocked in [`AttClient::request`],
//! and notifications, routed to subscribers by characteristic value handle.

use super::constants::*;
use super::error::{AttError, AttResult};
use super::pdu::*;
use crate::l2cap::L2capConn;
use crate::uuid::Uuid;
use log::{trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long to wait for the peer to answer a request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked with each notification value for a subscribed handle.
pub type NotificationFn = Box<dyn FnMut(&[u8]) + Send>;

/// ATT protocol client for one connection.
pub struct AttClient {
    conn: Arc<dyn L2capConn>,
    mtu: Mutex<u16>,
    /// Held across send + receive so only one request is ever in flight.
    req_lock: Mutex<Receiver<Vec<u8>>>,
    subscribers: Arc<Mutex<HashMap<u16, NotificationFn>>>,
    closed: Arc<AtomicBool>,
    closed_rx: Mutex<Receiver<()>>,
}

impl AttClient {
    /// Wraps an endpoint and starts the background reader.
    pub fn new(conn: Arc<dyn L2capConn>) -> Arc<Self> {
        let (rsp_tx, rsp_rx) = channel();
        let (closed_tx, closed_rx) = channel();
        let client = Arc::new(AttClient {
            conn: conn.clone(),
            mtu: Mutex::new(ATT_DEFAULT_MTU),
            req_lock: Mutex::new(rsp_rx),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            closed_rx: Mutex::new(closed_rx),
        });

        let subscribers = client.subscribers.clone();
        let closed = client.closed.clone();
        thread::spawn(move || {
            reader_loop(conn, rsp_tx, subscribers);
            closed.store(true, Ordering::Release);
            drop(closed_tx);
        });
        client
    }

    /// Blocks until the connection is gone.
    pub fn wait_closed(&self) {
        let _ = self.closed_rx.lock().unwrap().recv();
    }

    /// Current connection MTU.
    pub fn mtu(&self) -> u16 {
        *self.mtu.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the endpoint; the reader exits and pending requests fail.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Registers a notification callback for a value handle. Must happen
    /// before the CCCD write enabling notifications, or the first value
    /// can be lost.
    pub fn subscribe(&self, value_handle: u16, f: NotificationFn) {
        self.subscribers.lock().unwrap().insert(value_handle, f);
    }

    pub fn unsubscribe(&self, value_handle: u16) {
        self.subscribers.lock().unwrap().remove(&value_handle);
    }

    /// Sends a request PDU and blocks for its response.
    fn request(&self, pdu: Vec<u8>) -> AttResult<Vec<u8>> {
        let req_opcode = pdu[0];
        let rsp_rx = self.req_lock.lock().unwrap();
        self.conn.write_pdu(&pdu)?;
        let rsp = match rsp_rx.recv_timeout(REQUEST_TIMEOUT) {
            Ok(rsp) => rsp,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => return Err(AttError::Timeout),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                return Err(AttError::Disconnected)
            }
        };
        if rsp.is_empty() {
            return Err(AttError::Disconnected);
        }
        if Some(rsp[0]) == rsp_opcode_for(req_opcode) {
            return Ok(rsp);
        }
        if rsp[0] == ATT_ERROR_RSP {
            let err = ErrorResponse::parse(&rsp)?;
            if err.request_opcode == req_opcode {
                return Err(AttError::Protocol(err.ecode, err.handle));
            }
        }
        warn!(
            "request 0x{:02x} got a mismatched response: 0x{:02x}",
            req_opcode, rsp[0]
        );
        Err(AttError::UnexpectedResponse(rsp[0]))
    }

    /// Sends a PDU that has no response.
    fn command(&self, pdu: Vec<u8>) -> AttResult<()> {
        self.conn.write_pdu(&pdu)?;
        Ok(())
    }

    /// Negotiates the MTU; returns the effective connection MTU.
    pub fn exchange_mtu(&self, client_mtu: u16) -> AttResult<u16> {
        let rsp = self.request(ExchangeMtuRequest { client_mtu }.serialize())?;
        let rsp = ExchangeMtuResponse::parse(&rsp)?;
        let mtu = client_mtu.min(rsp.server_mtu).max(ATT_DEFAULT_MTU);
        *self.mtu.lock().unwrap() = mtu;
        Ok(mtu)
    }

    pub fn find_information(&self, start: u16, end: u16) -> AttResult<Vec<(u16, Uuid)>> {
        let rsp = self.request(
            FindInformationRequest {
                start_handle: start,
                end_handle: end,
            }
            .serialize(),
        )?;
        Ok(FindInformationResponse::parse(&rsp)?.pairs)
    }

    pub fn find_by_type_value(
        &self,
        start: u16,
        end: u16,
        attribute_type: u16,
        value: &[u8],
    ) -> AttResult<Vec<(u16, u16)>> {
        let rsp = self.request(
            FindByTypeValueRequest {
                start_handle: start,
                end_handle: end,
                attribute_type,
                value: value.to_vec(),
            }
            .serialize(),
        )?;
        Ok(FindByTypeValueResponse::parse(&rsp)?.handles)
    }

    pub fn read_by_type(&self, start: u16, end: u16, typ: Uuid) -> AttResult<ReadByTypeResponse> {
        let rsp = self.request(
            ReadByTypeRequest {
                start_handle: start,
                end_handle: end,
                attribute_type: typ,
            }
            .serialize(),
        )?;
        ReadByTypeResponse::parse(&rsp)
    }

    pub fn read_by_group_type(
        &self,
        start: u16,
        end: u16,
        group_type: Uuid,
    ) -> AttResult<ReadByGroupTypeResponse> {
        let rsp = self.request(
            ReadByGroupTypeRequest {
                start_handle: start,
                end_handle: end,
                group_type,
            }
            .serialize(),
        )?;
        ReadByGroupTypeResponse::parse(&rsp)
    }

    pub fn read(&self, handle: u16) -> AttResult<Vec<u8>> {
        let rsp = self.request(ReadRequest { handle }.serialize())?;
        Ok(ReadResponse::parse(&rsp)?.value)
    }

    pub fn read_blob(&self, handle: u16, offset: u16) -> AttResult<Vec<u8>> {
        let rsp = self.request(ReadBlobRequest { handle, offset }.serialize())?;
        Ok(ReadBlobResponse::parse(&rsp)?.value)
    }

    pub fn write(&self, handle: u16, value: &[u8]) -> AttResult<()> {
        let rsp = self.request(
            WriteRequest {
                handle,
                value: value.to_vec(),
            }
            .serialize(),
        )?;
        WriteResponse::parse(&rsp)?;
        Ok(())
    }

    /// Write without response.
    pub fn write_command(&self, handle: u16, value: &[u8]) -> AttResult<()> {
        self.command(
            WriteCommand {
                handle,
                value: value.to_vec(),
            }
            .serialize(),
        )
    }
}

fn reader_loop(
    conn: Arc<dyn L2capConn>,
    rsp_tx: Sender<Vec<u8>>,
    subscribers: Arc<Mutex<HashMap<u16, NotificationFn>>>,
) {
    loop {
        let pdu = match conn.read_pdu() {
            Ok(pdu) if pdu.is_empty() => break,
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("att client read failed: {}", e);
                break;
            }
        };
        trace!("att client rx: opcode 0x{:02x}", pdu[0]);
        if pdu[0] == ATT_HANDLE_VALUE_NTF {
            match HandleValueNotification::parse(&pdu) {
                Ok(ntf) => {
                    let mut subs = subscribers.lock().unwrap();
                    match subs.get_mut(&ntf.handle) {
                        Some(f) => f(&ntf.value),
                        None => warn!("notification for unsubscribed handle 0x{:04x}", ntf.handle),
                    }
                }
                Err(_) => warn!("malformed notification dropped"),
            }
            continue;
        }
        if rsp_tx.send(pdu).is_err() {
            break;
        }
    }
    conn.close();
}
