//! The per-connection ATT server.
//!
//! One server instance runs per accepted central. It owns the connection's
//! L2CAP endpoint, the negotiated MTU, and the CCCD subscription state, and
//! it serializes everything written to the endpoint through a single writer
//! task so responses and notifications interleave only at PDU boundaries.

use super::constants::*;
use super::db::{AttrDb, Attribute};
use super::error::{AttError, AttErrorCode, AttResult};
use super::pdu::*;
use crate::gatt::handler::{
    Central, Notifier, ReadRequest as GattReadRequest, Request, ResponseWriter,
    STATUS_INVALID_OFFSET, STATUS_SUCCESS,
};
use crate::gatt::types::CharInfo;
use crate::l2cap::L2capConn;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

/// Outbound queue depth per connection. Notifiers block once this many
/// PDUs are waiting behind the writer.
const OUT_QUEUE_DEPTH: usize = 8;

/// Server-side configuration for a connection.
#[derive(Debug, Clone)]
pub struct AttServerConfig {
    /// Largest MTU the server will agree to during MTU exchange.
    pub mtu: u16,
}

impl Default for AttServerConfig {
    fn default() -> Self {
        Self { mtu: ATT_MAX_MTU }
    }
}

/// ATT server state for one connection.
pub struct AttServer {
    db: Arc<AttrDb>,
    conn: Arc<dyn L2capConn>,
    addr: [u8; 6],
    server_mtu: u16,
    mtu: u16,
    out: SyncSender<Vec<u8>>,
    out_rx: Option<Receiver<Vec<u8>>>,
    /// Subscription bits keyed by the characteristic value handle.
    cccd_bits: HashMap<u16, u16>,
    /// Done flags of running notify producers, keyed the same way.
    producers: HashMap<u16, Arc<AtomicBool>>,
}

impl AttServer {
    pub fn new(
        db: Arc<AttrDb>,
        conn: Arc<dyn L2capConn>,
        addr: [u8; 6],
        config: AttServerConfig,
    ) -> Self {
        let (out, out_rx) = sync_channel(OUT_QUEUE_DEPTH);
        AttServer {
            db,
            conn,
            addr,
            server_mtu: config.mtu.max(ATT_DEFAULT_MTU),
            mtu: ATT_DEFAULT_MTU,
            out,
            out_rx: Some(out_rx),
            cccd_bits: HashMap::new(),
            producers: HashMap::new(),
        }
    }

    /// Runs the connection until the central disconnects or the transport
    /// fails. Consumes the server; per-connection state dies with it.
    pub fn serve(mut self) {
        let writer_conn = self.conn.clone();
        let out_rx = self.out_rx.take().unwrap();
        let writer = thread::spawn(move || {
            while let Ok(pdu) = out_rx.recv() {
                trace!("att tx: opcode 0x{:02x}, {} bytes", pdu[0], pdu.len());
                if let Err(e) = writer_conn.write_pdu(&pdu) {
                    warn!("att write failed: {}", e);
                    break;
                }
            }
            writer_conn.close();
        });

        loop {
            let pdu = match self.conn.read_pdu() {
                Ok(pdu) if pdu.is_empty() => break,
                Ok(pdu) => pdu,
                Err(e) => {
                    warn!("att read failed: {}", e);
                    break;
                }
            };
            trace!("att rx: opcode 0x{:02x}, {} bytes", pdu[0], pdu.len());
            if let Some(rsp) = self.dispatch(&pdu) {
                if self.out.send(rsp).is_err() {
                    break;
                }
            }
        }

        debug!("central {:02x?} disconnected", self.addr);
        for done in self.producers.values() {
            done.store(true, Ordering::Release);
        }
        drop(self.out);
        let _ = writer.join();
    }

    fn central(&self) -> Central {
        Central {
            addr: self.addr,
            mtu: self.mtu,
        }
    }

    /// Handles one inbound PDU and returns the serialized response, if one
    /// is due. At most one response is produced per request.
    fn dispatch(&mut self, pdu: &[u8]) -> Option<Vec<u8>> {
        let opcode = pdu[0];
        let result = match opcode {
            ATT_EXCHANGE_MTU_REQ => self.on_mtu(pdu),
            ATT_FIND_INFO_REQ => self.on_find_info(pdu),
            ATT_FIND_BY_TYPE_VALUE_REQ => self.on_find_by_type_value(pdu),
            ATT_READ_BY_TYPE_REQ => self.on_read_by_type(pdu),
            ATT_READ_BY_GROUP_TYPE_REQ => self.on_read_by_group(pdu),
            ATT_READ_REQ => self.on_read(pdu),
            ATT_READ_BLOB_REQ => self.on_read_blob(pdu),
            ATT_WRITE_REQ => match self.on_write(pdu, true) {
                Ok(rsp) => return rsp,
                Err(e) => Err(e),
            },
            ATT_WRITE_CMD => {
                // Commands are never answered, not even with an error.
                if let Err(e) = self.on_write(pdu, false) {
                    warn!("write command dropped: {}", e);
                }
                return None;
            }
            other => Err(AttError::UnsupportedOpcode(other)),
        };
        match result {
            Ok(rsp) => Some(rsp),
            Err(e) => {
                let ecode = e.ecode();
                debug!("att request 0x{:02x} failed: {}", opcode, e);
                Some(
                    ErrorResponse {
                        request_opcode: opcode,
                        handle: e.handle(),
                        ecode,
                    }
                    .serialize(),
                )
            }
        }
    }

    fn on_mtu(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = ExchangeMtuRequest::parse(pdu)?;
        let rsp = ExchangeMtuResponse {
            server_mtu: self.server_mtu,
        }
        .serialize();
        // The new MTU only governs PDUs after this response.
        self.mtu = req.client_mtu.min(self.server_mtu).max(ATT_DEFAULT_MTU);
        debug!("mtu set to {}", self.mtu);
        Ok(rsp)
    }

    fn on_find_info(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = FindInformationRequest::parse(pdu)?;
        let mut pairs: Vec<(u16, crate::uuid::Uuid)> = Vec::new();
        let mut uuid_len = 0usize;
        let mut budget = self.mtu as usize - 2;
        for attr in self.db.range(req.start_handle, req.end_handle) {
            let len = attr.typ.wire_len();
            if pairs.is_empty() {
                uuid_len = len;
            } else if len != uuid_len {
                break;
            }
            if budget < 2 + len {
                break;
            }
            budget -= 2 + len;
            pairs.push((attr.handle, attr.typ));
        }
        if pairs.is_empty() {
            return Err(AttError::Protocol(
                AttErrorCode::AttributeNotFound,
                req.start_handle,
            ));
        }
        Ok(FindInformationResponse { pairs }.serialize())
    }

    fn on_find_by_type_value(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = FindByTypeValueRequest::parse(pdu)?;
        let typ = crate::uuid::Uuid::from_u16(req.attribute_type);
        let is_group = req.attribute_type == PRIMARY_SERVICE_UUID;
        let mut handles = Vec::new();
        let mut budget = self.mtu as usize - 1;
        for attr in self.db.by_type_in_range(req.start_handle, req.end_handle, &typ) {
            if !attr.value.starts_with(&req.value) {
                continue;
            }
            if budget < 4 {
                break;
            }
            budget -= 4;
            let group_end = if is_group { attr.group_end } else { attr.handle };
            handles.push((attr.handle, group_end));
        }
        if handles.is_empty() {
            return Err(AttError::Protocol(
                AttErrorCode::AttributeNotFound,
                req.start_handle,
            ));
        }
        Ok(FindByTypeValueResponse { handles }.serialize())
    }

    fn on_read_by_type(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = ReadByTypeRequest::parse(pdu)?;
        let cap = self.mtu as usize - 4;
        let matches: Vec<u16> = self
            .db
            .by_type_in_range(req.start_handle, req.end_handle, &req.attribute_type)
            .map(|a| a.handle)
            .collect();

        let mut elements: Vec<(u16, Vec<u8>)> = Vec::new();
        let mut value_len = 0usize;
        let mut budget = self.mtu as usize - 2;
        for handle in matches {
            let attr = self.db.by_handle(handle).unwrap();
            let value = self.resolve_value(attr, 0, cap)?;
            if elements.is_empty() {
                value_len = value.len();
            } else if value.len() != value_len {
                // Strictly uniform element lengths; a size change ends the
                // batch and the client resumes from the next handle.
                break;
            }
            if budget < 2 + value_len {
                break;
            }
            budget -= 2 + value_len;
            elements.push((handle, value));
        }
        if elements.is_empty() {
            return Err(AttError::Protocol(
                AttErrorCode::AttributeNotFound,
                req.start_handle,
            ));
        }
        Ok(ReadByTypeResponse {
            element_len: (2 + value_len) as u8,
            elements,
        }
        .serialize())
    }

    fn on_read_by_group(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = ReadByGroupTypeRequest::parse(pdu)?;
        if req.group_type.as_u16() != Some(PRIMARY_SERVICE_UUID) {
            return Err(AttError::Protocol(
                AttErrorCode::UnsupportedGroupType,
                req.start_handle,
            ));
        }
        let mut elements: Vec<GroupElement> = Vec::new();
        let mut value_len = 0usize;
        let mut budget = self.mtu as usize - 2;
        for attr in self
            .db
            .by_type_in_range(req.start_handle, req.end_handle, &req.group_type)
        {
            if elements.is_empty() {
                value_len = attr.value.len();
            } else if attr.value.len() != value_len {
                break;
            }
            if budget < 4 + value_len {
                break;
            }
            budget -= 4 + value_len;
            elements.push(GroupElement {
                handle: attr.handle,
                end_handle: attr.group_end,
                value: attr.value.clone(),
            });
        }
        if elements.is_empty() {
            return Err(AttError::Protocol(
                AttErrorCode::AttributeNotFound,
                req.start_handle,
            ));
        }
        Ok(ReadByGroupTypeResponse {
            element_len: (4 + value_len) as u8,
            elements,
        }
        .serialize())
    }

    fn on_read(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = ReadRequest::parse(pdu)?;
        let attr = self.lookup(req.handle)?;
        let value = self.resolve_value(attr, 0, self.mtu as usize - 1)?;
        Ok(ReadResponse { value }.serialize())
    }

    fn on_read_blob(&mut self, pdu: &[u8]) -> AttResult<Vec<u8>> {
        let req = ReadBlobRequest::parse(pdu)?;
        let attr = self.lookup(req.handle)?;
        let value = self.resolve_value(attr, req.offset as usize, self.mtu as usize - 1)?;
        Ok(ReadBlobResponse { value }.serialize())
    }

    /// Handles both write forms. A `Some` result is a response left for
    /// the caller to enqueue; the CCCD path enqueues its own response
    /// ahead of spawning the notify producer, so the write response always
    /// precedes the first notification.
    fn on_write(&mut self, pdu: &[u8], with_rsp: bool) -> AttResult<Option<Vec<u8>>> {
        let (handle, value) = if with_rsp {
            let req = WriteRequest::parse(pdu)?;
            (req.handle, req.value)
        } else {
            let cmd = WriteCommand::parse(pdu)?;
            (cmd.handle, cmd.value)
        };
        let attr = self.lookup(handle)?;

        if attr.is_cccd {
            let char_info = attr
                .char_info
                .clone()
                .ok_or(AttError::Protocol(AttErrorCode::Unlikely, handle))?;
            if value.len() != 2 {
                return Err(AttError::Protocol(AttErrorCode::InvalidPdu, handle));
            }
            let bits = u16::from_le_bytes([value[0], value[1]]);
            if with_rsp {
                let _ = self.out.send(WriteResponse.serialize());
            }
            self.set_cccd(char_info, bits);
            return Ok(None);
        }

        if !attr.props.can_write() {
            return Err(AttError::Protocol(AttErrorCode::WriteNotPermitted, handle));
        }
        let handler = attr
            .whandler
            .clone()
            .ok_or(AttError::Protocol(AttErrorCode::WriteNotPermitted, handle))?;
        let req = Request {
            central: self.central(),
            characteristic: self.char_context(attr),
        };
        match handler.serve_write(&req, &value) {
            STATUS_SUCCESS => Ok(Some(WriteResponse.serialize())),
            STATUS_INVALID_OFFSET => Err(AttError::Protocol(AttErrorCode::InvalidOffset, handle)),
            _ => Err(AttError::Protocol(AttErrorCode::Unlikely, handle)),
        }
    }

    fn lookup(&self, handle: u16) -> AttResult<&Attribute> {
        self.db
            .by_handle(handle)
            .ok_or(AttError::Protocol(AttErrorCode::InvalidHandle, handle))
    }

    /// Produces the bytes served for `attr` at `offset`, capped to `cap`.
    ///
    /// A read handler takes precedence over the stored value; the CCCD is
    /// answered from this connection's subscription bits.
    fn resolve_value(&self, attr: &Attribute, offset: usize, cap: usize) -> AttResult<Vec<u8>> {
        if !attr.props.can_read() {
            return Err(AttError::Protocol(
                AttErrorCode::ReadNotPermitted,
                attr.handle,
            ));
        }
        if attr.is_cccd {
            let bits = self
                .cccd_bits
                .get(&attr.owner_value_handle)
                .copied()
                .unwrap_or(0);
            let value = bits.to_le_bytes();
            if offset > value.len() {
                return Err(AttError::Protocol(AttErrorCode::InvalidOffset, attr.handle));
            }
            return Ok(value[offset..].iter().copied().take(cap).collect());
        }
        if let Some(handler) = attr.rhandler.clone() {
            let mut resp = ResponseWriter::new(cap);
            let req = GattReadRequest {
                request: Request {
                    central: self.central(),
                    characteristic: self.char_context(attr),
                },
                cap,
                offset,
            };
            handler.serve_read(&mut resp, &req);
            return match resp.status() {
                STATUS_SUCCESS => Ok(resp.into_bytes()),
                STATUS_INVALID_OFFSET => {
                    Err(AttError::Protocol(AttErrorCode::InvalidOffset, attr.handle))
                }
                _ => Err(AttError::Protocol(AttErrorCode::Unlikely, attr.handle)),
            };
        }
        if offset > attr.value.len() {
            return Err(AttError::Protocol(AttErrorCode::InvalidOffset, attr.handle));
        }
        Ok(attr.value[offset..].iter().copied().take(cap).collect())
    }

    fn char_context(&self, attr: &Attribute) -> CharInfo {
        attr.char_info.clone().unwrap_or(CharInfo {
            uuid: attr.typ,
            properties: attr.props,
            decl_handle: attr.handle,
            value_handle: attr.handle,
            end_handle: attr.handle,
        })
    }

    /// Applies a CCCD write: tracks the bits and starts or stops the
    /// characteristic's notify producer on empty/non-empty transitions.
    fn set_cccd(&mut self, char_info: CharInfo, bits: u16) {
        let vh = char_info.value_handle;
        let old = self.cccd_bits.insert(vh, bits).unwrap_or(0);
        let was_on = old & (CCC_NOTIFY_FLAG | CCC_INDICATE_FLAG) != 0;
        let now_on = bits & (CCC_NOTIFY_FLAG | CCC_INDICATE_FLAG) != 0;
        debug!("cccd for value handle 0x{:04x}: 0x{:04x}", vh, bits);

        if was_on && !now_on {
            if let Some(done) = self.producers.remove(&vh) {
                done.store(true, Ordering::Release);
            }
        } else if !was_on && now_on && !self.producers.contains_key(&vh) {
            let nhandler = match self.db.by_handle(vh).and_then(|a| a.nhandler.clone()) {
                Some(h) => h,
                None => return,
            };
            let done = Arc::new(AtomicBool::new(false));
            self.producers.insert(vh, done.clone());
            let notifier = Notifier::new(vh, self.mtu as usize - 3, self.out.clone(), done);
            let req = Request {
                central: self.central(),
                characteristic: char_info,
            };
            thread::spawn(move || nhandler.serve_notify(&req, notifier));
        }
    }
}
