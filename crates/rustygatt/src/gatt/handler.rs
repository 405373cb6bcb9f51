//! Read, write, and notify handlers attached to characteristics and
//! descriptors, plus the reply types they are handed.

use crate::att::pdu::{AttPdu, HandleValueNotification};
use crate::att::{AttError, AttResult};
use crate::gatt::types::CharInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

/// Statuses a write handler (or `ResponseWriter::set_status`) may report.
pub const STATUS_SUCCESS: u8 = 0;
pub const STATUS_INVALID_OFFSET: u8 = 1;
pub const STATUS_UNEXPECTED_ERROR: u8 = 2;

/// Identity of the connected central, as seen by handlers.
#[derive(Debug, Clone)]
pub struct Central {
    pub addr: [u8; 6],
    pub mtu: u16,
}

impl Central {
    /// MAC string form, most significant byte first.
    pub fn id(&self) -> String {
        let a = &self.addr;
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

/// Context for a request from a connected central.
#[derive(Debug, Clone)]
pub struct Request {
    pub central: Central,
    pub characteristic: CharInfo,
}

/// Context for a characteristic or descriptor read.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub request: Request,
    /// Maximum allowed reply length.
    pub cap: usize,
    /// Requested value offset (non-zero for Read Blob).
    pub offset: usize,
}

/// Collects the reply to a read request, bounded by the request cap.
pub struct ResponseWriter {
    capacity: usize,
    buf: Vec<u8>,
    status: u8,
}

impl ResponseWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: Vec::new(),
            status: STATUS_SUCCESS,
        }
    }

    /// Appends data to the reply. Fails without writing anything when the
    /// data does not fit in the remaining capacity.
    pub fn write(&mut self, data: &[u8]) -> AttResult<usize> {
        let avail = self.capacity - self.buf.len();
        if data.len() > avail {
            return Err(AttError::Transport(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("requested write of {} bytes, {} available", data.len(), avail),
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    /// Reports the result of the read. Defaults to `STATUS_SUCCESS`.
    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Pushes notifications for one characteristic to one connected central.
///
/// Handed to a [`NotifyHandler`] when the central enables the CCCD; the
/// handler should stop writing once [`done`](Notifier::done) turns true.
pub struct Notifier {
    value_handle: u16,
    cap: usize,
    out: SyncSender<Vec<u8>>,
    done: Arc<AtomicBool>,
}

impl Notifier {
    pub(crate) fn new(
        value_handle: u16,
        cap: usize,
        out: SyncSender<Vec<u8>>,
        done: Arc<AtomicBool>,
    ) -> Self {
        Self {
            value_handle,
            cap,
            out,
            done,
        }
    }

    /// Enqueues one notification carrying `data`, truncated to
    /// [`cap`](Notifier::cap) bytes. Blocks while the outbound queue is
    /// full; fails once the subscription ended or the connection is gone.
    pub fn write(&self, data: &[u8]) -> AttResult<usize> {
        if self.done() {
            return Err(AttError::Disconnected);
        }
        let n = data.len().min(self.cap);
        let pdu = HandleValueNotification {
            handle: self.value_handle,
            value: data[..n].to_vec(),
        };
        self.out
            .send(pdu.serialize())
            .map_err(|_| AttError::Disconnected)?;
        Ok(n)
    }

    /// Maximum number of bytes for a single notification (MTU - 3).
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// True once the central cleared the CCCD or the connection closed.
    pub fn done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Handles read requests for a characteristic or descriptor value.
pub trait ReadHandler: Send + Sync {
    fn serve_read(&self, resp: &mut ResponseWriter, req: &ReadRequest);
}

impl<F> ReadHandler for F
where
    F: Fn(&mut ResponseWriter, &ReadRequest) + Send + Sync,
{
    fn serve_read(&self, resp: &mut ResponseWriter, req: &ReadRequest) {
        self(resp, req)
    }
}

/// Handles write requests. Write and write-no-response requests are
/// presented identically; the server sends the response when one is due.
pub trait WriteHandler: Send + Sync {
    fn serve_write(&self, req: &Request, data: &[u8]) -> u8;
}

impl<F> WriteHandler for F
where
    F: Fn(&Request, &[u8]) -> u8 + Send + Sync,
{
    fn serve_write(&self, req: &Request, data: &[u8]) -> u8 {
        self(req, data)
    }
}

/// Runs while a central is subscribed to a characteristic, producing
/// notifications through the supplied [`Notifier`].
pub trait NotifyHandler: Send + Sync {
    fn serve_notify(&self, req: &Request, notifier: Notifier);
}

impl<F> NotifyHandler for F
where
    F: Fn(&Request, Notifier) + Send + Sync,
{
    fn serve_notify(&self, req: &Request, notifier: Notifier) {
        self(req, notifier)
    }
}
