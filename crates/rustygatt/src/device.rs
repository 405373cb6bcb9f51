//! The device facade: wires the HCI transport, advertising control, and
//! the peripheral/central connection lifecycle together.

use crate::adv::{self, Advertisement};
use crate::att::{AttClient, AttServer, AttServerConfig, AttrDb, ATT_MAX_MTU};
use crate::error::Error;
use crate::gatt::handler::Central;
use crate::gatt::{Peripheral, Service};
use crate::hci::{Hci, PlatData, Transport, TransportCallbacks};
use crate::l2cap::L2capConn;
use crate::uuid::Uuid;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::thread;
use std::time::Duration;

/// How often the heartbeat pings the controller.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Options recognized by the device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device name, exposed through the Generic Access service.
    pub name: String,
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,
    pub adv_channel_map: u8,
    pub max_connections: usize,
    /// Largest MTU the server will negotiate to.
    pub server_mtu: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: String::new(),
            adv_interval_min: 0x00F4,
            adv_interval_max: 0x00F4,
            adv_channel_map: 7,
            max_connections: 1,
            server_mtu: ATT_MAX_MTU,
        }
    }
}

type CentralFn = Arc<dyn Fn(&Central) + Send + Sync>;
type PeripheralFn = Arc<dyn Fn(&mut Peripheral) + Send + Sync>;
type DiscoveredFn = Arc<dyn Fn(&PlatData, &Advertisement, i8) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    central_connected: Option<CentralFn>,
    central_disconnected: Option<CentralFn>,
    peripheral_discovered: Option<DiscoveredFn>,
    peripheral_connected: Option<PeripheralFn>,
    peripheral_disconnected: Option<PeripheralFn>,
}

/// A BLE device able to act as peripheral (server) and central (client).
pub struct Device {
    config: DeviceConfig,
    transport: OnceLock<Arc<dyn Transport>>,
    handlers: Mutex<Handlers>,
    svcs: Mutex<Vec<Service>>,
    db: RwLock<Option<Arc<AttrDb>>>,
    adv_pkt: Mutex<Option<Vec<u8>>>,
    scan_rsp_pkt: Mutex<Option<Vec<u8>>>,
    mf_data: Mutex<Vec<u8>>,
    adv_services: Mutex<Vec<Uuid>>,
    active_conns: AtomicUsize,
    closed: AtomicBool,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Arc<Device> {
        Arc::new(Device {
            config,
            transport: OnceLock::new(),
            handlers: Mutex::new(Handlers::default()),
            svcs: Mutex::new(Vec::new()),
            db: RwLock::new(None),
            adv_pkt: Mutex::new(None),
            scan_rsp_pkt: Mutex::new(None),
            mf_data: Mutex::new(Vec::new()),
            adv_services: Mutex::new(Vec::new()),
            active_conns: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    // Lifecycle handlers. All of these must be installed before `init`.

    pub fn on_central_connected(&self, f: impl Fn(&Central) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().central_connected = Some(Arc::new(f));
    }

    pub fn on_central_disconnected(&self, f: impl Fn(&Central) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().central_disconnected = Some(Arc::new(f));
    }

    pub fn on_peripheral_discovered(
        &self,
        f: impl Fn(&PlatData, &Advertisement, i8) + Send + Sync + 'static,
    ) {
        self.handlers.lock().unwrap().peripheral_discovered = Some(Arc::new(f));
    }

    pub fn on_peripheral_connected(&self, f: impl Fn(&mut Peripheral) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().peripheral_connected = Some(Arc::new(f));
    }

    pub fn on_peripheral_disconnected(&self, f: impl Fn(&mut Peripheral) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().peripheral_disconnected = Some(Arc::new(f));
    }

    /// Opens HCI device `dev_id` and starts serving.
    pub fn init(self: &Arc<Self>, dev_id: u16) -> Result<(), Error> {
        let callbacks = self.transport_callbacks();
        let hci = Hci::new(dev_id, callbacks)?;
        self.attach_transport(Arc::new(hci));
        Ok(())
    }

    /// Builds the callbacks a transport must deliver to this device.
    /// Exposed so alternative transports can be wired in.
    pub fn transport_callbacks(self: &Arc<Self>) -> TransportCallbacks {
        let master = Arc::downgrade(self);
        let slave = Arc::downgrade(self);
        let disco = Arc::downgrade(self);
        TransportCallbacks {
            accept_master: Box::new(move |pd, conn| {
                if let Some(device) = master.upgrade() {
                    device.serve_central(pd, conn);
                }
            }),
            accept_slave: Box::new(move |pd, conn| {
                if let Some(device) = slave.upgrade() {
                    device.serve_peripheral(pd, conn);
                }
            }),
            advertisement: Box::new(move |pd| {
                if let Some(device) = disco.upgrade() {
                    device.on_advertisement(pd);
                }
            }),
        }
    }

    /// Adopts a transport (the Linux HCI, or a test double) and starts the
    /// controller heartbeat.
    pub fn attach_transport(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        if self.transport.set(transport).is_err() {
            warn!("transport already attached");
            return;
        }
        let weak: Weak<Device> = Arc::downgrade(self);
        thread::spawn(move || loop {
            thread::sleep(HEARTBEAT_INTERVAL);
            let device = match weak.upgrade() {
                Some(d) => d,
                None => break,
            };
            if device.closed.load(Ordering::Acquire) {
                break;
            }
            if let Err(e) = device.transport().ping() {
                warn!("controller heartbeat failed: {}", e);
                let _ = device.stop();
                break;
            }
        });
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.transport.get().expect("device not initialized")
    }

    /// Shuts the device down; all connections drop.
    pub fn stop(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        self.transport().close()?;
        Ok(())
    }

    // Server-side database management.

    /// Adds a service and rebuilds the attribute table.
    pub fn add_service(&self, svc: Service) -> Result<(), Error> {
        let mut svcs = self.svcs.lock().unwrap();
        svcs.push(svc);
        self.rebuild_db(&svcs);
        Ok(())
    }

    /// Replaces all services.
    pub fn set_services(&self, services: Vec<Service>) -> Result<(), Error> {
        let mut svcs = self.svcs.lock().unwrap();
        *svcs = services;
        self.rebuild_db(&svcs);
        Ok(())
    }

    /// Removes every service.
    pub fn remove_services(&self) -> Result<(), Error> {
        self.svcs.lock().unwrap().clear();
        *self.db.write().unwrap() = None;
        Ok(())
    }

    fn rebuild_db(&self, svcs: &[Service]) {
        let db = AttrDb::with_preamble(&self.config.name, svcs.to_vec());
        *self.db.write().unwrap() = Some(Arc::new(db));
    }

    // Advertising control.

    /// Overrides the advertising payload.
    pub fn set_advertising_packet(&self, pkt: &[u8]) {
        *self.adv_pkt.lock().unwrap() = Some(pkt.to_vec());
    }

    /// Overrides the scan-response payload.
    pub fn set_scan_response_packet(&self, pkt: &[u8]) {
        *self.scan_rsp_pkt.lock().unwrap() = Some(pkt.to_vec());
    }

    /// Appends manufacturer data to the advertising payload.
    pub fn set_manufacturer_data(&self, data: &[u8]) {
        *self.mf_data.lock().unwrap() = data.to_vec();
    }

    /// Overrides which service UUIDs the default payload advertises.
    pub fn set_advertising_services(&self, uuids: &[Uuid]) {
        *self.adv_services.lock().unwrap() = uuids.to_vec();
    }

    /// Starts advertising the configured name and services.
    pub fn advertise(&self) -> Result<(), Error> {
        if self.scan_rsp_pkt.lock().unwrap().is_none() {
            let pkt = adv::name_scan_response(&self.config.name);
            *self.scan_rsp_pkt.lock().unwrap() = Some(pkt.bytes().to_vec());
        }
        if self.adv_pkt.lock().unwrap().is_none() {
            let uuids = {
                let adv_services = self.adv_services.lock().unwrap();
                if adv_services.is_empty() {
                    self.svcs.lock().unwrap().iter().map(|s| s.uuid()).collect()
                } else {
                    adv_services.clone()
                }
            };
            let pkt = adv::service_adv_packet(&uuids)?;
            *self.adv_pkt.lock().unwrap() = Some(pkt.bytes().to_vec());
        }
        self.advertise_current()
    }

    /// Advertises an iBeacon.
    pub fn advertise_ibeacon(
        &self,
        uuid: Uuid,
        major: u16,
        minor: u16,
        power: i8,
    ) -> Result<(), Error> {
        let pkt = adv::ibeacon_packet(uuid, major, minor, power)?;
        self.advertise_ibeacon_data(pkt.bytes())
    }

    /// Advertises a prebuilt iBeacon (or any raw) payload.
    pub fn advertise_ibeacon_data(&self, pkt: &[u8]) -> Result<(), Error> {
        *self.adv_pkt.lock().unwrap() = Some(pkt.to_vec());
        self.advertise_current()
    }

    /// Pushes the current payloads to the controller and enables
    /// advertising.
    fn advertise_current(&self) -> Result<(), Error> {
        let transport = self.transport();
        transport.set_advertise_enable(false)?;
        transport.set_advertising_parameters(
            self.config.adv_interval_min,
            self.config.adv_interval_max,
            self.config.adv_channel_map,
        )?;

        if let Some(pkt) = self.scan_rsp_pkt.lock().unwrap().as_deref() {
            let (len, data) = pad31(pkt, &[]);
            transport.set_scan_response_packet(len, data)?;
        }
        if let Some(pkt) = self.adv_pkt.lock().unwrap().as_deref() {
            let mf = self.mf_data.lock().unwrap();
            let (len, data) = pad31(pkt, &mf);
            transport.set_advertising_data(len, data)?;
        }
        transport.set_advertise_enable(true)?;
        Ok(())
    }

    pub fn stop_advertising(&self) -> Result<(), Error> {
        self.transport().set_advertise_enable(false)?;
        Ok(())
    }

    // Central-side control.

    /// Starts scanning for peripherals.
    pub fn scan(&self, filter_duplicates: bool) -> Result<(), Error> {
        self.transport().set_scan_enable(true, filter_duplicates)?;
        Ok(())
    }

    pub fn stop_scanning(&self) -> Result<(), Error> {
        self.transport().set_scan_enable(false, true)?;
        Ok(())
    }

    /// Initiates a connection to a discovered peripheral.
    pub fn connect(&self, pd: &PlatData) -> Result<(), Error> {
        self.transport().connect(pd)?;
        Ok(())
    }

    /// Cancels a pending or established connection.
    pub fn cancel_connection(&self, pd: &PlatData) -> Result<(), Error> {
        self.transport().cancel_connection(pd)?;
        Ok(())
    }

    // Transport callbacks.

    /// Runs the ATT server for a central that connected to us. Blocks
    /// until the connection ends.
    fn serve_central(&self, pd: PlatData, conn: Arc<dyn L2capConn>) {
        if self.active_conns.fetch_add(1, Ordering::AcqRel) >= self.config.max_connections {
            warn!("connection limit reached, dropping central");
            self.active_conns.fetch_sub(1, Ordering::AcqRel);
            conn.close();
            return;
        }
        let db = match self.db.read().unwrap().clone() {
            Some(db) => db,
            None => Arc::new(AttrDb::with_preamble(&self.config.name, Vec::new())),
        };

        let central = Central {
            addr: pd.addr,
            mtu: crate::att::ATT_DEFAULT_MTU,
        };
        if let Some(f) = self.handlers.lock().unwrap().central_connected.clone() {
            f(&central);
        }

        let server = AttServer::new(
            db,
            conn,
            pd.addr,
            AttServerConfig {
                mtu: self.config.server_mtu,
            },
        );
        server.serve();

        if let Some(f) = self.handlers.lock().unwrap().central_disconnected.clone() {
            f(&central);
        }
        self.active_conns.fetch_sub(1, Ordering::AcqRel);
    }

    /// Runs the client side for a peripheral we connected to. Blocks until
    /// the connection ends.
    fn serve_peripheral(&self, pd: PlatData, conn: Arc<dyn L2capConn>) {
        let att = AttClient::new(conn);
        let mut peripheral = Peripheral::new(att.clone(), pd.addr, pd.name.clone());
        debug!("peripheral {} connected", peripheral.id());

        if let Some(f) = self.handlers.lock().unwrap().peripheral_connected.clone() {
            f(&mut peripheral);
        }
        att.wait_closed();
        if let Some(f) = self.handlers.lock().unwrap().peripheral_disconnected.clone() {
            f(&mut peripheral);
        }
    }

    fn on_advertisement(&self, mut pd: PlatData) {
        let adv = Advertisement::unmarshal(&pd.adv_data);
        if let Some(name) = &adv.local_name {
            pd.name = name.clone();
        }
        let rssi = pd.rssi;
        if let Some(f) = self.handlers.lock().unwrap().peripheral_discovered.clone() {
            f(&pd, &adv, rssi);
        }
    }
}

/// Packs a payload (plus trailing extra bytes) into the fixed 31-byte
/// advertising buffer, reporting the significant length.
fn pad31(pkt: &[u8], extra: &[u8]) -> (u8, [u8; 31]) {
    let mut data = [0u8; 31];
    let mut combined = pkt.to_vec();
    combined.extend_from_slice(extra);
    let n = combined.len().min(31);
    data[..n].copy_from_slice(&combined[..n]);
    (n as u8, data)
}
