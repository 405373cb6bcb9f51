//! GATT service, characteristic, and descriptor builders.
//!
//! Services are assembled before the device starts serving; handles are
//! assigned when the service list is flattened into the attribute database
//! (see [`crate::att::db`]).

use crate::att::constants::*;
use crate::gatt::handler::{NotifyHandler, ReadHandler, Request, ResponseWriter, WriteHandler};
use crate::gatt::ReadRequest;
use crate::uuid::Uuid;
use std::fmt;
use std::sync::Arc;

/// Characteristic property flags.
///
/// Bit positions match the declaration-value byte from the BLE spec, so a
/// `Property` can be written verbatim into a characteristic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Property(pub u8);

impl Property {
    pub const BROADCAST: Property = Property(0x01);
    pub const READ: Property = Property(0x02);
    pub const WRITE_NR: Property = Property(0x04);
    pub const WRITE: Property = Property(0x08);
    pub const NOTIFY: Property = Property(0x10);
    pub const INDICATE: Property = Property(0x20);
    pub const SIGNED_WRITE: Property = Property(0x40);
    pub const EXTENDED: Property = Property(0x80);

    pub fn contains(&self, other: Property) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn intersects(&self, other: Property) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn can_read(&self) -> bool {
        self.intersects(Property::READ)
    }

    pub fn can_write(&self) -> bool {
        self.intersects(Property::WRITE | Property::WRITE_NR)
    }

    pub fn can_notify(&self) -> bool {
        self.intersects(Property::NOTIFY)
    }

    pub fn can_indicate(&self) -> bool {
        self.intersects(Property::INDICATE)
    }
}

impl std::ops::BitOr for Property {
    type Output = Property;
    fn bitor(self, rhs: Property) -> Property {
        Property(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Property {
    fn bitor_assign(&mut self, rhs: Property) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Property::BROADCAST, "broadcast"),
            (Property::READ, "read"),
            (Property::WRITE_NR, "writeWithoutResponse"),
            (Property::WRITE, "write"),
            (Property::NOTIFY, "notify"),
            (Property::INDICATE, "indicate"),
            (Property::SIGNED_WRITE, "authenticatedSignedWrites"),
            (Property::EXTENDED, "extendedProperties"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.intersects(bit) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Compact, copyable view of a characteristic, used in handler requests
/// and as the client-side discovery result.
#[derive(Debug, Clone)]
pub struct CharInfo {
    pub uuid: Uuid,
    pub properties: Property,
    pub decl_handle: u16,
    pub value_handle: u16,
    pub end_handle: u16,
}

/// A GATT service under construction (server side) or discovered
/// (client side).
#[derive(Clone)]
pub struct Service {
    uuid: Uuid,
    pub(crate) handle: u16,
    pub(crate) end_handle: u16,
    chars: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid) -> Self {
        Service {
            uuid,
            handle: 0,
            end_handle: 0,
            chars: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Start handle; 0 until the database is built.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Handle of the last attribute belonging to this service.
    pub fn end_handle(&self) -> u16 {
        self.end_handle
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }

    pub fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.chars
    }

    /// Adds a characteristic to the service.
    ///
    /// Panics if the service already contains a characteristic with the
    /// same UUID.
    pub fn add_characteristic(&mut self, uuid: Uuid) -> &mut Characteristic {
        if self.chars.iter().any(|c| c.uuid == uuid) {
            panic!(
                "service {} already contains a characteristic with uuid {}",
                self.uuid, uuid
            );
        }
        self.chars.push(Characteristic::new(uuid));
        self.chars.last_mut().unwrap()
    }
}

/// A GATT characteristic: a declaration attribute plus a value attribute,
/// with optional descriptors.
#[derive(Clone)]
pub struct Characteristic {
    uuid: Uuid,
    pub(crate) props: Property,
    pub(crate) secure: Property,
    pub(crate) decl_handle: u16,
    pub(crate) value_handle: u16,
    pub(crate) end_handle: u16,
    pub(crate) value: Vec<u8>,
    pub(crate) rhandler: Option<Arc<dyn ReadHandler>>,
    pub(crate) whandler: Option<Arc<dyn WriteHandler>>,
    pub(crate) nhandler: Option<Arc<dyn NotifyHandler>>,
    descs: Vec<Descriptor>,
    has_cccd: bool,
}

impl Characteristic {
    fn new(uuid: Uuid) -> Self {
        Characteristic {
            uuid,
            props: Property::default(),
            secure: Property::default(),
            decl_handle: 0,
            value_handle: 0,
            end_handle: 0,
            value: Vec::new(),
            rhandler: None,
            whandler: None,
            nhandler: None,
            descs: Vec::new(),
            has_cccd: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn properties(&self) -> Property {
        self.props
    }

    pub fn value_handle(&self) -> u16 {
        self.value_handle
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descs
    }

    pub fn info(&self) -> CharInfo {
        CharInfo {
            uuid: self.uuid,
            properties: self.props,
            decl_handle: self.decl_handle,
            value_handle: self.value_handle,
            end_handle: self.end_handle,
        }
    }

    /// Stores a static value and enables the Read property.
    pub fn set_value(&mut self, value: &[u8]) -> &mut Self {
        self.props |= Property::READ;
        self.value = value.to_vec();
        self
    }

    /// Marks the given operations as requiring an authenticated link.
    /// The marker is carried on the attribute; enforcement is up to the
    /// link layer.
    pub fn set_secure(&mut self, props: Property) -> &mut Self {
        self.secure |= props;
        self
    }

    /// Routes read requests to `h` and enables the Read property.
    /// Must be called before any server using the characteristic starts.
    pub fn handle_read(&mut self, h: Arc<dyn ReadHandler>) -> &mut Self {
        self.props |= Property::READ;
        self.rhandler = Some(h);
        self
    }

    /// `handle_read` with a plain closure.
    pub fn handle_read_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut ResponseWriter, &ReadRequest) + Send + Sync + 'static,
    {
        self.handle_read(Arc::new(f))
    }

    /// Routes write and write-no-response requests to `h` and enables the
    /// Write property. Must be called before any server using the
    /// characteristic starts.
    pub fn handle_write(&mut self, h: Arc<dyn WriteHandler>) -> &mut Self {
        self.props |= Property::WRITE | Property::WRITE_NR;
        self.whandler = Some(h);
        self
    }

    /// `handle_write` with a plain closure.
    pub fn handle_write_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Request, &[u8]) -> u8 + Send + Sync + 'static,
    {
        self.handle_write(Arc::new(f))
    }

    /// Makes the characteristic support subscriptions, routing them to `h`,
    /// and attaches the client characteristic configuration descriptor.
    /// Must be called before any server using the characteristic starts.
    pub fn handle_notify(&mut self, h: Arc<dyn NotifyHandler>) -> &mut Self {
        if self.has_cccd {
            return self;
        }
        let p = Property::NOTIFY | Property::INDICATE;
        self.props |= p;
        self.nhandler = Some(h);

        let mut cccd = Descriptor::new(Uuid::from_u16(CLIENT_CHAR_CONFIG_UUID));
        cccd.props = Property::READ | Property::WRITE | Property::WRITE_NR;
        if self.secure.intersects(p) {
            cccd.secure = Property::READ | Property::WRITE | Property::WRITE_NR;
        }
        cccd.value = vec![0x00, 0x00];
        cccd.is_cccd = true;
        self.descs.push(cccd);
        self.has_cccd = true;
        self
    }

    /// `handle_notify` with a plain closure.
    pub fn handle_notify_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Request, crate::gatt::Notifier) + Send + Sync + 'static,
    {
        self.handle_notify(Arc::new(f))
    }

    /// Adds a user descriptor to the characteristic.
    pub fn add_descriptor(&mut self, uuid: Uuid) -> &mut Descriptor {
        self.descs.push(Descriptor::new(uuid));
        self.descs.last_mut().unwrap()
    }

    pub(crate) fn descriptors_mut(&mut self) -> &mut [Descriptor] {
        &mut self.descs
    }
}

/// A characteristic descriptor.
#[derive(Clone)]
pub struct Descriptor {
    uuid: Uuid,
    pub(crate) props: Property,
    pub(crate) secure: Property,
    pub(crate) handle: u16,
    pub(crate) value: Vec<u8>,
    pub(crate) rhandler: Option<Arc<dyn ReadHandler>>,
    pub(crate) whandler: Option<Arc<dyn WriteHandler>>,
    pub(crate) is_cccd: bool,
}

impl Descriptor {
    fn new(uuid: Uuid) -> Self {
        Descriptor {
            uuid,
            props: Property::default(),
            secure: Property::default(),
            handle: 0,
            value: Vec::new(),
            rhandler: None,
            whandler: None,
            is_cccd: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Stores a static value and enables the Read property.
    pub fn set_value(&mut self, value: &[u8]) -> &mut Self {
        self.props |= Property::READ;
        self.value = value.to_vec();
        self
    }

    /// Marks the given operations as requiring an authenticated link.
    pub fn set_secure(&mut self, props: Property) -> &mut Self {
        self.secure |= props;
        self
    }

    /// Routes read requests to `h` and enables the Read property.
    pub fn handle_read(&mut self, h: Arc<dyn ReadHandler>) -> &mut Self {
        self.props |= Property::READ;
        self.rhandler = Some(h);
        self
    }

    pub fn handle_read_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut ResponseWriter, &ReadRequest) + Send + Sync + 'static,
    {
        self.handle_read(Arc::new(f))
    }

    /// Routes write requests to `h` and enables the Write property.
    pub fn handle_write(&mut self, h: Arc<dyn WriteHandler>) -> &mut Self {
        self.props |= Property::WRITE | Property::WRITE_NR;
        self.whandler = Some(h);
        self
    }

    pub fn handle_write_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Request, &[u8]) -> u8 + Send + Sync + 'static,
    {
        self.handle_write(Arc::new(f))
    }
}
