//! RustyGatt - a GATT stack for Bluetooth Low Energy on Linux.
//!
//! Implements the Attribute Protocol over the L2CAP fixed channel in both
//! directions: a peripheral-role server exposing an attribute database of
//! services, characteristics, and descriptors, and a central-role client
//! that discovers remote databases and performs reads, writes, and
//! notification subscriptions. The HCI controller is driven directly for
//! advertising, scanning, and connections.

pub mod adv;
pub mod att;
pub mod device;
pub mod error;
pub mod gatt;
pub mod hci;
pub mod l2cap;
pub mod uuid;

// Re-export the common surface for convenience.
pub use adv::{AdvPacket, Advertisement};
pub use att::{AttClient, AttError, AttErrorCode, AttrDb};
pub use device::{Device, DeviceConfig};
pub use error::{Error, HciError};
pub use gatt::{
    Central, Characteristic, Descriptor, Notifier, Peripheral, Property, Request, ResponseWriter,
    Service,
};
pub use uuid::Uuid;
