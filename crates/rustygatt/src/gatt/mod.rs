//! GATT (Generic Attribute Profile) layer.
//!
//! Server-side service builders with read/write/notify handlers, and the
//! central-side client that discovers and operates on a remote database.

pub mod client;
pub mod handler;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{Peripheral, RemoteCharacteristic, RemoteDescriptor, RemoteService};
pub use handler::{
    Central, Notifier, NotifyHandler, ReadHandler, ReadRequest, Request, ResponseWriter,
    WriteHandler, STATUS_INVALID_OFFSET, STATUS_SUCCESS, STATUS_UNEXPECTED_ERROR,
};
pub use types::{CharInfo, Characteristic, Descriptor, Property, Service};
