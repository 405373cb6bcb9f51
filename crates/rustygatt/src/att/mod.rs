//! Attribute Protocol (ATT) implementation.
//!
//! The PDU codec, the handle-indexed attribute database, and the
//! per-connection server and client state machines that speak ATT over
//! the L2CAP fixed channel 0x0004.

pub mod client;
pub mod constants;
pub mod db;
pub mod error;
pub mod pdu;
pub mod server;

#[cfg(test)]
mod tests;

pub use self::client::AttClient;
pub use self::constants::*;
pub use self::db::{AttrDb, Attribute};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::server::{AttServer, AttServerConfig};
