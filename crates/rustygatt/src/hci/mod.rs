//! Host Controller Interface: the raw socket, packet codecs, and the
//! transport consumed by the device facade.

pub mod constants;
pub mod packet;
pub mod socket;
pub mod transport;

#[cfg(test)]
mod tests;

pub use packet::{
    DisconnectionComplete, HciCommand, HciEvent, LeAdvertisingReport, LeConnectionComplete,
};
pub use socket::HciSocket;
pub use transport::{Hci, PlatData, Transport, TransportCallbacks};
