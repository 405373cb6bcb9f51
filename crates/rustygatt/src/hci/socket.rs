//! The raw HCI socket.

use crate::error::{HciError, HciResult};
use crate::hci::packet::HciCommand;
use std::os::unix::io::{AsRawFd, RawFd};

const AF_BLUETOOTH: i32 = 31;
const BTPROTO_HCI: i32 = 1;
const HCI_CHANNEL_USER: u16 = 1;

#[repr(C)]
struct SockaddrHci {
    hci_family: libc::sa_family_t,
    hci_dev: u16,
    hci_channel: u16,
}

/// A user-channel HCI socket bound to one controller.
#[derive(Debug)]
pub struct HciSocket {
    fd: RawFd,
}

impl HciSocket {
    /// Opens and binds the socket for device `dev_id`. Requires the
    /// controller to be down (user channel gives us exclusive access).
    pub fn open(dev_id: u16) -> HciResult<Self> {
        let fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_RAW | libc::SOCK_CLOEXEC, BTPROTO_HCI) };
        if fd < 0 {
            return Err(HciError::Socket(std::io::Error::last_os_error()));
        }

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_USER,
        };
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(HciError::Bind(err));
        }

        Ok(HciSocket { fd })
    }

    /// Sends a serialized HCI command packet.
    pub fn send_command(&self, command: &HciCommand) -> HciResult<()> {
        self.send_raw(&command.to_packet())
    }

    /// Writes raw bytes (command or ACL packet) to the controller.
    pub fn send_raw(&self, packet: &[u8]) -> HciResult<()> {
        let rc = unsafe {
            libc::write(self.fd, packet.as_ptr() as *const libc::c_void, packet.len())
        };
        if rc < 0 {
            return Err(HciError::Send(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Wakes any blocked reader; subsequent reads return end-of-file.
    pub fn shutdown(&self) {
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
        }
    }

    /// Reads one packet from the controller. Blocks; returns the raw bytes
    /// including the packet indicator byte.
    pub fn read_packet(&self) -> HciResult<Vec<u8>> {
        let mut buf = [0u8; 1024];
        let n = unsafe {
            libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };
        if n < 0 {
            return Err(HciError::Receive(std::io::Error::last_os_error()));
        }
        Ok(buf[..n as usize].to_vec())
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for HciSocket {
    fn drop(&mut self) {
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
            libc::close(self.fd);
        }
    }
}
