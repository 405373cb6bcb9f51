//! HCI command and event packet structures.

use super::constants::*;

/// HCI commands the stack issues.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HciCommand {
    Reset,
    SetEventMask {
        event_mask: u64,
    },
    ReadBdAddr,
    Disconnect {
        handle: u16,
        reason: u8,
    },
    LeSetAdvertisingParameters {
        min_interval: u16,
        max_interval: u16,
        channel_map: u8,
    },
    LeSetAdvertisingData {
        len: u8,
        data: [u8; 31],
    },
    LeSetScanResponseData {
        len: u8,
        data: [u8; 31],
    },
    LeSetAdvertiseEnable {
        enable: bool,
    },
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable {
        enable: bool,
        filter_duplicates: bool,
    },
    LeCreateConnection {
        peer_addr: [u8; 6],
        peer_addr_type: u8,
    },
    LeCreateConnectionCancel,
}

impl HciCommand {
    /// The packed opcode for this command.
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = match self {
            Self::Reset => (OGF_HOST_CTL, OCF_RESET),
            Self::SetEventMask { .. } => (OGF_HOST_CTL, OCF_SET_EVENT_MASK),
            Self::ReadBdAddr => (OGF_INFO_PARAM, OCF_READ_BD_ADDR),
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),
            Self::LeSetAdvertisingParameters { .. } => {
                (OGF_LE_CTL, OCF_LE_SET_ADVERTISING_PARAMETERS)
            }
            Self::LeSetAdvertisingData { .. } => (OGF_LE_CTL, OCF_LE_SET_ADVERTISING_DATA),
            Self::LeSetScanResponseData { .. } => (OGF_LE_CTL, OCF_LE_SET_SCAN_RESPONSE_DATA),
            Self::LeSetAdvertiseEnable { .. } => (OGF_LE_CTL, OCF_LE_SET_ADVERTISE_ENABLE),
            Self::LeSetScanParameters { .. } => (OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE),
            Self::LeCreateConnection { .. } => (OGF_LE_CTL, OCF_LE_CREATE_CONNECTION),
            Self::LeCreateConnectionCancel => (OGF_LE_CTL, OCF_LE_CREATE_CONNECTION_CANCEL),
        };
        opcode(ogf, ocf)
    }

    fn parameters(&self) -> Vec<u8> {
        match *self {
            Self::Reset | Self::ReadBdAddr | Self::LeCreateConnectionCancel => vec![],

            Self::SetEventMask { event_mask } => event_mask.to_le_bytes().to_vec(),

            Self::Disconnect { handle, reason } => {
                let mut params = Vec::with_capacity(3);
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(reason);
                params
            }

            Self::LeSetAdvertisingParameters {
                min_interval,
                max_interval,
                channel_map,
            } => {
                let mut params = Vec::with_capacity(15);
                params.extend_from_slice(&min_interval.to_le_bytes());
                params.extend_from_slice(&max_interval.to_le_bytes());
                params.push(0x00); // ADV_IND
                params.push(0x00); // own address: public
                params.push(0x00); // peer address type
                params.extend_from_slice(&[0u8; 6]); // peer address
                params.push(channel_map);
                params.push(0x00); // no filter policy
                params
            }

            Self::LeSetAdvertisingData { len, data }
            | Self::LeSetScanResponseData { len, data } => {
                let mut params = Vec::with_capacity(32);
                params.push(len);
                params.extend_from_slice(&data);
                params
            }

            Self::LeSetAdvertiseEnable { enable } => vec![enable as u8],

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(own_address_type);
                params.push(filter_policy);
                params
            }

            Self::LeSetScanEnable {
                enable,
                filter_duplicates,
            } => vec![enable as u8, filter_duplicates as u8],

            Self::LeCreateConnection {
                peer_addr,
                peer_addr_type,
            } => {
                let mut params = Vec::with_capacity(25);
                params.extend_from_slice(&0x0060u16.to_le_bytes()); // scan interval
                params.extend_from_slice(&0x0030u16.to_le_bytes()); // scan window
                params.push(0x00); // use peer address below
                params.push(peer_addr_type);
                params.extend_from_slice(&peer_addr);
                params.push(0x00); // own address: public
                params.extend_from_slice(&0x0010u16.to_le_bytes()); // conn interval min
                params.extend_from_slice(&0x0020u16.to_le_bytes()); // conn interval max
                params.extend_from_slice(&0x0000u16.to_le_bytes()); // latency
                params.extend_from_slice(&0x00C8u16.to_le_bytes()); // supervision timeout
                params.extend_from_slice(&0x0000u16.to_le_bytes()); // min CE length
                params.extend_from_slice(&0x0000u16.to_le_bytes()); // max CE length
                params
            }
        }
    }

    /// Serializes the command into a full HCI packet.
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();
        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }
}

/// An HCI event packet.
#[derive(Debug, Clone)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parses an event from the bytes following the packet indicator.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let event_code = data[0];
        let len = data[1] as usize;
        if data.len() < 2 + len {
            return None;
        }
        Some(HciEvent {
            event_code,
            parameters: data[2..2 + len].to_vec(),
        })
    }

    /// True when this is a Command Complete event for `op`.
    pub fn is_command_complete(&self, op: u16) -> bool {
        self.event_code == EVT_CMD_COMPLETE
            && self.parameters.len() >= 3
            && u16::from_le_bytes([self.parameters[1], self.parameters[2]]) == op
    }

    /// Status byte of a Command Complete event.
    pub fn status(&self) -> u8 {
        self.parameters.get(3).copied().unwrap_or(0xFF)
    }
}

/// LE Connection Complete subevent fields.
#[derive(Debug, Clone)]
pub struct LeConnectionComplete {
    pub status: u8,
    pub handle: u16,
    /// 0x00 when we are central, 0x01 when we are peripheral.
    pub role: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
}

impl LeConnectionComplete {
    pub fn parse(event: &HciEvent) -> Option<Self> {
        let p = &event.parameters;
        if event.event_code != EVT_LE_META_EVENT || p.len() < 12 || p[0] != EVT_LE_CONN_COMPLETE {
            return None;
        }
        let mut peer_addr = [0u8; 6];
        peer_addr.copy_from_slice(&p[6..12]);
        Some(LeConnectionComplete {
            status: p[1],
            handle: u16::from_le_bytes([p[2], p[3]]),
            role: p[4],
            peer_addr_type: p[5],
            peer_addr,
        })
    }
}

/// Disconnection Complete event fields.
#[derive(Debug, Clone)]
pub struct DisconnectionComplete {
    pub status: u8,
    pub handle: u16,
    pub reason: u8,
}

impl DisconnectionComplete {
    pub fn parse(event: &HciEvent) -> Option<Self> {
        let p = &event.parameters;
        if event.event_code != EVT_DISCONN_COMPLETE || p.len() < 4 {
            return None;
        }
        Some(DisconnectionComplete {
            status: p[0],
            handle: u16::from_le_bytes([p[1], p[2]]),
            reason: p[3],
        })
    }
}

/// One LE Advertising Report.
#[derive(Debug, Clone)]
pub struct LeAdvertisingReport {
    pub event_type: u8,
    pub addr_type: u8,
    pub addr: [u8; 6],
    pub data: Vec<u8>,
    pub rssi: i8,
}

impl LeAdvertisingReport {
    /// Parses the first report out of an LE meta event.
    pub fn parse(event: &HciEvent) -> Option<Self> {
        let p = &event.parameters;
        if event.event_code != EVT_LE_META_EVENT
            || p.len() < 12
            || p[0] != EVT_LE_ADVERTISING_REPORT
        {
            return None;
        }
        let event_type = p[2];
        let addr_type = p[3];
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&p[4..10]);
        let data_len = p[10] as usize;
        if p.len() < 11 + data_len + 1 {
            return None;
        }
        let data = p[11..11 + data_len].to_vec();
        let rssi = p[11 + data_len] as i8;
        Some(LeAdvertisingReport {
            event_type,
            addr_type,
            addr,
            data,
            rssi,
        })
    }

    /// Connectable advertising types: ADV_IND and ADV_DIRECT_IND.
    pub fn connectable(&self) -> bool {
        matches!(self.event_type, 0x00 | 0x01)
    }
}
