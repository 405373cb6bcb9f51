//! ATT error codes and the error type shared by server and client.

use super::constants::*;
use thiserror::Error;

/// ATT protocol error codes carried in an Error Response PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttErrorCode {
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidPdu,
    RequestNotSupported,
    InvalidOffset,
    AttributeNotFound,
    AttributeNotLong,
    Unlikely,
    UnsupportedGroupType,
    InsufficientResources,
    Unknown(u8),
}

impl From<u8> for AttErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ATT_ECODE_INVALID_HANDLE => AttErrorCode::InvalidHandle,
            ATT_ECODE_READ_NOT_PERMITTED => AttErrorCode::ReadNotPermitted,
            ATT_ECODE_WRITE_NOT_PERMITTED => AttErrorCode::WriteNotPermitted,
            ATT_ECODE_INVALID_PDU => AttErrorCode::InvalidPdu,
            ATT_ECODE_REQUEST_NOT_SUPPORTED => AttErrorCode::RequestNotSupported,
            ATT_ECODE_INVALID_OFFSET => AttErrorCode::InvalidOffset,
            ATT_ECODE_ATTRIBUTE_NOT_FOUND => AttErrorCode::AttributeNotFound,
            ATT_ECODE_ATTRIBUTE_NOT_LONG => AttErrorCode::AttributeNotLong,
            ATT_ECODE_UNLIKELY => AttErrorCode::Unlikely,
            ATT_ECODE_UNSUPPORTED_GROUP_TYPE => AttErrorCode::UnsupportedGroupType,
            ATT_ECODE_INSUFFICIENT_RESOURCES => AttErrorCode::InsufficientResources,
            other => AttErrorCode::Unknown(other),
        }
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> u8 {
        match code {
            AttErrorCode::InvalidHandle => ATT_ECODE_INVALID_HANDLE,
            AttErrorCode::ReadNotPermitted => ATT_ECODE_READ_NOT_PERMITTED,
            AttErrorCode::WriteNotPermitted => ATT_ECODE_WRITE_NOT_PERMITTED,
            AttErrorCode::InvalidPdu => ATT_ECODE_INVALID_PDU,
            AttErrorCode::RequestNotSupported => ATT_ECODE_REQUEST_NOT_SUPPORTED,
            AttErrorCode::InvalidOffset => ATT_ECODE_INVALID_OFFSET,
            AttErrorCode::AttributeNotFound => ATT_ECODE_ATTRIBUTE_NOT_FOUND,
            AttErrorCode::AttributeNotLong => ATT_ECODE_ATTRIBUTE_NOT_LONG,
            AttErrorCode::Unlikely => ATT_ECODE_UNLIKELY,
            AttErrorCode::UnsupportedGroupType => ATT_ECODE_UNSUPPORTED_GROUP_TYPE,
            AttErrorCode::InsufficientResources => ATT_ECODE_INSUFFICIENT_RESOURCES,
            AttErrorCode::Unknown(code) => code,
        }
    }
}

/// Errors produced by the ATT layer.
///
/// Protocol variants map to an error code for the wire; the remaining
/// variants only ever surface to local callers (client request failures,
/// transport loss).
#[derive(Debug, Error)]
pub enum AttError {
    #[error("ATT error {0:?} on handle 0x{1:04x}")]
    Protocol(AttErrorCode, u16),

    #[error("malformed PDU")]
    InvalidPdu,

    #[error("unsupported opcode 0x{0:02x}")]
    UnsupportedOpcode(u8),

    #[error("response opcode 0x{0:02x} does not match the pending request")]
    UnexpectedResponse(u8),

    #[error("connection closed")]
    Disconnected,

    #[error("request timed out")]
    Timeout,

    #[error("characteristic has no client characteristic configuration descriptor")]
    NoCccd,

    #[error("L2CAP write failed: {0}")]
    Transport(#[from] std::io::Error),
}

impl AttError {
    /// The error code to put in an Error Response for this error.
    pub fn ecode(&self) -> AttErrorCode {
        match self {
            AttError::Protocol(code, _) => *code,
            AttError::InvalidPdu => AttErrorCode::InvalidPdu,
            AttError::UnsupportedOpcode(_) => AttErrorCode::RequestNotSupported,
            _ => AttErrorCode::Unlikely,
        }
    }

    /// The attribute handle the error refers to, if any.
    pub fn handle(&self) -> u16 {
        match self {
            AttError::Protocol(_, handle) => *handle,
            _ => 0,
        }
    }

    /// True when this is an Error Response carrying AttributeNotFound,
    /// the normal end-of-iteration signal during discovery.
    pub fn is_attr_not_found(&self) -> bool {
        matches!(self, AttError::Protocol(AttErrorCode::AttributeNotFound, _))
    }
}

pub type AttResult<T> = Result<T, AttError>;
