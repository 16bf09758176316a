//! Fixed-size header encoding/decoding.
//!
//! Both headers are [`HEADER_SIZE`] bytes and are laid out little-endian:
//!
//! ```text
//! outbound: +---------+---------+---------+---------+--------+--------+---------+---------+
//!           | version | request | rsvd[0] | rsvd[1] | len_lo | len_hi | rsvd_lo | rsvd_hi |
//!           +---------+---------+---------+---------+--------+--------+---------+---------+
//!
//! inbound:  +---------+---------+---------+---------+-------------------------------------+
//!           | version | rsvd[0] | rsvd[1] | rsvd[2] | response (i32 little-endian)        |
//!           +---------+---------+---------+---------+-------------------------------------+
//! ```
//!
//! The last word of the inbound header is clocked out while the controller
//! is still receiving the outbound header, so it is only meaningful once the
//! whole transfer has completed.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::HeaderError;
use crate::response::Response;

/// Request kinds a host can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// No request; used to check that the controller is there.
    None,
    /// Execute the text command carried in the data part.
    SubmitCommand,
    /// Fetch pending reply text.
    FetchReply,
    /// Stop all motion immediately.
    EmergencyStop,
}

impl Request {
    /// Wire value of this request.
    pub const fn code(self) -> u8 {
        match self {
            Request::None => REQ_NULL,
            Request::SubmitCommand => REQ_DO_COMMAND,
            Request::FetchReply => REQ_GET_REPLY,
            Request::EmergencyStop => REQ_EMERGENCY_STOP,
        }
    }
}

impl TryFrom<u8> for Request {
    type Error = HeaderError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            REQ_NULL => Ok(Request::None),
            REQ_DO_COMMAND => Ok(Request::SubmitCommand),
            REQ_GET_REPLY => Ok(Request::FetchReply),
            REQ_EMERGENCY_STOP => Ok(Request::EmergencyStop),
            other => Err(HeaderError::UnknownRequest(other)),
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::None => write!(f, "none"),
            Request::SubmitCommand => write!(f, "submit-command"),
            Request::FetchReply => write!(f, "fetch-reply"),
            Request::EmergencyStop => write!(f, "emergency-stop"),
        }
    }
}

fn check_length(buf: &[u8]) -> Result<(), HeaderError> {
    if buf.len() != HEADER_SIZE {
        return Err(HeaderError::WrongLength {
            expected: HEADER_SIZE,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn check_version(version: u8) -> Result<(), HeaderError> {
    match version {
        LINUX_FORMAT_VERSION | INVALID_FORMAT_VERSION => Ok(()),
        other => {
            log::debug!("rejecting header with format version 0x{:02X}", other);
            Err(HeaderError::MalformedHeader(other))
        }
    }
}

// ============================================================================
// Outbound Header
// ============================================================================

/// Header sent from the host to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundHeader {
    format_version: u8,
    request: Request,
    data_length: u16,
}

impl OutboundHeader {
    /// Create a header for `request` announcing `data_length` bytes of data.
    pub fn new(request: Request, data_length: usize) -> Result<Self, HeaderError> {
        if data_length > MAX_DATA_LENGTH {
            return Err(HeaderError::DataTooLong {
                max: MAX_DATA_LENGTH,
                actual: data_length,
            });
        }
        Ok(OutboundHeader {
            format_version: LINUX_FORMAT_VERSION,
            request,
            data_length: data_length as u16,
        })
    }

    /// Format version byte.
    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    /// Request kind.
    pub fn request(&self) -> Request {
        self.request
    }

    /// Announced data length.
    pub fn data_length(&self) -> usize {
        self.data_length as usize
    }

    /// Serialize into wire bytes. Reserved fields are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut dst = &mut buf[..];
        dst.put_u8(self.format_version);
        dst.put_u8(self.request.code());
        dst.put_bytes(0, 2);
        dst.put_u16_le(self.data_length);
        dst.put_u16_le(0);
        buf
    }

    /// Parse wire bytes. Reserved fields are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        check_length(buf)?;
        let mut src = buf;
        let format_version = src.get_u8();
        check_version(format_version)?;
        let request = Request::try_from(src.get_u8())?;
        src.advance(2);
        let data_length = src.get_u16_le();
        if data_length as usize > MAX_DATA_LENGTH {
            return Err(HeaderError::DataTooLong {
                max: MAX_DATA_LENGTH,
                actual: data_length as usize,
            });
        }
        Ok(OutboundHeader {
            format_version,
            request,
            data_length,
        })
    }
}

// ============================================================================
// Inbound Header
// ============================================================================

/// Header sent from the controller to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundHeader {
    format_version: u8,
    response: i32,
}

impl InboundHeader {
    /// Create a header carrying `response` in the current format version.
    pub fn new(response: Response) -> Self {
        InboundHeader {
            format_version: LINUX_FORMAT_VERSION,
            response: response.to_raw(),
        }
    }

    /// Placeholder used to pre-fill a receive buffer.
    ///
    /// If these bytes are still present after a transfer, the controller did
    /// not drive the bus.
    pub fn unanswered() -> Self {
        InboundHeader {
            format_version: INVALID_FORMAT_VERSION,
            response: RESP_EMPTY,
        }
    }

    /// Format version byte.
    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    /// Whether this header still carries the sentinel version.
    pub fn is_unanswered(&self) -> bool {
        self.format_version == INVALID_FORMAT_VERSION
    }

    /// Raw response value.
    pub fn raw_response(&self) -> i32 {
        self.response
    }

    /// Interpreted response value.
    pub fn response(&self) -> Response {
        Response::from_raw(self.response)
    }

    /// Serialize into wire bytes. Reserved fields are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut dst = &mut buf[..];
        dst.put_u8(self.format_version);
        dst.put_bytes(0, 3);
        dst.put_i32_le(self.response);
        buf
    }

    /// Parse wire bytes. Reserved fields are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        check_length(buf)?;
        let mut src = buf;
        let format_version = src.get_u8();
        check_version(format_version)?;
        src.advance(3);
        let response = src.get_i32_le();
        Ok(InboundHeader {
            format_version,
            response,
        })
    }
}
