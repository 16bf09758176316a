//! Response codes returned by the controller.

use crate::constants::*;

/// Status codes carried in the `response` field of an inbound header.
///
/// [`ResponseCode::Empty`] is the only non-negative code; every other
/// non-negative value is a data length (see [`Response::Length`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// No error and no data.
    Empty,
    /// The request byte was not recognised.
    UnknownCommand,
    /// The outbound header version was not accepted.
    BadHeaderVersion,
    /// The announced data length was not accepted.
    BadDataLength,
    /// The controller cannot service the request yet.
    Busy,
    /// The controller cannot produce a reply in the requested format.
    BadReplyFormatVersion,
    /// Unspecified controller failure.
    UnknownError,
    /// A negative code this host does not know about.
    Unrecognized(i32),
}

impl ResponseCode {
    /// Raw wire value of this code.
    pub const fn as_i32(self) -> i32 {
        match self {
            ResponseCode::Empty => RESP_EMPTY,
            ResponseCode::UnknownCommand => RESP_UNKNOWN_COMMAND,
            ResponseCode::BadHeaderVersion => RESP_BAD_HEADER_VERSION,
            ResponseCode::BadDataLength => RESP_BAD_DATA_LENGTH,
            ResponseCode::Busy => RESP_BUSY,
            ResponseCode::BadReplyFormatVersion => RESP_BAD_REPLY_FORMAT_VERSION,
            ResponseCode::UnknownError => RESP_UNKNOWN_ERROR,
            ResponseCode::Unrecognized(code) => code,
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseCode::Empty => "empty",
            ResponseCode::UnknownCommand => "unknown command",
            ResponseCode::BadHeaderVersion => "bad header version",
            ResponseCode::BadDataLength => "bad data length",
            ResponseCode::Busy => "busy",
            ResponseCode::BadReplyFormatVersion => "bad reply format version",
            ResponseCode::UnknownError => "unknown error",
            ResponseCode::Unrecognized(_) => "unrecognized code",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// Interpretation of the raw `response` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Response {
    /// This many data bytes follow or are available. Always non-zero.
    Length(usize),
    /// A status code; `Empty` for zero, an error otherwise.
    Code(ResponseCode),
}

impl Response {
    /// Accepted, nothing to transfer.
    pub const EMPTY: Response = Response::Code(ResponseCode::Empty);
    /// Retry later.
    pub const BUSY: Response = Response::Code(ResponseCode::Busy);

    /// Decode a raw response value.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            RESP_EMPTY => Response::EMPTY,
            n if n > 0 => Response::Length(n as usize),
            RESP_UNKNOWN_COMMAND => Response::Code(ResponseCode::UnknownCommand),
            RESP_BAD_HEADER_VERSION => Response::Code(ResponseCode::BadHeaderVersion),
            RESP_BAD_DATA_LENGTH => Response::Code(ResponseCode::BadDataLength),
            RESP_BUSY => Response::BUSY,
            RESP_BAD_REPLY_FORMAT_VERSION => Response::Code(ResponseCode::BadReplyFormatVersion),
            RESP_UNKNOWN_ERROR => Response::Code(ResponseCode::UnknownError),
            other => Response::Code(ResponseCode::Unrecognized(other)),
        }
    }

    /// Raw wire value.
    ///
    /// Lengths above `i32::MAX` saturate; they can never be produced by
    /// [`Response::from_raw`].
    pub fn to_raw(self) -> i32 {
        match self {
            Response::Length(n) => i32::try_from(n).unwrap_or(i32::MAX),
            Response::Code(code) => code.as_i32(),
        }
    }

    /// Number of data bytes announced, zero for status codes.
    pub fn data_length(self) -> usize {
        match self {
            Response::Length(n) => n,
            Response::Code(_) => 0,
        }
    }

    /// Whether the controller asked us to retry.
    pub fn is_busy(self) -> bool {
        self == Response::BUSY
    }

    /// Whether this is an error code (negative and not [`ResponseCode::Busy`]).
    pub fn is_error(self) -> bool {
        match self {
            Response::Code(ResponseCode::Empty) | Response::Code(ResponseCode::Busy) => false,
            Response::Code(_) => true,
            Response::Length(_) => false,
        }
    }
}

impl From<i32> for Response {
    fn from(raw: i32) -> Self {
        Response::from_raw(raw)
    }
}

impl From<Response> for i32 {
    fn from(response: Response) -> Self {
        response.to_raw()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Length(n) => write!(f, "{} bytes available", n),
            Response::Code(code) => write!(f, "{}", code),
        }
    }
}
