//! Protocol constants
//!
//! Wire-level values shared by both ends of the link.

/// Maximum length of the data part of an exchange.
pub const MAX_DATA_LENGTH: usize = 2048;

/// Size in bytes of both the outbound and the inbound header.
pub const HEADER_SIZE: usize = 8;

/// Format version spoken by this host.
pub const LINUX_FORMAT_VERSION: u8 = 0x8F;

/// Placeholder version written into the receive buffer before a transfer.
///
/// Must differ from every format version that has ever been issued, so a
/// controller that did not answer can be told apart from one that did.
pub const INVALID_FORMAT_VERSION: u8 = 0xC9;

// ============================================================================
// Request Codes (host → controller)
// ============================================================================

/// No request; used for the startup handshake.
pub const REQ_NULL: u8 = 0;
/// Execute the text command carried in the data part.
pub const REQ_DO_COMMAND: u8 = 1;
/// Fetch pending reply text.
pub const REQ_GET_REPLY: u8 = 2;
/// Stop all motion immediately.
pub const REQ_EMERGENCY_STOP: u8 = 3;

// ============================================================================
// Response Codes (controller → host)
// ============================================================================

/// No error and no data to return.
pub const RESP_EMPTY: i32 = 0;
/// The request byte was not recognised.
pub const RESP_UNKNOWN_COMMAND: i32 = -1;
/// The outbound header carried an unsupported format version.
pub const RESP_BAD_HEADER_VERSION: i32 = -2;
/// The announced data length was rejected.
pub const RESP_BAD_DATA_LENGTH: i32 = -3;
/// The controller cannot service the request yet.
pub const RESP_BUSY: i32 = -4;
/// The controller cannot produce a reply in the requested format.
pub const RESP_BAD_REPLY_FORMAT_VERSION: i32 = -5;
/// Any other failure on the controller side.
pub const RESP_UNKNOWN_ERROR: i32 = -6;

const _: () = assert!(MAX_DATA_LENGTH % 4 == 0, "MAX_DATA_LENGTH must be a whole number of words");
const _: () = assert!(LINUX_FORMAT_VERSION != INVALID_FORMAT_VERSION);
