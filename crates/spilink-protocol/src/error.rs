//! Header codec error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding a header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Buffer length differs from [`crate::HEADER_SIZE`].
    #[error("header must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Length of the buffer handed in.
        actual: usize,
    },

    /// Format version is neither the protocol version nor the sentinel.
    #[error("malformed header: format version 0x{0:02X}")]
    MalformedHeader(u8),

    /// Unknown request byte in an outbound header.
    #[error("unknown request code: {0}")]
    UnknownRequest(u8),

    /// Data length exceeds [`crate::MAX_DATA_LENGTH`].
    #[error("data length too large: maximum {max} bytes, got {actual}")]
    DataTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Requested length.
        actual: usize,
    },
}
