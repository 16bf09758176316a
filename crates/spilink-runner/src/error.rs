//! Error types for the runner.
//!
//! Each failure class maps to its own process exit status through
//! [`BridgeError::exit_code`].

use std::io;
use std::path::PathBuf;

use spilink_protocol::{HeaderError, Request, Response, ResponseCode};
use thiserror::Error;

/// Failures of the SPI bus itself. The bus cannot be trusted afterwards.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device node could not be opened.
    #[error("failed to open SPI device {path}: {source}")]
    Open {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A bus parameter could not be applied or read back.
    #[error("failed to set SPI {setting}: {source}")]
    Configure {
        /// Which parameter (mode, word length, speed).
        setting: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The transfer ioctl failed.
    #[error("SPI transfer of {len} bytes failed: {source}")]
    Transfer {
        /// Requested transfer length.
        len: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Transmit and receive buffers must have the same length.
    #[error("transfer buffers differ in length: tx {tx} bytes, rx {rx} bytes")]
    BufferMismatch {
        /// Transmit buffer length.
        tx: usize,
        /// Receive buffer length.
        rx: usize,
    },
}

/// The controller answered with something the protocol does not allow.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// The receive buffer still held the sentinel header after the transfer.
    #[error("no response from controller to {request} request")]
    NoResponse {
        /// Request that went unanswered.
        request: Request,
    },

    /// Inbound header carried an unexpected format version.
    #[error("format version mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    VersionMismatch {
        /// Version this host speaks.
        expected: u8,
        /// Version received.
        actual: u8,
    },

    /// Inbound header could not be decoded.
    #[error("malformed header: {0}")]
    Malformed(HeaderError),

    /// A valid response that makes no sense for the request.
    #[error("unexpected response to {request} request: {response}")]
    UnexpectedResponse {
        /// Request that was sent.
        request: Request,
        /// What came back.
        response: Response,
    },

    /// The controller announced more reply data than fits in one transfer.
    #[error("reply of {length} bytes exceeds maximum of {max}")]
    ReplyTooLong {
        /// Announced length.
        length: usize,
        /// Maximum data length.
        max: usize,
    },
}

impl From<HeaderError> for ProtocolViolation {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::MalformedHeader(actual) => ProtocolViolation::VersionMismatch {
                expected: spilink_protocol::LINUX_FORMAT_VERSION,
                actual,
            },
            other => ProtocolViolation::Malformed(other),
        }
    }
}

/// Outcome of a failed exchange. `Busy` never surfaces here.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Bus failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol violation by the controller.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The controller refused the request with an error code.
    #[error("{request} request rejected: {code}")]
    Rejected {
        /// Request that was refused.
        request: Request,
        /// Error code returned.
        code: ResponseCode,
    },

    /// Outbound data does not fit in one transfer.
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLong {
        /// Payload length.
        len: usize,
        /// Maximum data length.
        max: usize,
    },
}

impl ExchangeError {
    /// Whether this is a protocol violation, which a session may tolerate.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ExchangeError::Protocol(_))
    }
}

/// Failures of the text channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The FIFO node could not be created.
    #[error("failed to create named pipe {path}: {source}")]
    Create {
        /// FIFO path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The FIFO could not be opened.
    #[error("failed to open named pipe {path}: {source}")]
    Open {
        /// FIFO path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Reading pending text failed.
    #[error("failed to read from channel: {0}")]
    Read(#[source] io::Error),

    /// Relaying reply text failed.
    #[error("failed to write to channel: {0}")]
    Write(#[source] io::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Config file is not valid YAML for [`crate::BridgeConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error of the bridge process.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bus setup or transfer failure outside an exchange.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed exchange.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Text channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl BridgeError {
    /// Process exit status for this failure class.
    ///
    /// | code | meaning                                   |
    /// |------|-------------------------------------------|
    /// | 1    | configuration or device setup             |
    /// | 2    | bus transfer                              |
    /// | 3    | protocol violation                        |
    /// | 4    | rejected request or unexpected response   |
    /// | 5    | named pipe creation                       |
    /// | 6    | named pipe open                           |
    /// | 7    | named pipe I/O                            |
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Config(_) => 1,
            BridgeError::Transport(err) => transport_exit_code(err),
            BridgeError::Exchange(ExchangeError::Transport(err)) => transport_exit_code(err),
            BridgeError::Exchange(ExchangeError::Protocol(ProtocolViolation::UnexpectedResponse { .. })) => 4,
            BridgeError::Exchange(ExchangeError::Protocol(_)) => 3,
            BridgeError::Exchange(ExchangeError::Rejected { .. }) => 4,
            BridgeError::Exchange(ExchangeError::PayloadTooLong { .. }) => 4,
            BridgeError::Channel(ChannelError::Create { .. }) => 5,
            BridgeError::Channel(ChannelError::Open { .. }) => 6,
            BridgeError::Channel(_) => 7,
        }
    }
}

fn transport_exit_code(err: &TransportError) -> u8 {
    match err {
        TransportError::Open { .. } | TransportError::Configure { .. } => 1,
        TransportError::Transfer { .. } | TransportError::BufferMismatch { .. } => 2,
    }
}
