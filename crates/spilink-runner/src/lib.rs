//! SPI link runner
//!
//! Relays text between a named pipe and a motion controller attached to a
//! Linux SPI bus. The host is bus master: it pushes commands written to the
//! pipe to the controller and keeps polling the controller for reply text,
//! which it writes back to the pipe.
//!
//! The pieces, from the bus up:
//!
//! - [`transport`]: one fixed-length full-duplex transfer per call
//! - [`exchange`]: header handshake, payload transfers and the busy-retry loop
//! - [`channel`]: the text side (a FIFO on the host filesystem)
//! - [`session`]: the outer polling loop tying both together

pub mod channel;
pub mod config;
pub mod error;
pub mod exchange;
pub mod metric_defs;
pub mod session;
pub mod transport;

pub use channel::{FifoChannel, TextChannel};
pub use config::{BridgeConfig, BusConfig, ChannelConfig, SessionConfig};
pub use error::{BridgeError, ChannelError, ConfigError, ExchangeError, ProtocolViolation, TransportError};
pub use exchange::{ExchangeEngine, ExchangeState};
pub use session::{Session, SessionStats, StopToken};
pub use transport::{SpidevTransport, Transport};
