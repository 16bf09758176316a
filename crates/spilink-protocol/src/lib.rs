//! SPI link message formats
//!
//! This crate defines the fixed-size headers exchanged between a Linux host
//! (the SPI master) and a motion controller (the SPI slave), along with the
//! response codes the controller uses to answer a request.
//!
//! # Protocol Overview
//!
//! Every exchange starts with a header transfer. Because SPI is full duplex,
//! the host clocks out its request header while the controller clocks out its
//! response header over the same cycles, so both headers have the same size:
//!
//! - **Outbound** (host → controller): format version, request kind, data length
//! - **Inbound** (controller → host): format version, response code
//!
//! A non-negative response is the number of data bytes that may follow; a
//! negative response is an error code (see [`ResponseCode`]). When a header
//! exchange is accepted, the data part is moved in a second, separately sized
//! transfer.
//!
//! # Example
//!
//! ```rust
//! use spilink_protocol::{InboundHeader, OutboundHeader, Request, Response, HEADER_SIZE};
//!
//! let header = OutboundHeader::new(Request::SubmitCommand, 4)?;
//! let wire = header.encode();
//! assert_eq!(wire.len(), HEADER_SIZE);
//!
//! let reply = InboundHeader::decode(&[0x8F, 0, 0, 0, 0, 0, 0, 0])?;
//! assert_eq!(reply.response(), Response::EMPTY);
//! # Ok::<(), spilink_protocol::HeaderError>(())
//! ```

mod constants;
mod error;
mod header;
mod response;

pub use constants::*;
pub use error::*;
pub use header::*;
pub use response::*;
