//! Exchange engine.
//!
//! Every request starts with a header exchange. The receive buffer is
//! pre-filled with [`InboundHeader::unanswered`] so a controller that never
//! drives the bus is detected instead of being read as a stale answer. The
//! inbound response then decides what happens next:
//!
//! - `Busy`: sleep for the poll interval and send the identical header again
//! - other negative codes: the request is rejected, nothing is retried
//! - `Empty` with outbound data pending: the data follows in a second transfer
//! - `N > 0` on a reply fetch: `N` bytes are read in a second transfer
//!
//! There is never more than one exchange in flight, and all buffers are
//! owned by the call that uses them.

use std::thread;
use std::time::Duration;

use spilink_protocol::{
    InboundHeader, OutboundHeader, Request, Response, ResponseCode, HEADER_SIZE,
    LINUX_FORMAT_VERSION, MAX_DATA_LENGTH,
};
use tracing::{debug, trace, warn};

use crate::error::{ExchangeError, ProtocolViolation};
use crate::metric_defs;
use crate::transport::Transport;

/// Where the engine is in the current (or last) exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No request issued yet, or the last one failed on the bus or broke
    /// the protocol.
    Idle,
    /// Header transfer in progress.
    HeaderSent,
    /// The controller asked for a retry; waiting out the poll interval.
    Busy,
    /// The last request was accepted.
    Accepted,
    /// The last request was refused with an error code.
    Rejected,
}

/// Drives the header/payload handshake over a [`Transport`].
#[derive(Debug)]
pub struct ExchangeEngine<T> {
    transport: T,
    poll_interval: Duration,
    state: ExchangeState,
    confirmed_version: Option<u8>,
    transfers: u64,
    busy_retries: u64,
}

impl<T: Transport> ExchangeEngine<T> {
    /// Create an engine that waits `poll_interval` between busy retries.
    pub fn new(transport: T, poll_interval: Duration) -> Self {
        ExchangeEngine {
            transport,
            poll_interval,
            state: ExchangeState::Idle,
            confirmed_version: None,
            transfers: 0,
            busy_retries: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Format version confirmed by [`ExchangeEngine::handshake`].
    pub fn confirmed_version(&self) -> Option<u8> {
        self.confirmed_version
    }

    /// Total transfers performed, headers and payloads alike.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Total busy responses that led to a retry.
    pub fn busy_retries(&self) -> u64 {
        self.busy_retries
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Check that a controller speaking our format version is attached.
    ///
    /// Sends a single `None` request; the controller must answer `Empty`.
    /// Busy is not retried here.
    pub fn handshake(&mut self) -> Result<u8, ExchangeError> {
        let header = OutboundHeader::new(Request::None, 0).map_err(payload_error)?;
        let response = self.exchange_header(&header)?;
        if response != Response::EMPTY {
            self.state = ExchangeState::Rejected;
            return Err(ProtocolViolation::UnexpectedResponse {
                request: Request::None,
                response,
            }
            .into());
        }
        self.state = ExchangeState::Accepted;
        self.confirmed_version = Some(LINUX_FORMAT_VERSION);
        debug!("handshake complete, format version 0x{:02X}", LINUX_FORMAT_VERSION);
        Ok(LINUX_FORMAT_VERSION)
    }

    /// Issue `request` announcing `payload`, retrying while the controller is
    /// busy, and send the payload once the header is accepted.
    ///
    /// Returns the accepting response. A non-empty payload requires the
    /// controller to answer `Empty`; anything else is a protocol violation
    /// and the payload is not sent.
    pub fn submit(&mut self, request: Request, payload: &[u8]) -> Result<Response, ExchangeError> {
        let header = OutboundHeader::new(request, payload.len()).map_err(payload_error)?;
        let response = self.request_until_accepted(&header)?;

        if !payload.is_empty() {
            if response != Response::EMPTY {
                return Err(ProtocolViolation::UnexpectedResponse { request, response }.into());
            }
            self.send_payload(payload)?;
        }
        Ok(response)
    }

    /// Submit one chunk of command text.
    pub fn submit_command(&mut self, text: &[u8]) -> Result<(), ExchangeError> {
        let response = self.submit(Request::SubmitCommand, text)?;
        if response != Response::EMPTY {
            return Err(ProtocolViolation::UnexpectedResponse {
                request: Request::SubmitCommand,
                response,
            }
            .into());
        }
        metrics::counter!(metric_defs::COMMAND_BYTES.name).increment(text.len() as u64);
        Ok(())
    }

    /// Fetch pending reply text, retrying while the controller is busy.
    ///
    /// Returns an empty buffer if there is nothing to fetch.
    pub fn fetch_reply(&mut self) -> Result<Vec<u8>, ExchangeError> {
        let response = self.submit(Request::FetchReply, &[])?;
        self.receive_reply(response)
    }

    /// Ask once for pending reply text.
    ///
    /// `Ok(None)` means the controller was busy and nothing is available
    /// yet; the request is not repeated.
    pub fn poll_reply(&mut self) -> Result<Option<Vec<u8>>, ExchangeError> {
        let header = OutboundHeader::new(Request::FetchReply, 0).map_err(payload_error)?;
        let response = self.exchange_header(&header)?;
        if response.is_busy() {
            self.state = ExchangeState::Busy;
            trace!("controller busy, no reply yet");
            return Ok(None);
        }
        self.check_rejected(Request::FetchReply, response)?;
        self.state = ExchangeState::Accepted;
        self.receive_reply(response).map(Some)
    }

    /// Stop all motion on the controller.
    pub fn emergency_stop(&mut self) -> Result<(), ExchangeError> {
        warn!("sending emergency stop");
        let response = self.submit(Request::EmergencyStop, &[])?;
        if response != Response::EMPTY {
            return Err(ProtocolViolation::UnexpectedResponse {
                request: Request::EmergencyStop,
                response,
            }
            .into());
        }
        Ok(())
    }

    // ========================================================================
    // Protocol Helpers
    // ========================================================================

    /// Send `header` until the controller answers something other than busy.
    fn request_until_accepted(&mut self, header: &OutboundHeader) -> Result<Response, ExchangeError> {
        loop {
            let response = self.exchange_header(header)?;
            if response.is_busy() {
                self.state = ExchangeState::Busy;
                self.busy_retries += 1;
                metrics::counter!(
                    metric_defs::BUSY_RETRIES.name,
                    "request" => header.request().to_string()
                )
                .increment(1);
                trace!("{} request busy, retrying in {:?}", header.request(), self.poll_interval);
                thread::sleep(self.poll_interval);
                continue;
            }
            self.check_rejected(header.request(), response)?;
            self.state = ExchangeState::Accepted;
            return Ok(response);
        }
    }

    /// One header transfer with the liveness check applied.
    fn exchange_header(&mut self, header: &OutboundHeader) -> Result<Response, ExchangeError> {
        let tx = header.encode();
        let mut rx = InboundHeader::unanswered().encode();
        debug_assert_eq!(tx.len(), HEADER_SIZE);

        self.state = ExchangeState::HeaderSent;
        if let Err(err) = self.transport.transfer(&tx, &mut rx) {
            self.state = ExchangeState::Idle;
            return Err(err.into());
        }
        self.count_transfer("header");

        let inbound = InboundHeader::decode(&rx)
            .map_err(ProtocolViolation::from)
            .and_then(|inbound| {
                if inbound.is_unanswered() {
                    Err(ProtocolViolation::NoResponse {
                        request: header.request(),
                    })
                } else {
                    Ok(inbound)
                }
            });

        match inbound {
            Ok(inbound) => {
                trace!("{} request answered: {}", header.request(), inbound.response());
                Ok(inbound.response())
            }
            Err(violation) => {
                self.state = ExchangeState::Idle;
                metrics::counter!(metric_defs::PROTOCOL_VIOLATIONS.name).increment(1);
                warn!("protocol violation: {}", violation);
                Err(violation.into())
            }
        }
    }

    fn check_rejected(&mut self, request: Request, response: Response) -> Result<(), ExchangeError> {
        if let Response::Code(code) = response {
            if response.is_error() {
                self.state = ExchangeState::Rejected;
                metrics::counter!(
                    metric_defs::REJECTED_REQUESTS.name,
                    "request" => request.to_string(),
                    "code" => code.as_i32().to_string()
                )
                .increment(1);
                return Err(ExchangeError::Rejected { request, code });
            }
        }
        Ok(())
    }

    fn send_payload(&mut self, payload: &[u8]) -> Result<(), ExchangeError> {
        let mut scratch = vec![0u8; payload.len()];
        if let Err(err) = self.transport.transfer(payload, &mut scratch) {
            self.state = ExchangeState::Idle;
            return Err(err.into());
        }
        self.count_transfer("payload");
        Ok(())
    }

    fn receive_reply(&mut self, response: Response) -> Result<Vec<u8>, ExchangeError> {
        let length = response.data_length();
        if length == 0 {
            return Ok(Vec::new());
        }
        if length > MAX_DATA_LENGTH {
            self.state = ExchangeState::Idle;
            return Err(ProtocolViolation::ReplyTooLong {
                length,
                max: MAX_DATA_LENGTH,
            }
            .into());
        }
        let tx = vec![0u8; length];
        let reply = match self.transport.exchange(&tx, length) {
            Ok(reply) => reply,
            Err(err) => {
                self.state = ExchangeState::Idle;
                return Err(err.into());
            }
        };
        self.count_transfer("payload");
        metrics::counter!(metric_defs::REPLY_BYTES.name).increment(reply.len() as u64);
        Ok(reply)
    }

    fn count_transfer(&mut self, kind: &'static str) {
        self.transfers += 1;
        metrics::counter!(metric_defs::BUS_TRANSFERS.name, "kind" => kind).increment(1);
    }
}

fn payload_error(err: spilink_protocol::HeaderError) -> ExchangeError {
    match err {
        spilink_protocol::HeaderError::DataTooLong { max, actual } => {
            ExchangeError::PayloadTooLong { len: actual, max }
        }
        other => ProtocolViolation::Malformed(other).into(),
    }
}

/// Short explanation of a rejection code, for diagnostics.
pub fn describe_rejection(code: ResponseCode) -> &'static str {
    match code {
        ResponseCode::UnknownCommand => "controller did not recognise the request",
        ResponseCode::BadHeaderVersion => "controller does not speak this header version",
        ResponseCode::BadDataLength => "controller refused the data length",
        ResponseCode::BadReplyFormatVersion => "controller cannot reply in this format",
        ResponseCode::UnknownError => "controller reported an unspecified error",
        ResponseCode::Empty | ResponseCode::Busy => "not an error",
        ResponseCode::Unrecognized(_) => "controller returned an undocumented code",
    }
}
