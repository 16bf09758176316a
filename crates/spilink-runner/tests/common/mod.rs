//! Shared test doubles: a scripted controller, an in-memory text channel and
//! a log capture.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use spilink_protocol::{InboundHeader, OutboundHeader, Response, HEADER_SIZE, LINUX_FORMAT_VERSION};
use spilink_runner::{ChannelError, TextChannel, Transport, TransportError};

/// What the scripted controller does on its next transfer.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer a header transfer with this raw response.
    Respond(i32),
    /// Answer with these exact bytes (for malformed headers).
    Raw(Vec<u8>),
    /// Leave the receive buffer untouched.
    Silent,
    /// Fill a payload transfer with these bytes.
    Data(Vec<u8>),
    /// Accept an outbound payload transfer.
    Sink,
    /// Fail the transfer at the OS level.
    Fail,
}

impl Step {
    pub fn busy() -> Self {
        Step::Respond(Response::BUSY.to_raw())
    }

    pub fn empty() -> Self {
        Step::Respond(0)
    }
}

/// A transport that plays back a script and records everything sent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Step>,
    /// Every transmit buffer, in order.
    pub sent: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        ScriptedTransport {
            script: steps.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    /// Append more steps.
    pub fn push(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.script.extend(steps);
    }

    pub fn transfers(&self) -> usize {
        self.sent.len()
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Outbound headers decoded from header-sized transfers that carry our version.
    pub fn headers(&self) -> Vec<OutboundHeader> {
        self.sent
            .iter()
            .filter(|tx| tx.len() == HEADER_SIZE && tx[0] == LINUX_FORMAT_VERSION)
            .filter_map(|tx| OutboundHeader::decode(tx).ok())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        assert_eq!(tx.len(), rx.len(), "transfers are always symmetric");
        self.sent.push(tx.to_vec());

        let step = self.script.pop_front().unwrap_or_else(|| {
            panic!("controller script exhausted at transfer {}", self.sent.len())
        });
        match step {
            Step::Respond(raw) => {
                assert_eq!(rx.len(), HEADER_SIZE, "expected a header transfer");
                rx.copy_from_slice(&InboundHeader::new(Response::from_raw(raw)).encode());
            }
            Step::Raw(bytes) => rx.copy_from_slice(&bytes),
            Step::Silent => {}
            Step::Data(bytes) => {
                assert_eq!(rx.len(), bytes.len(), "payload transfer length");
                rx.copy_from_slice(&bytes);
            }
            Step::Sink => {}
            Step::Fail => {
                return Err(TransportError::Transfer {
                    len: tx.len(),
                    source: io::Error::from_raw_os_error(libc::EIO),
                })
            }
        }
        Ok(())
    }
}

/// An in-memory text channel.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    /// Chunks waiting to be read, one per `read_pending` call.
    pub pending: VecDeque<Vec<u8>>,
    /// Everything written so far.
    pub written: Vec<u8>,
    /// Number of `write_all` calls.
    pub writes: usize,
    /// Fail reads with an I/O error.
    pub fail_reads: bool,
}

impl MemoryChannel {
    pub fn with_pending(chunks: &[&[u8]]) -> Self {
        MemoryChannel {
            pending: chunks.iter().map(|c| c.to_vec()).collect(),
            ..Default::default()
        }
    }
}

impl TextChannel for MemoryChannel {
    fn read_pending(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ChannelError> {
        if self.fail_reads {
            return Err(ChannelError::Read(io::Error::from_raw_os_error(libc::EBADF)));
        }
        match self.pending.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(Some(chunk.len()))
            }
            None => Ok(None),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.written.extend_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

/// Collects formatted log output in memory.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber that records every event, returning its result
/// and the log text.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&capture.0.lock().unwrap()).into_owned();
    (result, logs)
}
