//! Session loop.
//!
//! Each iteration first forwards any pending command text to the controller
//! and then polls the controller once for reply text. The loop is stopped
//! cooperatively through a [`StopToken`], which is only checked between
//! iterations; an exchange that has started always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use spilink_protocol::MAX_DATA_LENGTH;
use tracing::{debug, info, warn};

use crate::channel::TextChannel;
use crate::config::SessionConfig;
use crate::error::{BridgeError, ExchangeError};
use crate::exchange::ExchangeEngine;
use crate::transport::Transport;

/// Cancellation flag shared between the session and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stop_flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a token that has not been stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the session to stop after the current iteration.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}

/// Counters kept over the life of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Loop iterations completed.
    pub iterations: u64,
    /// Command chunks accepted by the controller.
    pub commands_submitted: u64,
    /// Command bytes accepted by the controller.
    pub command_bytes: u64,
    /// Replies relayed to the channel.
    pub replies_relayed: u64,
    /// Reply bytes relayed to the channel.
    pub reply_bytes: u64,
    /// Polls answered with busy.
    pub busy_polls: u64,
    /// Protocol violations that did not end the session.
    pub tolerated_violations: u64,
}

/// Relays text between a [`TextChannel`] and the controller.
pub struct Session<T, C> {
    engine: ExchangeEngine<T>,
    channel: C,
    config: SessionConfig,
    buffer: Vec<u8>,
    consecutive_violations: u32,
    stats: SessionStats,
}

impl<T: Transport, C: TextChannel> Session<T, C> {
    /// Create a session over an engine that has completed its handshake.
    pub fn new(engine: ExchangeEngine<T>, channel: C, config: SessionConfig) -> Self {
        Session {
            engine,
            channel,
            config,
            buffer: vec![0u8; MAX_DATA_LENGTH],
            consecutive_violations: 0,
            stats: SessionStats::default(),
        }
    }

    /// Statistics so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The exchange engine.
    pub fn engine(&self) -> &ExchangeEngine<T> {
        &self.engine
    }

    /// The text channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Tear the session apart.
    pub fn into_parts(self) -> (ExchangeEngine<T>, C) {
        (self.engine, self.channel)
    }

    /// Run until `stop` is triggered or a fatal error occurs. A fatal error
    /// is returned unlogged for the caller to report.
    ///
    /// Dropping the session afterwards closes the bus and removes the
    /// channel endpoint.
    pub fn run(&mut self, stop: &StopToken) -> Result<SessionStats, BridgeError> {
        info!("session started");
        while !stop.is_stopped() {
            self.step()?;
        }
        info!(
            "session stopped after {} iterations: {} commands ({} bytes) submitted, {} replies ({} bytes) relayed, {} busy polls, {} tolerated protocol violations",
            self.stats.iterations,
            self.stats.commands_submitted,
            self.stats.command_bytes,
            self.stats.replies_relayed,
            self.stats.reply_bytes,
            self.stats.busy_polls,
            self.stats.tolerated_violations
        );
        Ok(self.stats)
    }

    /// Run one iteration: submit pending text, then poll for a reply.
    pub fn step(&mut self) -> Result<(), BridgeError> {
        let mut slept = false;

        match self.channel.read_pending(&mut self.buffer)? {
            Some(n) => {
                let result = self.engine.submit_command(&self.buffer[..n]);
                if self.absorb_violation(result)?.is_some() {
                    info!("TX: {}", String::from_utf8_lossy(&self.buffer[..n]).trim_end());
                    self.stats.commands_submitted += 1;
                    self.stats.command_bytes += n as u64;
                }
            }
            None => {
                thread::sleep(self.config.poll_interval());
                slept = true;
            }
        }

        let poll = self.engine.poll_reply();
        match self.absorb_violation(poll)? {
            Some(Some(reply)) if !reply.is_empty() => {
                info!("RX: {}", String::from_utf8_lossy(&reply).trim_end());
                self.channel.write_all(&reply)?;
                self.stats.replies_relayed += 1;
                self.stats.reply_bytes += reply.len() as u64;
            }
            Some(Some(_)) => {}
            Some(None) => {
                self.stats.busy_polls += 1;
                if !slept {
                    thread::sleep(self.config.poll_interval());
                }
            }
            None => {}
        }

        self.stats.iterations += 1;
        Ok(())
    }

    /// Pass successes through and decide whether a protocol violation ends
    /// the session. Tolerated violations yield `Ok(None)`.
    fn absorb_violation<R>(&mut self, result: Result<R, ExchangeError>) -> Result<Option<R>, BridgeError> {
        match result {
            Ok(value) => {
                self.consecutive_violations = 0;
                Ok(Some(value))
            }
            Err(err) if err.is_protocol_violation() => {
                self.consecutive_violations += 1;
                if self.consecutive_violations > self.config.max_protocol_violations {
                    return Err(err.into());
                }
                self.stats.tolerated_violations += 1;
                warn!(
                    "ignoring protocol violation {}/{}: {}",
                    self.consecutive_violations, self.config.max_protocol_violations, err
                );
                Ok(None)
            }
            Err(err) => {
                debug!("fatal exchange error: {:?}", err);
                Err(err.into())
            }
        }
    }
}
