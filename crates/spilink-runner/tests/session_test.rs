//! Session loop behaviour with a scripted controller and an in-memory channel.

mod common;

use std::time::Duration;

use common::{capture_logs, MemoryChannel, ScriptedTransport, Step};
use spilink_protocol::{Request, ResponseCode};
use spilink_runner::{
    BridgeError, ExchangeEngine, ExchangeError, FifoChannel, Session, SessionConfig, StopToken,
    Transport, TransportError,
};

fn config(max_protocol_violations: u32) -> SessionConfig {
    SessionConfig {
        poll_interval_ms: 0,
        max_protocol_violations,
    }
}

fn session(
    steps: Vec<Step>,
    channel: MemoryChannel,
    max_protocol_violations: u32,
) -> Session<ScriptedTransport, MemoryChannel> {
    let engine = ExchangeEngine::new(ScriptedTransport::new(steps), Duration::ZERO);
    Session::new(engine, channel, config(max_protocol_violations))
}

#[test]
fn test_step_submits_then_relays_reply() {
    let mut session = session(
        vec![
            Step::empty(),
            Step::Sink,
            Step::Respond(3),
            Step::Data(b"ok\n".to_vec()),
        ],
        MemoryChannel::with_pending(&[b"G28\n"]),
        0,
    );

    session.step().unwrap();

    assert_eq!(session.channel().written, b"ok\n");
    let headers = session.engine().transport().headers();
    assert_eq!(headers[0].request(), Request::SubmitCommand);
    assert_eq!(headers[1].request(), Request::FetchReply);
    assert_eq!(session.engine().transport().transfers(), 4);

    let stats = session.stats();
    assert_eq!(stats.commands_submitted, 1);
    assert_eq!(stats.command_bytes, 4);
    assert_eq!(stats.replies_relayed, 1);
    assert_eq!(stats.reply_bytes, 3);
    assert_eq!(stats.iterations, 1);
}

#[test]
fn test_step_without_text_only_polls() {
    let mut session = session(vec![Step::empty()], MemoryChannel::default(), 0);

    session.step().unwrap();

    assert_eq!(session.engine().transport().transfers(), 1);
    assert!(session.channel().written.is_empty());
    assert_eq!(session.channel().writes, 0);
}

#[test]
fn test_busy_poll_is_not_an_error() {
    let mut session = session(vec![Step::busy(), Step::busy()], MemoryChannel::default(), 0);

    session.step().unwrap();
    session.step().unwrap();

    assert_eq!(session.stats().busy_polls, 2);
    // One poll per iteration, never repeated within it.
    assert_eq!(session.engine().transport().transfers(), 2);
}

#[test]
fn test_command_waits_out_busy_controller() {
    let mut session = session(
        vec![
            Step::busy(),
            Step::busy(),
            Step::empty(),
            Step::Sink,
            Step::empty(),
        ],
        MemoryChannel::with_pending(&[b"M114\n"]),
        0,
    );

    session.step().unwrap();

    assert_eq!(session.stats().commands_submitted, 1);
    assert_eq!(session.engine().busy_retries(), 2);
    assert_eq!(session.engine().transport().remaining(), 0);
}

#[test]
fn test_run_returns_immediately_when_stopped() {
    let mut session = session(Vec::new(), MemoryChannel::default(), 0);
    let stop = StopToken::new();
    stop.stop();

    let stats = session.run(&stop).unwrap();

    assert_eq!(stats.iterations, 0);
    assert_eq!(session.engine().transport().transfers(), 0);
}

/// Raises the stop flag from inside a transfer, as a signal handler would.
struct StopDuringTransfer {
    inner: ScriptedTransport,
    stop: StopToken,
    after: usize,
}

impl Transport for StopDuringTransfer {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        self.inner.transfer(tx, rx)?;
        if self.inner.transfers() == self.after {
            self.stop.stop();
        }
        Ok(())
    }
}

#[test]
fn test_stop_honoured_between_iterations() {
    let stop = StopToken::new();
    let transport = StopDuringTransfer {
        inner: ScriptedTransport::new(vec![Step::empty(), Step::Sink, Step::empty()]),
        stop: stop.clone(),
        // Raised during the command header; the rest of the iteration still runs.
        after: 1,
    };
    let engine = ExchangeEngine::new(transport, Duration::ZERO);
    let mut session = Session::new(engine, MemoryChannel::with_pending(&[b"G28\n"]), config(0));

    let stats = session.run(&stop).unwrap();

    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.commands_submitted, 1);
    assert_eq!(session.engine().transport().inner.transfers(), 3);
}

#[test]
fn test_shutdown_summary_reports_busy_polls_and_tolerated_violations() {
    let stop = StopToken::new();
    let transport = StopDuringTransfer {
        inner: ScriptedTransport::new(vec![Step::busy(), Step::Silent, Step::empty()]),
        stop: stop.clone(),
        after: 3,
    };
    let engine = ExchangeEngine::new(transport, Duration::ZERO);
    let mut session = Session::new(engine, MemoryChannel::default(), config(1));

    let (stats, logs) = capture_logs(|| session.run(&stop).unwrap());

    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.busy_polls, 1);
    assert_eq!(stats.tolerated_violations, 1);
    let summary = logs
        .lines()
        .find(|line| line.contains("session stopped"))
        .unwrap();
    assert!(summary.contains("1 busy polls"), "{}", summary);
    assert!(summary.contains("1 tolerated protocol violations"), "{}", summary);
}

#[test]
fn test_fatal_error_left_for_caller_to_log() {
    let mut session = session(vec![Step::Silent], MemoryChannel::default(), 0);

    let (result, logs) = capture_logs(|| session.run(&StopToken::new()));

    assert!(result.is_err());
    assert!(!logs.contains("ERROR"), "{}", logs);
}

#[test]
fn test_relayed_reply_is_never_resubmitted() {
    let path = std::env::temp_dir().join(format!("spilink-session-{}", std::process::id()));
    let channel = FifoChannel::create(&path).unwrap();
    let engine = ExchangeEngine::new(
        ScriptedTransport::new(vec![
            Step::Respond(3),
            Step::Data(b"ok\n".to_vec()),
            Step::empty(),
        ]),
        Duration::ZERO,
    );
    let mut session = Session::new(engine, channel, config(0));

    session.step().unwrap();
    // Nobody drains the reply pipe before the next iteration.
    session.step().unwrap();

    assert_eq!(session.stats().replies_relayed, 1);
    assert_eq!(session.stats().commands_submitted, 0);
    let headers = session.engine().transport().headers();
    assert_eq!(headers.len(), 2);
    assert!(headers.iter().all(|h| h.request() == Request::FetchReply));
}

#[test]
fn test_rejected_fetch_aborts_run() {
    let mut session = session(vec![Step::Respond(-6)], MemoryChannel::default(), 0);

    let err = session.run(&StopToken::new()).unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Exchange(ExchangeError::Rejected {
            code: ResponseCode::UnknownError,
            ..
        })
    ));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_violation_aborts_by_default() {
    let mut session = session(vec![Step::Silent], MemoryChannel::default(), 0);

    let err = session.run(&StopToken::new()).unwrap_err();

    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_violation_tolerated_when_configured() {
    let mut session = session(
        vec![Step::Silent, Step::Respond(2), Step::Data(b"ok".to_vec())],
        MemoryChannel::default(),
        1,
    );

    session.step().unwrap();
    session.step().unwrap();

    assert_eq!(session.stats().tolerated_violations, 1);
    assert_eq!(session.channel().written, b"ok");
}

#[test]
fn test_consecutive_violations_exceed_limit() {
    let mut session = session(vec![Step::Silent, Step::Silent], MemoryChannel::default(), 1);

    session.step().unwrap();
    let err = session.step().unwrap_err();

    assert!(matches!(err, BridgeError::Exchange(ref e) if e.is_protocol_violation()));
}

#[test]
fn test_transport_failure_is_fatal_even_when_tolerating_violations() {
    let mut session = session(vec![Step::Fail], MemoryChannel::default(), 5);

    let err = session.step().unwrap_err();

    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_channel_read_failure_is_fatal() {
    let channel = MemoryChannel {
        fail_reads: true,
        ..Default::default()
    };
    let mut session = session(Vec::new(), channel, 0);

    let err = session.run(&StopToken::new()).unwrap_err();

    assert!(matches!(err, BridgeError::Channel(_)));
    assert_eq!(err.exit_code(), 7);
    assert_eq!(session.engine().transport().transfers(), 0);
}
