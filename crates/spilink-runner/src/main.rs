//! `spilink`: relay G-code text between a named pipe and a motion controller
//! attached over SPI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spilink_runner::error::{BridgeError, ExchangeError};
use spilink_runner::exchange::describe_rejection;
use spilink_runner::metric_defs::describe_metrics;
use spilink_runner::{
    BridgeConfig, ExchangeEngine, FifoChannel, Session, SpidevTransport, StopToken,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments. Flags override values from `--config`.
#[derive(Parser, Debug)]
#[command(name = "spilink", version, about = "SPI link bridge between a named pipe and a motion controller")]
struct Args {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// spidev device node.
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// SPI clock speed in Hz.
    #[arg(long)]
    speed: Option<u32>,

    /// SPI bits per word.
    #[arg(long)]
    bits: Option<u8>,

    /// SPI mode (0-3).
    #[arg(long)]
    mode: Option<u8>,

    /// Pause before every SPI transfer, in milliseconds.
    #[arg(long)]
    transaction_delay_ms: Option<u64>,

    /// Named pipe to create for command text.
    #[arg(short, long)]
    fifo: Option<PathBuf>,

    /// Named pipe to create for reply text (default: <FIFO>.reply).
    #[arg(long)]
    reply_fifo: Option<PathBuf>,

    /// Pause between polls and busy retries, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Consecutive protocol violations to tolerate before giving up.
    #[arg(long)]
    max_protocol_violations: Option<u32>,

    /// Send an emergency stop to the controller and exit.
    #[arg(long)]
    emergency_stop: bool,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Resolve the effective configuration: defaults, then file, then flags.
    fn into_config(self) -> Result<BridgeConfig, BridgeError> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_yaml_file(path)?,
            None => BridgeConfig::default(),
        };
        if let Some(device) = self.device {
            config.bus.device = device;
        }
        if let Some(speed) = self.speed {
            config.bus.speed_hz = speed;
        }
        if let Some(bits) = self.bits {
            config.bus.bits_per_word = bits;
        }
        if let Some(mode) = self.mode {
            config.bus.mode = mode;
        }
        if let Some(delay) = self.transaction_delay_ms {
            config.bus.transaction_delay_ms = delay;
        }
        if let Some(fifo) = self.fifo {
            config.channel.fifo_path = fifo;
        }
        if let Some(reply_fifo) = self.reply_fifo {
            config.channel.reply_fifo_path = Some(reply_fifo);
        }
        if let Some(interval) = self.poll_interval_ms {
            config.session.poll_interval_ms = interval;
        }
        if let Some(max) = self.max_protocol_violations {
            config.session.max_protocol_violations = max;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: BridgeConfig, emergency_stop: bool, stop: &StopToken) -> Result<(), BridgeError> {
    let transport = SpidevTransport::open(&config.bus)?;
    let mut engine = ExchangeEngine::new(transport, config.session.poll_interval());

    info!("Performing handshake with the controller...");
    engine.handshake()?;
    info!("Handshake successful");

    if emergency_stop {
        engine.emergency_stop()?;
        info!("Emergency stop sent");
        return Ok(());
    }

    let channel = FifoChannel::create_pair(&config.channel.fifo_path, config.channel.reply_path())?;
    let mut session = Session::new(engine, channel, config.session.clone());
    session.run(stop)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    describe_metrics();
    info!("spilink v{}", env!("CARGO_PKG_VERSION"));

    let emergency_stop = args.emergency_stop;
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(err.exit_code());
        }
    };

    let stop = StopToken::new();
    let handler_token = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.stop()) {
        error!("failed to install signal handler: {}", err);
        return ExitCode::from(1);
    }

    match run(config, emergency_stop, &stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            if let BridgeError::Exchange(ExchangeError::Rejected { code, .. }) = &err {
                error!("{}", describe_rejection(*code));
            }
            ExitCode::from(err.exit_code())
        }
    }
}
