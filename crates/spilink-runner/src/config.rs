//! Bridge configuration.
//!
//! Values come from built-in defaults, optionally overridden by a YAML file,
//! optionally overridden again by command-line flags.
//!
//! ```yaml
//! bus:
//!   device: /dev/spidev0.0
//!   speed_hz: 500000
//!   bits_per_word: 8
//!   mode: 0
//!   transaction_delay_ms: 20
//! channel:
//!   fifo_path: /dev/duet0
//!   reply_fifo_path: /dev/duet0.reply
//! session:
//!   poll_interval_ms: 200
//!   max_protocol_violations: 0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::default_reply_path;
use crate::error::ConfigError;

/// Default SPI device node.
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev0.0";
/// Default SPI clock in Hz.
pub const DEFAULT_SPI_SPEED_HZ: u32 = 500_000;
/// Default SPI word length.
pub const DEFAULT_BITS_PER_WORD: u8 = 8;
/// Default SPI mode.
pub const DEFAULT_SPI_MODE: u8 = 0;
/// Default pause before every transfer (milliseconds).
pub const DEFAULT_TRANSACTION_DELAY_MS: u64 = 20;
/// Default named pipe path.
pub const DEFAULT_FIFO_PATH: &str = "/dev/duet0";
/// Default pause between polls and busy retries (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Complete configuration of the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// SPI bus settings.
    pub bus: BusConfig,
    /// Text channel settings.
    pub channel: ChannelConfig,
    /// Polling loop settings.
    pub session: SessionConfig,
}

impl BridgeConfig {
    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse a configuration from YAML text. Missing fields take defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bus = &self.bus;
        if bus.speed_hz == 0 {
            return Err(ConfigError::Invalid("SPI speed must be positive".into()));
        }
        if !(1..=32).contains(&bus.bits_per_word) {
            return Err(ConfigError::Invalid(format!(
                "SPI word length must be 1-32 bits, got {}",
                bus.bits_per_word
            )));
        }
        if bus.mode > 3 {
            return Err(ConfigError::Invalid(format!(
                "SPI mode must be 0-3, got {}",
                bus.mode
            )));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        if self.channel.fifo_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("named pipe path is empty".into()));
        }
        if self.channel.reply_path() == self.channel.fifo_path {
            return Err(ConfigError::Invalid(
                "reply pipe must differ from the command pipe".into(),
            ));
        }
        Ok(())
    }
}

/// SPI bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// spidev device node.
    pub device: PathBuf,
    /// Clock speed in Hz.
    pub speed_hz: u32,
    /// Bits per word.
    pub bits_per_word: u8,
    /// SPI mode (CPOL/CPHA), 0-3.
    pub mode: u8,
    /// Minimum pause before each transfer, giving the controller time to
    /// prepare its side of the exchange.
    pub transaction_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            device: PathBuf::from(DEFAULT_SPI_DEVICE),
            speed_hz: DEFAULT_SPI_SPEED_HZ,
            bits_per_word: DEFAULT_BITS_PER_WORD,
            mode: DEFAULT_SPI_MODE,
            transaction_delay_ms: DEFAULT_TRANSACTION_DELAY_MS,
        }
    }
}

impl BusConfig {
    /// Pause before every transfer.
    pub fn transaction_delay(&self) -> Duration {
        Duration::from_millis(self.transaction_delay_ms)
    }
}

/// Text channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Where the command pipe is created.
    pub fifo_path: PathBuf,
    /// Where the reply pipe is created. Defaults to `fifo_path` with a
    /// `.reply` suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_fifo_path: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            fifo_path: PathBuf::from(DEFAULT_FIFO_PATH),
            reply_fifo_path: None,
        }
    }
}

impl ChannelConfig {
    /// Effective reply pipe location.
    pub fn reply_path(&self) -> PathBuf {
        self.reply_fifo_path
            .clone()
            .unwrap_or_else(|| default_reply_path(&self.fifo_path))
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between polls when idle, and between busy retries.
    pub poll_interval_ms: u64,
    /// Consecutive protocol violations tolerated before the session aborts.
    /// Zero aborts on the first one.
    pub max_protocol_violations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_protocol_violations: 0,
        }
    }
}

impl SessionConfig {
    /// Pause between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
