//! SPI transport.
//!
//! A [`Transport`] moves exactly one fixed-length, full-duplex transfer per
//! call: `tx.len()` bytes go out while the same number of bytes come in over
//! the same clock cycles. Nothing in the receive buffer may be trusted until
//! the call returns.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::config::BusConfig;
use crate::error::TransportError;

/// A bus that performs synchronous full-duplex transfers.
pub trait Transport {
    /// Clock out `tx` while clocking `rx.len()` bytes in.
    ///
    /// `rx` must be exactly as long as `tx`. Bytes in `rx` are overwritten
    /// only by what the peripheral actually drove onto the bus.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError>;

    /// Clock out `tx` and return the bytes received concurrently.
    ///
    /// `rx_capacity` must equal `tx.len()`.
    fn exchange(&mut self, tx: &[u8], rx_capacity: usize) -> Result<Vec<u8>, TransportError> {
        if rx_capacity != tx.len() {
            return Err(TransportError::BufferMismatch {
                tx: tx.len(),
                rx: rx_capacity,
            });
        }
        let mut rx = vec![0u8; rx_capacity];
        self.transfer(tx, &mut rx)?;
        Ok(rx)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        (**self).transfer(tx, rx)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        (**self).transfer(tx, rx)
    }
}

// ============================================================================
// Linux spidev
// ============================================================================

/// `linux/spi/spidev.h` ioctl definitions.
mod spidev {
    const IOC_WRITE: u32 = 1;
    const IOC_READ: u32 = 2;
    const SPI_IOC_MAGIC: u32 = b'k' as u32;

    const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
        (dir << 30) | ((size as u32) << 16) | (SPI_IOC_MAGIC << 8) | nr
    }

    pub const SPI_IOC_WR_MODE: u32 = ioc(IOC_WRITE, 1, 1);
    pub const SPI_IOC_RD_MODE: u32 = ioc(IOC_READ, 1, 1);
    pub const SPI_IOC_WR_BITS_PER_WORD: u32 = ioc(IOC_WRITE, 3, 1);
    pub const SPI_IOC_RD_BITS_PER_WORD: u32 = ioc(IOC_READ, 3, 1);
    pub const SPI_IOC_WR_MAX_SPEED_HZ: u32 = ioc(IOC_WRITE, 4, 4);
    pub const SPI_IOC_RD_MAX_SPEED_HZ: u32 = ioc(IOC_READ, 4, 4);
    /// `SPI_IOC_MESSAGE(1)`
    pub const SPI_IOC_MESSAGE_1: u32 = ioc(IOC_WRITE, 0, std::mem::size_of::<SpiIocTransfer>());

    /// `struct spi_ioc_transfer`
    #[repr(C)]
    #[derive(Debug, Default)]
    pub struct SpiIocTransfer {
        pub tx_buf: u64,
        pub rx_buf: u64,
        pub len: u32,
        pub speed_hz: u32,
        pub delay_usecs: u16,
        pub bits_per_word: u8,
        pub cs_change: u8,
        pub tx_nbits: u8,
        pub rx_nbits: u8,
        pub word_delay_usecs: u8,
        pub pad: u8,
    }

    const _: () = assert!(std::mem::size_of::<SpiIocTransfer>() == 32);
}

/// Issue an ioctl whose argument is a pointer to `value`.
fn ioctl_ptr<T>(file: &File, request: u32, value: &mut T) -> io::Result<()> {
    // SAFETY: `value` is a live, exclusively borrowed `T` for the whole call and
    // every request passed here encodes `size_of::<T>()` as its argument size.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, value as *mut T) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Write a bus parameter, then read back what the driver actually applied.
fn apply_setting<T: Copy + PartialEq + std::fmt::Display>(
    file: &File,
    setting: &'static str,
    write_request: u32,
    read_request: u32,
    wanted: T,
) -> Result<T, TransportError> {
    let mut value = wanted;
    ioctl_ptr(file, write_request, &mut value)
        .and_then(|_| ioctl_ptr(file, read_request, &mut value))
        .map_err(|source| TransportError::Configure { setting, source })?;
    if value != wanted {
        warn!("SPI {} requested {}, driver applied {}", setting, wanted, value);
    }
    Ok(value)
}

/// A Linux spidev device node.
#[derive(Debug)]
pub struct SpidevTransport {
    file: File,
    config: BusConfig,
}

impl SpidevTransport {
    /// Open the device node and apply mode, word length and clock speed.
    pub fn open(config: &BusConfig) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|source| TransportError::Open {
                path: config.device.clone(),
                source,
            })?;

        let mut applied = config.clone();
        applied.mode = apply_setting(
            &file,
            "mode",
            spidev::SPI_IOC_WR_MODE,
            spidev::SPI_IOC_RD_MODE,
            config.mode,
        )?;
        applied.bits_per_word = apply_setting(
            &file,
            "word length",
            spidev::SPI_IOC_WR_BITS_PER_WORD,
            spidev::SPI_IOC_RD_BITS_PER_WORD,
            config.bits_per_word,
        )?;
        applied.speed_hz = apply_setting(
            &file,
            "speed",
            spidev::SPI_IOC_WR_MAX_SPEED_HZ,
            spidev::SPI_IOC_RD_MAX_SPEED_HZ,
            config.speed_hz,
        )?;

        info!(
            "Using SPI device {} (mode {}, word length {} bits, speed {} kHz)",
            applied.device.display(),
            applied.mode,
            applied.bits_per_word,
            applied.speed_hz / 1000
        );

        Ok(SpidevTransport {
            file,
            config: applied,
        })
    }

    /// Bus settings as applied by the driver.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

impl Transport for SpidevTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        if tx.len() != rx.len() {
            return Err(TransportError::BufferMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }

        thread::sleep(self.config.transaction_delay());

        let mut message = spidev::SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: self.config.speed_hz,
            bits_per_word: self.config.bits_per_word,
            ..Default::default()
        };
        trace!("SPI transfer of {} bytes", tx.len());
        ioctl_ptr(&self.file, spidev::SPI_IOC_MESSAGE_1, &mut message).map_err(|source| {
            debug!("SPI transfer failed: {}", source);
            TransportError::Transfer {
                len: tx.len(),
                source,
            }
        })
    }
}
