//! Text channel.
//!
//! The bridge exchanges command and reply text with the outside world
//! through a [`TextChannel`]. Reads never block: no pending text is not an
//! error, it just means there is nothing to submit this round. Replies
//! travel on a separate path from commands.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// A duplex byte channel with non-blocking reads.
pub trait TextChannel {
    /// Read whatever text is pending into `buf`.
    ///
    /// Returns `Ok(None)` if nothing is available right now.
    fn read_pending(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ChannelError>;

    /// Relay reply text to the other side.
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError>;
}

impl<C: TextChannel + ?Sized> TextChannel for &mut C {
    fn read_pending(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ChannelError> {
        (**self).read_pending(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(data)
    }
}

/// Suffix appended to the command pipe path to name the reply pipe.
pub const REPLY_SUFFIX: &str = ".reply";

/// Reply pipe location for a command pipe at `command_path`.
pub fn default_reply_path(command_path: &Path) -> PathBuf {
    let mut name = command_path.as_os_str().to_os_string();
    name.push(REPLY_SUFFIX);
    PathBuf::from(name)
}

/// A pair of named pipes created by the bridge and removed again when
/// dropped: clients write commands into one and read replies from the other.
///
/// Keeping the directions apart means relayed reply text can never be read
/// back as a command.
#[derive(Debug)]
pub struct FifoChannel {
    commands: Fifo,
    replies: Fifo,
}

impl FifoChannel {
    /// Create the command pipe at `path` and the reply pipe next to it
    /// (see [`default_reply_path`]).
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref();
        Self::create_pair(path, default_reply_path(path))
    }

    /// Create the command pipe and the reply pipe at explicit locations.
    pub fn create_pair(
        command_path: impl AsRef<Path>,
        reply_path: impl AsRef<Path>,
    ) -> Result<Self, ChannelError> {
        let command_path = command_path.as_ref();
        let reply_path = reply_path.as_ref();
        if command_path == reply_path {
            return Err(ChannelError::Create {
                path: reply_path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "reply pipe must differ from command pipe",
                ),
            });
        }

        let commands = Fifo::create(command_path)?;
        let replies = Fifo::create(reply_path)?;
        info!(
            "Using FIFO {} for commands, {} for replies",
            commands.path.display(),
            replies.path.display()
        );
        Ok(FifoChannel { commands, replies })
    }

    /// Location of the command pipe.
    pub fn path(&self) -> &Path {
        &self.commands.path
    }

    /// Location of the reply pipe.
    pub fn reply_path(&self) -> &Path {
        &self.replies.path
    }
}

impl TextChannel for FifoChannel {
    fn read_pending(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ChannelError> {
        match self.commands.file.read(buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(ChannelError::Read(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let mut written = 0;
        while written < data.len() {
            match self.replies.file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ChannelError::Write(e)),
            }
        }
        if written < data.len() {
            // Pipe buffer full and nobody draining it.
            warn!(
                "reply FIFO full, wrote {} of {} reply bytes, dropped the rest",
                written,
                data.len()
            );
        }
        Ok(())
    }
}

/// One named pipe, opened read/write so that it stays open while no
/// external client has it open and reads return `WouldBlock` instead of EOF.
#[derive(Debug)]
struct Fifo {
    path: PathBuf,
    file: File,
}

impl Fifo {
    /// Replace whatever is at `path` with a fresh FIFO (mode 0666) and open it.
    fn create(path: &Path) -> Result<Self, ChannelError> {
        let path = path.to_path_buf();

        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed stale node at {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(ChannelError::Create { path, source }),
        }

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| ChannelError::Create {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } < 0 {
            return Err(ChannelError::Create {
                path,
                source: io::Error::last_os_error(),
            });
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => {
                let _ = std::fs::remove_file(&path);
                return Err(ChannelError::Open { path, source });
            }
        };

        Ok(Fifo { path, file })
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove FIFO {}: {}", self.path.display(), e);
            }
        }
    }
}
