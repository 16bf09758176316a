//! Named pipe channel against the real filesystem.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::PathBuf;

use spilink_runner::{ChannelError, FifoChannel, TextChannel};

fn fifo_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("spilink-{}-{}", name, std::process::id()))
}

#[test]
fn test_create_replaces_stale_file() {
    let path = fifo_path("stale");
    std::fs::write(&path, b"left over").unwrap();

    let channel = FifoChannel::create(&path).unwrap();

    let meta = std::fs::metadata(channel.path()).unwrap();
    assert!(meta.file_type().is_fifo());
}

#[test]
fn test_empty_fifo_reads_nothing() {
    let path = fifo_path("empty");
    let mut channel = FifoChannel::create(&path).unwrap();
    let mut buf = [0u8; 64];

    assert!(channel.read_pending(&mut buf).unwrap().is_none());
}

#[test]
fn test_client_text_is_read() {
    let path = fifo_path("client");
    let mut channel = FifoChannel::create(&path).unwrap();

    let mut client = OpenOptions::new().write(true).open(&path).unwrap();
    client.write_all(b"G28\n").unwrap();

    let mut buf = [0u8; 64];
    let n = channel.read_pending(&mut buf).unwrap().unwrap();
    assert_eq!(&buf[..n], b"G28\n");
}

#[test]
fn test_replies_reach_client() {
    let path = fifo_path("reply");
    let mut channel = FifoChannel::create(&path).unwrap();
    assert_eq!(channel.reply_path(), PathBuf::from(format!("{}.reply", path.display())));
    assert!(std::fs::metadata(channel.reply_path()).unwrap().file_type().is_fifo());

    let mut client = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(channel.reply_path())
        .unwrap();
    channel.write_all(b"ok\n").unwrap();

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ok\n");
}

#[test]
fn test_relayed_reply_is_not_read_back() {
    let path = fifo_path("echo");
    let mut channel = FifoChannel::create(&path).unwrap();

    channel.write_all(b"ok\n").unwrap();

    let mut buf = [0u8; 16];
    assert!(channel.read_pending(&mut buf).unwrap().is_none());
}

#[test]
fn test_explicit_reply_path() {
    let path = fifo_path("pair-cmd");
    let reply = fifo_path("pair-out");

    let channel = FifoChannel::create_pair(&path, &reply).unwrap();

    assert_eq!(channel.path(), path.as_path());
    assert_eq!(channel.reply_path(), reply.as_path());
    assert!(std::fs::metadata(&reply).unwrap().file_type().is_fifo());
}

#[test]
fn test_full_reply_pipe_drops_excess() {
    let path = fifo_path("full");
    let mut channel = FifoChannel::create(&path).unwrap();
    let reply = vec![b'x'; 1 << 20];

    // Larger than any pipe buffer; the overflow is dropped, not an error.
    channel.write_all(&reply).unwrap();
    channel.write_all(b"ok\n").unwrap();
}

#[test]
fn test_drop_removes_endpoint() {
    let path = fifo_path("drop");
    let channel = FifoChannel::create(&path).unwrap();
    let reply = channel.reply_path().to_path_buf();
    assert!(path.exists());
    assert!(reply.exists());

    drop(channel);

    assert!(!path.exists());
    assert!(!reply.exists());
}

#[test]
fn test_create_in_missing_directory_fails() {
    let path = fifo_path("missing-dir").join("fifo");

    let err = FifoChannel::create(&path).unwrap_err();

    assert!(matches!(err, ChannelError::Create { .. }));
}
