// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial transport: a tty in raw 8N1 mode driving the frame codec.
//!
//! Reads are synchronous and boundary-preserving: one call consumes exactly
//! one frame (header, payload, CRC) from the byte stream and returns the
//! validated payload, or fails. An idle link reports `WouldBlock` after a
//! short poll so the spin loop stays responsive; once a frame has started
//! the read blocks until the frame completes. Writes emit header, payload,
//! and CRC as one frame. The fd is opened non-blocking; exact byte counts
//! come from a `poll(2)` loop.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::frame;
use crate::transport::{Transport, TransportState};

/// Byte-stream transport over a tty device.
pub struct SerialTransport {
    device: String,
    baud: u32,
    fd: RwLock<Option<OwnedFd>>,
    state: AtomicCell<TransportState>,
}

impl SerialTransport {
    /// Create a disconnected transport for `device` at `baud` (8N1, raw,
    /// no flow control).
    #[must_use]
    pub fn new(device: &str, baud: u32) -> Self {
        Self {
            device: device.to_owned(),
            baud,
            fd: RwLock::new(None),
            state: AtomicCell::new(TransportState::Disconnected),
        }
    }

    /// Device path this transport opens.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for SerialTransport {
    fn state(&self) -> TransportState {
        self.state.load()
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state);
    }

    fn connect(&self) -> Result<()> {
        let mut fd = self.fd.write();
        if fd.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.device)
            .map_err(|e| Error::ConnectError(format!("open {}: {}", self.device, e)))?;
        let owned = OwnedFd::from(file);
        configure_tty(owned.as_raw_fd(), self.baud)?;
        log::info!("[SERIAL] opened {} at {} baud", self.device, self.baud);
        *fd = Some(owned);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        if self.fd.write().take().is_some() {
            log::info!("[SERIAL] closed {}", self.device);
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let guard = self.fd.read();
        let fd = guard
            .as_ref()
            .ok_or_else(|| Error::InvalidState("serial device not open".into()))?;
        read_frame(fd.as_raw_fd(), buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let guard = self.fd.read();
        let fd = guard
            .as_ref()
            .ok_or_else(|| Error::InvalidState("serial device not open".into()))?;
        write_frame(fd.as_raw_fd(), buf)
    }

    fn frame_overhead(&self) -> usize {
        frame::OVERHEAD
    }
}

/// Put the tty into raw 8N1 mode at the requested speed.
fn configure_tty(fd: libc::c_int, baud: u32) -> Result<()> {
    let speed = baud_to_speed(baud)?;

    // SAFETY: a zeroed termios is a valid out-parameter for tcgetattr.
    let mut tty: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: fd is an open tty descriptor, tty points to valid storage.
    if unsafe { libc::tcgetattr(fd, &mut tty) } != 0 {
        return Err(Error::ConnectError(format!(
            "tcgetattr: {}",
            std::io::Error::last_os_error()
        )));
    }

    // SAFETY: tty was filled by tcgetattr above.
    unsafe {
        libc::cfsetospeed(&mut tty, speed);
        libc::cfsetispeed(&mut tty, speed);
    }

    // 8 data bits, no parity, 1 stop bit, no hardware flow control.
    tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
    tty.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
    // Raw input: no canonical mode, echo, or signal characters.
    tty.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ECHONL | libc::ISIG);
    // No software flow control or input translation.
    tty.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    tty.c_iflag &=
        !(libc::IGNBRK | libc::BRKINT | libc::PARMRK | libc::ISTRIP | libc::INLCR | libc::IGNCR | libc::ICRNL);
    // Raw output.
    tty.c_oflag &= !(libc::OPOST | libc::ONLCR);
    tty.c_cc[libc::VTIME] = 0;
    tty.c_cc[libc::VMIN] = 0;

    // SAFETY: fd is an open tty descriptor, tty holds the configured modes.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } != 0 {
        return Err(Error::ConnectError(format!(
            "tcsetattr: {}",
            std::io::Error::last_os_error()
        )));
    }
    // SAFETY: fd is an open tty descriptor.
    unsafe { libc::tcflush(fd, libc::TCIOFLUSH) };
    Ok(())
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        500_000 => libc::B500000,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        other => {
            return Err(Error::InvalidConfig(format!(
                "unsupported baud rate {}",
                other
            )))
        }
    };
    Ok(speed)
}

/// How long to wait for the start of a frame before reporting
/// [`Error::WouldBlock`]. Once a frame has begun, reads block until it
/// completes so the boundary is never split.
const FRAME_START_TIMEOUT_MS: libc::c_int = 100;

/// Read one complete frame from `fd` into `buf`, returning the payload
/// length. Consumes exactly header + payload + CRC bytes.
fn read_frame(fd: libc::c_int, buf: &mut [u8]) -> Result<usize> {
    if !poll_events(fd, libc::POLLIN, FRAME_START_TIMEOUT_MS)? {
        return Err(Error::WouldBlock);
    }
    let mut header = [0u8; frame::HEADER_LEN];
    read_exact(fd, &mut header)?;
    let len = frame::parse_header(&header)? as usize;
    if len > buf.len() {
        return Err(Error::InsufficientBuffer {
            needed: len,
            capacity: buf.len(),
        });
    }
    read_exact(fd, &mut buf[..len])?;
    let mut crc = [0u8; frame::CRC_LEN];
    read_exact(fd, &mut crc)?;
    frame::check(&buf[..len], u16::from_le_bytes(crc))?;
    Ok(len)
}

/// Frame and write one payload to `fd`, returning the payload length.
fn write_frame(fd: libc::c_int, payload: &[u8]) -> Result<usize> {
    if payload.is_empty() {
        return Err(Error::WriteError("empty payload".into()));
    }
    if payload.len() > frame::MAX_PAYLOAD {
        return Err(Error::InsufficientBuffer {
            needed: payload.len(),
            capacity: frame::MAX_PAYLOAD,
        });
    }
    write_all(fd, &frame::header(payload.len() as u16))?;
    write_all(fd, payload)?;
    write_all(fd, &frame::trailer(payload))?;
    Ok(payload.len())
}

/// Block until `buf` is completely filled.
fn read_exact(fd: libc::c_int, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        wait_for(fd, libc::POLLIN)?;
        let remaining = &mut buf[filled..];
        // SAFETY: remaining points into a live mutable slice of its length.
        let ret = unsafe {
            libc::read(
                fd,
                remaining.as_mut_ptr().cast::<libc::c_void>(),
                remaining.len(),
            )
        };
        match ret {
            0 => return Err(Error::ReadError("end of stream".into())),
            n if n < 0 => {
                let err = std::io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => {}
                    _ => return Err(Error::ReadError(err.to_string())),
                }
            }
            n => filled += n as usize,
        }
    }
    Ok(())
}

/// Block until `buf` is completely written.
fn write_all(fd: libc::c_int, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let remaining = &buf[written..];
        // SAFETY: remaining points into a live slice of its length.
        let ret = unsafe {
            libc::write(
                fd,
                remaining.as_ptr().cast::<libc::c_void>(),
                remaining.len(),
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => {}
                Some(libc::EAGAIN) => wait_for_write(fd)?,
                _ => return Err(Error::WriteError(err.to_string())),
            }
        } else {
            written += ret as usize;
        }
    }
    Ok(())
}

fn wait_for(fd: libc::c_int, events: libc::c_short) -> Result<()> {
    poll_events(fd, events, -1).map(|_| ())
}

/// Poll for `events`; `Ok(false)` means the timeout elapsed with no data.
/// A negative timeout blocks indefinitely.
fn poll_events(fd: libc::c_int, events: libc::c_short, timeout_ms: libc::c_int) -> Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: pollfd points to a single valid descriptor entry.
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::ReadError(format!("poll: {}", err)));
        }
        if ret == 0 {
            return Ok(false);
        }
        if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(Error::ReadError("device error or disconnected".into()));
        }
        if pollfd.revents & events != 0 {
            return Ok(true);
        }
    }
}

fn wait_for_write(fd: libc::c_int) -> Result<()> {
    wait_for(fd, libc::POLLOUT).map_err(|e| match e {
        Error::ReadError(msg) => Error::WriteError(msg),
        other => other,
    })
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    /// A unidirectional fd pair the framed read/write helpers can exercise
    /// without a tty.
    fn fd_pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0i32; 2];
        // SAFETY: fds is a valid two-element out-parameter for pipe(2).
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(ret, 0, "pipe(2) should succeed");
        // SAFETY: pipe returned two freshly opened descriptors we now own.
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    fn write_raw(fd: libc::c_int, bytes: &[u8]) {
        write_all(fd, bytes).expect("raw write should succeed");
    }

    #[test]
    fn test_frame_roundtrip_over_pipe() {
        let (rx, tx) = fd_pipe();
        let payload: Vec<u8> = (0..256).map(|_| fastrand::u8(..)).collect();
        let sent = write_frame(tx.as_raw_fd(), &payload).expect("write frame");
        assert_eq!(sent, payload.len());

        let mut buf = [0u8; 1024];
        let n = read_frame(rx.as_raw_fd(), &mut buf).expect("read frame");
        assert_eq!(&buf[..n], &payload[..]);
    }

    #[test]
    fn test_reader_accepts_payload_starting_with_magic() {
        // [0x50 0x52 0x04 0x00] DE AD BE EF [D8 7F]: the payload itself
        // begins with the magic bytes; framing is positional so the reader
        // must consume exactly 10 bytes and yield the 4-byte payload.
        let (rx, tx) = fd_pipe();
        write_raw(
            tx.as_raw_fd(),
            &[0x50, 0x52, 0x04, 0x00, 0xDE, 0xAD, 0xBE, 0xEF, 0xD8, 0x7F],
        );
        let mut buf = [0u8; 64];
        let n = read_frame(rx.as_raw_fd(), &mut buf).expect("frame should parse");
        assert_eq!(&buf[..n], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_reader_rejects_crc_mismatch() {
        let (rx, tx) = fd_pipe();
        write_raw(
            tx.as_raw_fd(),
            &[0x50, 0x52, 0x02, 0x00, 0x00, 0x01, 0x00, 0x00],
        );
        let mut buf = [0u8; 64];
        let err = read_frame(rx.as_raw_fd(), &mut buf).expect_err("bad CRC must fail");
        assert!(matches!(err, Error::Crc16Mismatch { actual: 0, .. }));
    }

    #[test]
    fn test_reader_rejects_bad_magic() {
        let (rx, tx) = fd_pipe();
        write_raw(tx.as_raw_fd(), &[0xAA, 0x52, 0x02, 0x00]);
        let mut buf = [0u8; 64];
        assert!(matches!(
            read_frame(rx.as_raw_fd(), &mut buf),
            Err(Error::InvalidHeader)
        ));
    }

    #[test]
    fn test_reader_rejects_zero_length() {
        let (rx, tx) = fd_pipe();
        write_raw(tx.as_raw_fd(), &[0x50, 0x52, 0x00, 0x00]);
        let mut buf = [0u8; 64];
        assert!(matches!(
            read_frame(rx.as_raw_fd(), &mut buf),
            Err(Error::InvalidHeader)
        ));
    }

    #[test]
    fn test_reader_rejects_oversized_payload() {
        let (rx, tx) = fd_pipe();
        write_raw(tx.as_raw_fd(), &frame::header(512));
        let mut buf = [0u8; 64];
        assert!(matches!(
            read_frame(rx.as_raw_fd(), &mut buf),
            Err(Error::InsufficientBuffer { needed: 512, capacity: 64 })
        ));
    }

    #[test]
    fn test_short_stream_is_read_error() {
        let (rx, tx) = fd_pipe();
        write_raw(tx.as_raw_fd(), &[0x50, 0x52, 0x04, 0x00, 0xDE, 0xAD]);
        drop(tx);
        let mut buf = [0u8; 64];
        assert!(matches!(
            read_frame(rx.as_raw_fd(), &mut buf),
            Err(Error::ReadError(_))
        ));
    }

    #[test]
    fn test_write_frame_rejects_empty_payload() {
        let (_rx, tx) = fd_pipe();
        assert!(matches!(
            write_frame(tx.as_raw_fd(), &[]),
            Err(Error::WriteError(_))
        ));
    }

    #[test]
    fn test_unsupported_baud_rejected() {
        assert!(matches!(
            baud_to_speed(123_456),
            Err(Error::InvalidConfig(_))
        ));
        baud_to_speed(1_152_000).expect("original default baud");
        baud_to_speed(921_600).expect("a300 baud");
    }

    #[test]
    fn test_connect_missing_device() {
        let transport = SerialTransport::new("/dev/proton-does-not-exist", 115_200);
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert!(matches!(transport.connect(), Err(Error::ConnectError(_))));
        assert_eq!(transport.frame_overhead(), frame::OVERHEAD);
    }
}
