//! Self-pipe signal handling.
//!
//! `SIGINT`/`SIGTERM`/`SIGQUIT` request a clean shutdown; `SIGHUP` requests
//! the same teardown but flagged as a reload so the caller can pick an exit
//! code the service manager knows to restart on. The handlers themselves
//! only write one byte to a non-blocking pipe — everything else happens on
//! the main loop thread once it observes the pipe readable, same pattern as
//! [`crate::frame_buffer::FrameBuffer`] and [`crate::ipc_server::IpcServer`].

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::OnceLock;

use crate::frame_buffer::{set_cloexec, set_nonblocking};

const BYTE_SHUTDOWN: u8 = 1;
const BYTE_RELOAD: u8 = 2;

static SIGNAL_WRITE_FD: OnceLock<RawFd> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Shutdown,
    Reload,
}

/// Owns the read end of the self-pipe. Installing a second one in the same
/// process would panic (the raw handler can only target one fd).
pub struct SignalPipe {
    read_fd: RawFd,
}

impl SignalPipe {
    pub fn install() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        for fd in [read_fd, write_fd] {
            set_cloexec(fd);
            set_nonblocking(fd);
        }

        SIGNAL_WRITE_FD
            .set(write_fd)
            .expect("SignalPipe::install called more than once");

        unsafe {
            libc::signal(libc::SIGINT, handle_shutdown as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_shutdown as libc::sighandler_t);
            libc::signal(libc::SIGQUIT, handle_shutdown as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handle_reload as libc::sighandler_t);
        }

        Ok(Self { read_fd })
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.read_fd) }
    }

    /// Drain the pipe and report the highest-priority signal seen.
    /// Shutdown always wins over reload if both arrived before we drained.
    pub fn drain(&self) -> Option<SignalKind> {
        let mut buf = [0u8; 64];
        let mut seen = None;
        loop {
            let n = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
            for &byte in &buf[..n as usize] {
                match byte {
                    BYTE_SHUTDOWN => seen = Some(SignalKind::Shutdown),
                    BYTE_RELOAD if seen.is_none() => seen = Some(SignalKind::Reload),
                    _ => {}
                }
            }
        }
        seen
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        unsafe { libc::close(self.read_fd) };
    }
}

extern "C" fn handle_shutdown(_: libc::c_int) {
    write_byte(BYTE_SHUTDOWN);
}

extern "C" fn handle_reload(_: libc::c_int) {
    write_byte(BYTE_RELOAD);
}

fn write_byte(byte: u8) {
    if let Some(&fd) = SIGNAL_WRITE_FD.get() {
        let buf = [byte];
        unsafe {
            libc::write(fd, buf.as_ptr() as *const libc::c_void, 1);
        }
    }
}
