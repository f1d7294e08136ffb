//! Single-slot producer/consumer handoff between the decoder thread and the
//! renderer, plus the self-pipe the renderer polls to learn a frame arrived.
//!
//! Not a queue: [`FrameBuffer::deposit`] always replaces whatever frame is
//! currently held. The renderer may miss intermediate frames under load but
//! never observes a stale one once a newer frame has landed.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::sync::Mutex;

/// One decoded RGBA frame, owned by exactly one component at a time.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

struct Slot {
    frame: Option<Frame>,
}

/// The decoder's handoff point to the renderer.
///
/// `deposit` is called from the decoder callback thread; `take` is called
/// from the main loop thread. Both are non-blocking.
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    wakeup_write: RawFd,
    wakeup_read: RawFd,
}

impl FrameBuffer {
    /// Create a buffer with its own non-blocking self-pipe.
    pub fn new() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        for fd in [read_fd, write_fd] {
            set_cloexec(fd);
            set_nonblocking(fd);
        }
        Ok(Self {
            slot: Mutex::new(Slot { frame: None }),
            wakeup_write: write_fd,
            wakeup_read: read_fd,
        })
    }

    /// Fd the main loop polls for readability. Never readable without a
    /// pending deposit, but a deposit may coalesce with one already pending.
    pub fn wakeup_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.wakeup_read) }
    }

    /// Drain the wakeup pipe. Call once per poll wakeup before `take`.
    pub fn drain_wakeup(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.wakeup_read,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// Replace the held frame (if any) and signal the wakeup pipe.
    ///
    /// Never blocks. The wakeup write is best-effort: `EAGAIN` (pipe full)
    /// means a prior wakeup hasn't been drained yet, which is equivalent to
    /// this one having been delivered.
    pub fn deposit(&self, frame: Frame) {
        {
            let mut slot = self.slot.lock().unwrap();
            slot.frame = Some(frame);
        }
        self.signal();
    }

    fn signal(&self) {
        let byte = [1u8];
        let n = unsafe {
            libc::write(
                self.wakeup_write,
                byte.as_ptr() as *const libc::c_void,
                1,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EAGAIN) {
                log::warn!("frame buffer wakeup write failed: {err}");
            }
        }
    }

    /// Take the pending frame, if any. Non-blocking; returns `None` if no
    /// new frame has arrived since the last `take`.
    pub fn take(&self) -> Option<Frame> {
        self.slot.lock().unwrap().frame.take()
    }

    /// True without consuming — used by the renderer to decide whether a
    /// GPU upload is needed this pass.
    pub fn has_pending(&self) -> bool {
        self.slot.lock().unwrap().frame.is_some()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wakeup_read);
            libc::close(self.wakeup_write);
        }
    }
}

// SAFETY: the slot is mutex-guarded and the pipe fds are only ever read via
// syscalls; raw fds are Send/Sync-safe to share across the decoder and main
// loop threads.
unsafe impl Send for FrameBuffer {}
unsafe impl Sync for FrameBuffer {}

pub(crate) fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

pub(crate) fn set_cloexec(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD, 0);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn take_returns_none_when_empty() {
        let fb = FrameBuffer::new().unwrap();
        assert!(fb.take().is_none());
    }

    #[test]
    fn deposit_then_take_roundtrips() {
        let fb = FrameBuffer::new().unwrap();
        fb.deposit(Frame::new(2, 2, vec![0u8; 16]));
        let frame = fb.take().expect("frame present");
        assert_eq!((frame.width, frame.height), (2, 2));
        assert!(fb.take().is_none());
    }

    #[test]
    fn newest_deposit_wins() {
        let fb = FrameBuffer::new().unwrap();
        fb.deposit(Frame::new(1, 1, vec![1]));
        fb.deposit(Frame::new(1, 1, vec![2]));
        let frame = fb.take().unwrap();
        assert_eq!(frame.data, vec![2]);
        assert!(fb.take().is_none());
    }

    #[test]
    fn deposit_always_wakes_a_blocked_poll() {
        let fb = Arc::new(FrameBuffer::new().unwrap());
        let fb2 = fb.clone();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            fb2.deposit(Frame::new(1, 1, vec![9]));
        });

        let mut pfd = libc::pollfd {
            fd: fb.wakeup_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, 1000) };
        assert_eq!(rc, 1, "poll should have returned readable within timeout");
        fb.drain_wakeup();
        handle.join().unwrap();
        assert!(fb.take().is_some());
    }
}
