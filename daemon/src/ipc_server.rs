//! Synchronous, thread-per-connection Unix socket IPC server.
//!
//! Grounded in the original daemon's `ipc.c`: an acceptor thread blocks in
//! `poll()` on the listener and a shutdown pipe; each accepted connection
//! gets its own detached handler thread that reads newline-delimited
//! commands into a shared FIFO and pokes a non-blocking wakeup pipe so the
//! render thread's `poll()` returns promptly. Commands are executed on the
//! render thread, not the handler thread, since they touch GPU/Wayland state
//! that isn't thread-safe to share.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use murkwall_common::{IpcCommand, Result, WallpaperError};

use crate::frame_buffer::{set_cloexec, set_nonblocking};

const READ_BUFFER_SIZE: usize = 4096;

/// One decoded request line plus the connection to answer on.
pub struct PendingCommand {
    pub command: IpcCommand,
    pub client: UnixStream,
}

struct Queue {
    commands: VecDeque<PendingCommand>,
}

/// Owns the listening socket, the acceptor thread, and the shared inbound
/// command queue. Dropping it (via `shutdown`) tears everything down.
pub struct IpcServer {
    socket_path: PathBuf,
    queue: Arc<Mutex<Queue>>,
    wakeup_read: RawFd,
    wakeup_write: RawFd,
    shutdown_write: RawFd,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl IpcServer {
    /// Bind the socket at `path` and start the acceptor thread.
    ///
    /// Probes for a live peer first: if something is already listening on
    /// `path`, this returns a fatal error rather than silently stealing the
    /// socket out from under a running instance.
    pub fn start(path: &Path) -> Result<Self> {
        if UnixStream::connect(path).is_ok() {
            return Err(WallpaperError::fatal(format!(
                "another instance is already listening on {}",
                path.display()
            )));
        }
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path)
            .map_err(|e| WallpaperError::fatal(format!("failed to bind IPC socket {}: {e}", path.display())))?;
        set_cloexec(listener.as_raw_fd());

        let (shutdown_read, shutdown_write) = make_pipe(false)?;
        let (wakeup_read, wakeup_write) = make_pipe(true)?;

        let queue = Arc::new(Mutex::new(Queue {
            commands: VecDeque::new(),
        }));

        let acceptor_queue = queue.clone();
        let acceptor = thread::spawn(move || {
            acceptor_loop(listener, shutdown_read, wakeup_write, acceptor_queue);
            unsafe { libc::close(shutdown_read) };
        });

        Ok(Self {
            socket_path: path.to_path_buf(),
            queue,
            wakeup_read,
            wakeup_write,
            shutdown_write,
            acceptor: Some(acceptor),
        })
    }

    /// Fd to poll for readability; becomes readable whenever a command has
    /// been enqueued.
    pub fn wakeup_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.wakeup_read) }
    }

    pub fn drain_wakeup(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(self.wakeup_read, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// Drain every command currently queued.
    pub fn drain_commands(&self) -> Vec<PendingCommand> {
        let mut queue = self.queue.lock().unwrap();
        queue.commands.drain(..).collect()
    }

    /// Join the acceptor thread, close descriptors, and unlink the socket.
    pub fn shutdown(mut self) {
        let byte = [1u8];
        unsafe {
            libc::write(self.shutdown_write, byte.as_ptr() as *const libc::c_void, 1);
        }
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
        unsafe {
            libc::close(self.shutdown_write);
            libc::close(self.wakeup_read);
            libc::close(self.wakeup_write);
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn make_pipe(nonblocking_both_ends: bool) -> Result<(RawFd, RawFd)> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(WallpaperError::fatal(format!(
            "failed to create pipe: {}",
            std::io::Error::last_os_error()
        )));
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    set_cloexec(read_fd);
    set_cloexec(write_fd);
    if nonblocking_both_ends {
        set_nonblocking(read_fd);
        set_nonblocking(write_fd);
    }
    Ok((read_fd, write_fd))
}

fn acceptor_loop(listener: UnixListener, shutdown_read: RawFd, wakeup_write: RawFd, queue: Arc<Mutex<Queue>>) {
    let listen_fd = listener.as_raw_fd();

    loop {
        let mut pollfds = [
            libc::pollfd {
                fd: shutdown_read,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: listen_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("IPC acceptor poll failed: {err}");
            return;
        }

        if pollfds[0].revents & libc::POLLIN != 0 {
            return;
        }

        if pollfds[1].revents & libc::POLLIN != 0 {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let queue = queue.clone();
                    thread::spawn(move || handle_client(stream, wakeup_write, queue));
                }
                Err(e) => log::warn!("IPC accept failed: {e}"),
            }
        }
    }
}

fn handle_client(mut stream: UnixStream, wakeup_write: RawFd, queue: Arc<Mutex<Queue>>) {
    block_sigpipe();

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut pending = String::new();

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return,
        };

        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        if pending.len() > READ_BUFFER_SIZE {
            let _ = send_response(&mut stream, "ERROR: command too long\n");
            return;
        }

        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if !is_clean_line(line) {
                let _ = send_response(&mut stream, "ERROR: unknown command\n");
                continue;
            }

            let client = match stream.try_clone() {
                Ok(c) => c,
                Err(_) => return,
            };

            match IpcCommand::parse(line) {
                Some(command) => {
                    {
                        let mut queue = queue.lock().unwrap();
                        queue.commands.push_back(PendingCommand { command, client });
                    }
                    let byte = [1u8];
                    unsafe {
                        libc::write(wakeup_write, byte.as_ptr() as *const libc::c_void, 1);
                    }
                }
                None => {
                    let _ = send_response(&mut stream, "ERROR: unknown command\n");
                }
            }
        }
    }
}

fn is_clean_line(line: &str) -> bool {
    line.chars().all(|c| c == ' ' || c == '\t' || !c.is_control())
}

fn block_sigpipe() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGPIPE);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

/// Send a response with no-signal semantics. Short writes are logged; a
/// broken pipe from an already-gone client is silent.
pub fn send_response(stream: &mut UnixStream, text: &str) -> std::io::Result<()> {
    let bytes = text.as_bytes();
    let fd = stream.as_raw_fd();
    let n = unsafe {
        libc::send(
            fd,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    if n < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPIPE) {
            return Ok(());
        }
        return Err(err);
    }
    if (n as usize) < bytes.len() {
        log::warn!("short write sending IPC response ({n} of {} bytes)", bytes.len());
    }
    Ok(())
}

/// For commands that trigger a process restart or exit: send the response,
/// half-close the write side, then sleep briefly so the kernel flushes
/// before the process dies.
pub fn send_response_and_half_close(stream: &mut UnixStream, text: &str) {
    let _ = send_response(stream, text);
    let _ = stream.shutdown(std::net::Shutdown::Write);
    thread::sleep(Duration::from_millis(50));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn probes_for_live_peer_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murkwall-test.sock");

        let server = IpcServer::start(&path).unwrap();
        let second = IpcServer::start(&path);
        assert!(second.is_err());
        server.shutdown();
    }

    #[test]
    fn pipelined_commands_are_framed_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murkwall-test.sock");
        let server = IpcServer::start(&path).unwrap();

        let mut client = UnixStream::connect(&path).unwrap();
        client.write_all(b"pause\nresume\nquery\n").unwrap();

        let mut commands = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while commands.len() < 3 && std::time::Instant::now() < deadline {
            let mut pfd = libc::pollfd {
                fd: server.wakeup_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            unsafe { libc::poll(&mut pfd, 1, 50) };
            server.drain_wakeup();
            commands.extend(server.drain_commands());
        }

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].command, IpcCommand::Pause);
        assert_eq!(commands[1].command, IpcCommand::Resume);
        assert_eq!(commands[2].command, IpcCommand::Query);

        server.shutdown();
    }

    #[test]
    fn oversized_unterminated_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murkwall-test.sock");
        let server = IpcServer::start(&path).unwrap();

        let mut client = UnixStream::connect(&path).unwrap();
        let blob = vec![b'a'; 5000];
        client.write_all(&blob).unwrap();

        let mut reader = std::io::BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "ERROR: command too long\n");

        server.shutdown();
    }
}
