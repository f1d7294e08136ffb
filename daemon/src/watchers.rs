//! Auxiliary watcher threads: pauselist/stoplist/auto-pause/auto-stop.
//!
//! Grounded in the teacher's `resource_monitor.rs` (a `sysinfo::System`
//! polled on a fixed interval from a background thread), repurposed from
//! battery/CPU-based performance-mode switching to process-name watching.
//! These threads are read-only with respect to process state: they only
//! enqueue the same internal commands a human operator could send over the
//! control socket, via `mpsc`, for the MainLoop to drain once per iteration.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// An internal command a watcher thread wants the MainLoop to act on, same
/// vocabulary as a manually-typed IPC command but never crossing the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    Pause,
    Resume,
    Stop,
}

/// Process names to watch for.
#[derive(Debug, Clone, Default)]
pub struct WatcherConfig {
    /// Presence of any of these processes triggers `stop`.
    pub stoplist: Vec<String>,
    /// Presence of any of these processes triggers `pause`; their absence
    /// while paused-by-watcher triggers `resume`.
    pub pauselist: Vec<String>,
}

impl WatcherConfig {
    pub fn is_empty(&self) -> bool {
        self.stoplist.is_empty() && self.pauselist.is_empty()
    }
}

/// Owns the watcher thread's join handle and the receiving end of its event
/// channel. Dropping this does not stop the thread; call [`Self::stop`].
pub struct WatcherHandle {
    rx: Receiver<WatcherEvent>,
    stop_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Spawn the watcher thread. A no-op config still spawns the thread (so
    /// `stop` has uniform semantics) but it never produces events.
    pub fn spawn(config: WatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let thread = thread::spawn(move || watcher_loop(config, tx, stop_rx));

        Self {
            rx,
            stop_tx,
            thread: Some(thread),
        }
    }

    /// Drain every event produced since the last call. Never blocks.
    pub fn drain(&self) -> Vec<WatcherEvent> {
        self.rx.try_iter().collect()
    }

    /// Signal the thread to exit and join it.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn watcher_loop(config: WatcherConfig, tx: Sender<WatcherEvent>, stop_rx: Receiver<()>) {
    if config.is_empty() {
        // Still honour shutdown promptly even with nothing to watch.
        let _ = stop_rx.recv();
        return;
    }

    let mut system = System::new();
    let mut paused_by_watcher = false;

    loop {
        match stop_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => return,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        system.refresh_processes(ProcessesToUpdate::All, false);
        let names: Vec<String> = system
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().to_string())
            .collect();

        if config.stoplist.iter().any(|watched| names.iter().any(|n| n == watched)) {
            log::info!("watcher: stoplist process detected, requesting shutdown");
            let _ = tx.send(WatcherEvent::Stop);
            return;
        }

        let pauselist_hit = config
            .pauselist
            .iter()
            .any(|watched| names.iter().any(|n| n == watched));

        if pauselist_hit && !paused_by_watcher {
            log::info!("watcher: pauselist process detected, pausing");
            let _ = tx.send(WatcherEvent::Pause);
            paused_by_watcher = true;
        } else if !pauselist_hit && paused_by_watcher {
            log::info!("watcher: pauselist process gone, resuming");
            let _ = tx.send(WatcherEvent::Resume);
            paused_by_watcher = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_produces_no_events() {
        let handle = WatcherHandle::spawn(WatcherConfig::default());
        thread::sleep(Duration::from_millis(50));
        assert!(handle.drain().is_empty());
        handle.stop();
    }

    #[test]
    fn stop_is_responsive() {
        let handle = WatcherHandle::spawn(WatcherConfig::default());
        let start = std::time::Instant::now();
        handle.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
