//! Mirror-window thread lifecycle.
//!
//! The window itself (creation, rendering) is supplied by the caller as a
//! [`MirrorSurface`]. This module owns the thread, the readiness handshake and
//! the close protocol used during session teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::{BackendError, XrError, XrResult};

/// Interval of the readiness poll and of the close retries.
pub const MIRROR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A window showing the frames submitted to the compositor.
pub trait MirrorSurface: Send + 'static {
    /// Create the native window. Returns its handle.
    fn open(&mut self) -> Result<u64, BackendError>;

    fn present(&mut self, frame_id: u64);

    fn close(&mut self, window: u64);
}

impl MirrorSurface for Box<dyn MirrorSurface> {
    fn open(&mut self) -> Result<u64, BackendError> {
        (**self).open()
    }

    fn present(&mut self, frame_id: u64) {
        (**self).present(frame_id)
    }

    fn close(&mut self, window: u64) {
        (**self).close(window)
    }
}

/// Surface that presents nothing.
#[derive(Debug, Default)]
pub struct NullSurface {
    next_window: u64,
}

impl MirrorSurface for NullSurface {
    fn open(&mut self) -> Result<u64, BackendError> {
        self.next_window += 1;
        Ok(self.next_window)
    }

    fn present(&mut self, _frame_id: u64) {}

    fn close(&mut self, _window: u64) {}
}

#[derive(Debug)]
enum MirrorMessage {
    Present(u64),
    Close,
}

#[derive(Debug, Default)]
struct MirrorShared {
    ready: AtomicBool,
    window: Mutex<Option<u64>>,
    presented: AtomicU64,
}

impl MirrorShared {
    fn window(&self) -> MutexGuard<'_, Option<u64>> {
        match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// How [`MirrorWindow::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorShutdown {
    /// The window closed and the thread was joined.
    Joined,
    /// The window never reported ready in time; the thread was detached.
    Detached,
}

pub struct MirrorWindow {
    thread: Option<JoinHandle<()>>,
    shared: Arc<MirrorShared>,
    sender: Sender<MirrorMessage>,
}

impl MirrorWindow {
    pub fn spawn(surface: impl MirrorSurface) -> XrResult<Self> {
        let shared = Arc::new(MirrorShared::default());
        let (sender, receiver) = mpsc::channel();

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("hmdxr-mirror".to_string())
            .spawn(move || run_mirror_thread(surface, thread_shared, receiver))
            .map_err(|err| {
                error!("failed to spawn mirror window thread: {err}");
                XrError::RuntimeFailure
            })?;

        info!("mirror window thread started");
        Ok(Self {
            thread: Some(thread),
            shared,
            sender,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn presented_frames(&self) -> u64 {
        self.shared.presented.load(Ordering::Relaxed)
    }

    /// Wake the window for a newly submitted frame.
    pub fn present(&self, frame_id: u64) {
        // The thread may already be gone after a failed open.
        let _ = self.sender.send(MirrorMessage::Present(frame_id));
    }

    /// Wait for the window to be ready, close it and join the thread.
    ///
    /// Readiness is polled every [`MIRROR_POLL_INTERVAL`] for at most
    /// `ready_timeout`. A thread that exits without opening its window is
    /// joined at once; one that never becomes ready is detached.
    pub fn shutdown(mut self, ready_timeout: Duration) -> MirrorShutdown {
        let Some(thread) = self.thread.take() else {
            return MirrorShutdown::Joined;
        };

        let deadline = Instant::now() + ready_timeout;
        while !self.is_ready() {
            if thread.is_finished() {
                if thread.join().is_err() {
                    error!("mirror window thread panicked");
                }
                info!("mirror window thread exited before its window opened");
                return MirrorShutdown::Joined;
            }
            if Instant::now() >= deadline {
                error!(
                    timeout_ms = ready_timeout.as_millis() as u64,
                    "mirror window never became ready, detaching its thread"
                );
                if thread.is_finished() {
                    let _ = thread.join();
                }
                return MirrorShutdown::Detached;
            }
            thread::sleep(MIRROR_POLL_INTERVAL.min(ready_timeout));
        }

        while self.shared.window().is_some() && !thread.is_finished() {
            if self.sender.send(MirrorMessage::Close).is_err() {
                break;
            }
            thread::sleep(MIRROR_POLL_INTERVAL / 10);
        }

        if thread.join().is_err() {
            error!("mirror window thread panicked");
        }
        info!("mirror window thread stopped");
        MirrorShutdown::Joined
    }
}

fn run_mirror_thread(
    mut surface: impl MirrorSurface,
    shared: Arc<MirrorShared>,
    receiver: mpsc::Receiver<MirrorMessage>,
) {
    let window = match surface.open() {
        Ok(window) => window,
        Err(err) => {
            warn!("mirror window unavailable: {err}");
            return;
        }
    };
    *shared.window() = Some(window);
    shared.ready.store(true, Ordering::Release);
    debug!(window, "mirror window ready");

    loop {
        match receiver.recv_timeout(MIRROR_POLL_INTERVAL) {
            Ok(MirrorMessage::Present(frame_id)) => {
                surface.present(frame_id);
                shared.presented.fetch_add(1, Ordering::Relaxed);
            }
            Ok(MirrorMessage::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    surface.close(window);
    *shared.window() = None;
    debug!(window, "mirror window closed");
}
