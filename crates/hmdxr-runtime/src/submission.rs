//! Asynchronous frame submission.
//!
//! The worker thread is not started at `begin_session`: intermediary
//! compatibility layers (OpenComposite in particular) still switch graphics
//! devices after beginning the session, so the thread starts on the first
//! `wait_frame` instead.
//!
//! Only the termination flag and the pending-frame slot are shared with the
//! worker, both behind one mutex and condition variable.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::adapter::HmdSdk;
use crate::error::{XrError, XrResult};
use crate::types::FrameSubmission;

#[derive(Debug, Default)]
struct SubmissionQueue {
    terminate: bool,
    pending: Option<FrameSubmission>,
    submitted: u64,
}

#[derive(Debug, Default)]
struct SubmissionShared {
    queue: Mutex<SubmissionQueue>,
    wake: Condvar,
}

impl SubmissionShared {
    fn lock(&self) -> MutexGuard<'_, SubmissionQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SubmissionQueue>) -> MutexGuard<'a, SubmissionQueue> {
        match self.wake.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Lifecycle of the worker thread.
#[derive(Debug, Default)]
pub enum SubmissionThread {
    #[default]
    NotStarted,
    Running(JoinHandle<()>),
    Stopped,
}

pub struct SubmissionCoordinator {
    enabled: bool,
    thread: SubmissionThread,
    shared: Arc<SubmissionShared>,
    sdk: Arc<dyn HmdSdk>,
}

impl SubmissionCoordinator {
    pub fn new(sdk: Arc<dyn HmdSdk>) -> Self {
        Self {
            enabled: false,
            thread: SubmissionThread::NotStarted,
            shared: Arc::new(SubmissionShared::default()),
            sdk,
        }
    }

    /// Arm the coordinator at session begin. The thread itself starts on
    /// the next [`SubmissionCoordinator::ensure_started`].
    pub fn configure(&mut self, enabled: bool) {
        self.enabled = enabled;
        if matches!(self.thread, SubmissionThread::Stopped) {
            self.thread = SubmissionThread::NotStarted;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        matches!(self.thread, SubmissionThread::Running(_))
    }

    pub fn thread_state(&self) -> &SubmissionThread {
        &self.thread
    }

    /// Frames handed to the SDK by the worker so far.
    pub fn submitted_frames(&self) -> u64 {
        self.shared.lock().submitted
    }

    /// Launch the worker if async submission is on and it has not started yet.
    /// Returns `true` if this call started it.
    pub fn ensure_started(&mut self) -> XrResult<bool> {
        if !self.enabled || !matches!(self.thread, SubmissionThread::NotStarted) {
            return Ok(false);
        }

        {
            let mut queue = self.shared.lock();
            queue.terminate = false;
            queue.pending = None;
        }

        let shared = self.shared.clone();
        let sdk = self.sdk.clone();
        let handle = thread::Builder::new()
            .name("hmdxr-submission".to_string())
            .spawn(move || run_submission_thread(shared, sdk))
            .map_err(|err| {
                error!("failed to spawn submission thread: {err}");
                XrError::RuntimeFailure
            })?;

        info!("async submission thread started");
        self.thread = SubmissionThread::Running(handle);
        Ok(true)
    }

    /// Hand a frame to the compositor.
    ///
    /// With the worker running, waits for the previous frame to be picked up
    /// and queues this one; otherwise submits on the calling thread.
    pub fn submit(&self, frame: FrameSubmission) -> XrResult<()> {
        if !self.is_running() {
            return self.sdk.submit_frame(&frame).map_err(|err| {
                error!("frame {} submission failed: {err}", frame.frame_id);
                XrError::RuntimeFailure
            });
        }

        let mut queue = self.shared.lock();
        while queue.pending.is_some() && !queue.terminate {
            queue = self.shared.wait(queue);
        }
        if queue.terminate {
            return Err(XrError::SessionNotRunning);
        }
        queue.pending = Some(frame);
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Signal the worker under the lock, wake it and join it.
    ///
    /// No-op unless the thread is running. After return the worker is gone.
    pub fn stop(&mut self) {
        let thread = std::mem::replace(&mut self.thread, SubmissionThread::Stopped);
        let SubmissionThread::Running(handle) = thread else {
            self.thread = thread;
            return;
        };

        {
            let mut queue = self.shared.lock();
            queue.terminate = true;
            self.shared.wake.notify_all();
        }

        if handle.join().is_err() {
            error!("submission thread panicked");
        }
        info!("async submission thread stopped");
    }
}

impl Drop for SubmissionCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_submission_thread(shared: Arc<SubmissionShared>, sdk: Arc<dyn HmdSdk>) {
    debug!("submission thread running");
    loop {
        let frame = {
            let mut queue = shared.lock();
            while !queue.terminate && queue.pending.is_none() {
                queue = shared.wait(queue);
            }
            if queue.terminate {
                break;
            }
            queue.pending.take()
        };
        // Frees the slot for the next end_frame.
        shared.wake.notify_all();

        if let Some(frame) = frame {
            if let Err(err) = sdk.submit_frame(&frame) {
                warn!("async submission of frame {} failed: {err}", frame.frame_id);
            }
            shared.lock().submitted += 1;
        }
    }
    debug!("submission thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::types::{HmdStatus, SdkSwapchain, SwapchainDesc, TextureHandle};
    use openxr::sys;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingSdk {
        submitted: AtomicU64,
    }

    impl HmdSdk for CountingSdk {
        fn time_seconds(&self) -> f64 {
            0.0
        }

        fn status(&self) -> HmdStatus {
            HmdStatus::default()
        }

        fn create_texture_swapchain(&self, _: &SwapchainDesc) -> Result<SdkSwapchain, BackendError> {
            Err(BackendError::new("create texture swapchain", "unsupported"))
        }

        fn swapchain_texture(&self, _: SdkSwapchain) -> Result<TextureHandle, BackendError> {
            Err(BackendError::new("swapchain texture", "unsupported"))
        }

        fn commit_texture_swapchain(&self, _: SdkSwapchain) -> Result<(), BackendError> {
            Ok(())
        }

        fn destroy_texture_swapchain(&self, _: SdkSwapchain) {}

        fn submit_frame(&self, _: &FrameSubmission) -> Result<(), BackendError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn frame(frame_id: u64) -> FrameSubmission {
        FrameSubmission {
            frame_id,
            display_time: sys::Time::from_nanos(0),
            layers: Vec::new(),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_disabled_coordinator_submits_inline() {
        let sdk = Arc::new(CountingSdk::default());
        let mut coordinator = SubmissionCoordinator::new(sdk.clone());
        coordinator.configure(false);

        assert!(!coordinator.ensure_started().unwrap());
        coordinator.submit(frame(1)).unwrap();
        assert_eq!(sdk.submitted.load(Ordering::SeqCst), 1);
        assert!(matches!(coordinator.thread_state(), SubmissionThread::NotStarted));
    }

    #[test]
    fn test_start_is_deferred_until_requested() {
        let sdk = Arc::new(CountingSdk::default());
        let mut coordinator = SubmissionCoordinator::new(sdk);
        coordinator.configure(true);
        assert!(!coordinator.is_running());

        assert!(coordinator.ensure_started().unwrap());
        assert!(coordinator.is_running());
        assert!(!coordinator.ensure_started().unwrap());

        coordinator.stop();
        assert!(matches!(coordinator.thread_state(), SubmissionThread::Stopped));
    }

    #[test]
    fn test_worker_submits_every_frame() {
        let sdk = Arc::new(CountingSdk::default());
        let mut coordinator = SubmissionCoordinator::new(sdk.clone());
        coordinator.configure(true);
        coordinator.ensure_started().unwrap();

        for id in 0..10 {
            coordinator.submit(frame(id)).unwrap();
        }
        wait_for(|| coordinator.submitted_frames() == 10);
        assert_eq!(sdk.submitted.load(Ordering::SeqCst), 10);

        coordinator.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let sdk = Arc::new(CountingSdk::default());
        let mut coordinator = SubmissionCoordinator::new(sdk);
        coordinator.stop();
        assert!(matches!(coordinator.thread_state(), SubmissionThread::NotStarted));

        coordinator.configure(true);
        coordinator.ensure_started().unwrap();
        coordinator.stop();
        coordinator.stop();
        assert!(matches!(coordinator.thread_state(), SubmissionThread::Stopped));

        coordinator.configure(true);
        assert!(coordinator.ensure_started().unwrap());
        coordinator.stop();
    }
}
