//! Per-session state owned by the [`Runtime`](crate::Runtime).

use std::collections::VecDeque;
use std::sync::Arc;

use openxr::sys;
use tracing::debug;

use crate::adapter::HmdSdk;
use crate::guardian::GuardianResources;
use crate::mirror::MirrorWindow;
use crate::space::SpaceRegistry;
use crate::state::{advance, SessionEvent, SessionState, TransitionInputs};
use crate::submission::SubmissionCoordinator;
use crate::types::{FrameCounters, GraphicsApi, HmdStatus, SdkSwapchain, TextureHandle};

/// Number of frame durations kept for timing statistics.
pub const FRAME_TIME_HISTORY: usize = 32;

/// Overlay swapchain installed by the application through the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayResources {
    pub swapchain: SdkSwapchain,
    pub background: Option<TextureHandle>,
}

pub struct Session {
    handle: sys::Session,
    graphics_api: GraphicsApi,
    state: SessionState,
    events: VecDeque<SessionEvent>,

    pub(crate) begun: bool,
    pub(crate) stopping: bool,
    pub(crate) exiting: bool,
    pub(crate) loss_pending: bool,

    pub(crate) counters: FrameCounters,
    start_time: f64,
    frame_times: VecDeque<f64>,
    last_frame_end: Option<f64>,

    pub(crate) spaces: SpaceRegistry,
    pub(crate) submission: SubmissionCoordinator,
    pub(crate) mirror: Option<MirrorWindow>,
    pub(crate) guardian: Option<GuardianResources>,
    pub(crate) overlay: Option<OverlayResources>,
}

impl Session {
    pub(crate) fn new(
        handle: sys::Session,
        graphics_api: GraphicsApi,
        sdk: Arc<dyn HmdSdk>,
        spaces: SpaceRegistry,
        start_time: f64,
    ) -> Self {
        Self {
            handle,
            graphics_api,
            state: SessionState::Idle,
            events: VecDeque::new(),
            begun: false,
            stopping: false,
            exiting: false,
            loss_pending: false,
            counters: FrameCounters::default(),
            start_time,
            frame_times: VecDeque::with_capacity(FRAME_TIME_HISTORY),
            last_frame_end: None,
            spaces,
            submission: SubmissionCoordinator::new(sdk),
            mirror: None,
            guardian: None,
            overlay: None,
        }
    }

    pub fn handle(&self) -> sys::Session {
        self.handle
    }

    pub fn graphics_api(&self) -> GraphicsApi {
        self.graphics_api
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_begun(&self) -> bool {
        self.begun
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    pub fn is_loss_pending(&self) -> bool {
        self.loss_pending
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn spaces(&self) -> &SpaceRegistry {
        &self.spaces
    }

    pub fn submission(&self) -> &SubmissionCoordinator {
        &self.submission
    }

    pub fn guardian(&self) -> Option<&GuardianResources> {
        self.guardian.as_ref()
    }

    pub fn overlay(&self) -> Option<&OverlayResources> {
        self.overlay.as_ref()
    }

    pub fn has_mirror_window(&self) -> bool {
        self.mirror.is_some()
    }

    /// Queued state changes not yet polled, oldest first.
    pub fn pending_events(&self) -> impl Iterator<Item = &SessionEvent> {
        self.events.iter()
    }

    pub(crate) fn pop_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Recent frame durations in seconds, oldest first.
    pub fn frame_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.frame_times.iter().copied()
    }

    pub(crate) fn record_frame_end(&mut self, now: f64) {
        if let Some(previous) = self.last_frame_end.replace(now) {
            if self.frame_times.len() == FRAME_TIME_HISTORY {
                self.frame_times.pop_front();
            }
            self.frame_times.push_back(now - previous);
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Run the transition table to a fixed point and queue one event per visited state.
    ///
    /// With `force` the current state is queued first even if nothing changes.
    pub(crate) fn update_state(&mut self, force: bool, hmd: HmdStatus, now: f64) {
        if force {
            self.events.push_back(SessionEvent {
                state: self.state,
                time: now,
            });
        }

        let inputs = TransitionInputs {
            exiting: self.exiting,
            stopping: self.stopping,
            frames_completed: self.counters.completed,
            hmd,
        };
        for next in advance(self.state, &inputs) {
            debug!(from = %self.state, to = %next, "session state changed");
            self.state = next;
            self.events.push_back(SessionEvent { state: next, time: now });
        }
    }
}
