//! Session state machine.
//!
//! The transition function is pure: given the current state and the session
//! flags it yields every state visited until a fixed point. Callers append the
//! result to the session's event queue.
//!
//! ```text
//! IDLE -> READY -> SYNCHRONIZED -> VISIBLE -> FOCUSED
//!   |                  |   ^          |          |
//!   v                  v   +----------+<---------+   (stopping / unmounted)
//! EXITING <- IDLE <- STOPPING
//! ```

use openxr::sys;
use serde::Serialize;

use crate::types::HmdStatus;

/// Upper bound on transitions applied by a single update. The longest path
/// through the table (FOCUSED -> ... -> EXITING) is five steps.
pub const MAX_TRANSITIONS_PER_UPDATE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// No session exists.
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    Exiting,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Synchronized => "synchronized",
            Self::Visible => "visible",
            Self::Focused => "focused",
            Self::Stopping => "stopping",
            Self::Exiting => "exiting",
        }
    }

    pub fn to_xr(self) -> sys::SessionState {
        match self {
            Self::Unknown => sys::SessionState::UNKNOWN,
            Self::Idle => sys::SessionState::IDLE,
            Self::Ready => sys::SessionState::READY,
            Self::Synchronized => sys::SessionState::SYNCHRONIZED,
            Self::Visible => sys::SessionState::VISIBLE,
            Self::Focused => sys::SessionState::FOCUSED,
            Self::Stopping => sys::SessionState::STOPPING,
            Self::Exiting => sys::SessionState::EXITING,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the transition table reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionInputs {
    pub exiting: bool,
    pub stopping: bool,
    pub frames_completed: u64,
    pub hmd: HmdStatus,
}

/// Apply one row of the transition table.
pub fn next_state(state: SessionState, inputs: &TransitionInputs) -> Option<SessionState> {
    use SessionState::*;

    match state {
        Idle if inputs.exiting => Some(Exiting),
        Idle => Some(Ready),
        Ready if inputs.frames_completed > 0 => Some(Synchronized),
        Synchronized if inputs.stopping => Some(Stopping),
        Synchronized if inputs.hmd.visible => Some(Visible),
        Visible if inputs.stopping => Some(Synchronized),
        Visible if inputs.hmd.mounted => Some(Focused),
        Focused if inputs.stopping || !inputs.hmd.mounted => Some(Visible),
        Stopping if inputs.exiting => Some(Idle),
        _ => None,
    }
}

/// Fold the transition table to a fixed point, returning the visited states in order.
pub fn advance(state: SessionState, inputs: &TransitionInputs) -> Vec<SessionState> {
    let mut visited = Vec::new();
    let mut current = state;
    while visited.len() < MAX_TRANSITIONS_PER_UPDATE {
        match next_state(current, inputs) {
            Some(next) if next != current => {
                visited.push(next);
                current = next;
            }
            _ => break,
        }
    }
    visited
}

/// Queued state change, timestamped on the SDK clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionEvent {
    pub state: SessionState,
    pub time: f64,
}
