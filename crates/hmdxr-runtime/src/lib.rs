//! OpenXR runtime core.
//!
//! Owns the instance, the single session and its state machine, the frame
//! submission thread and the session's spaces. Graphics interop, the vendor
//! HMD SDK, application swapchains and action bindings are reached through the
//! traits in [`adapter`].

#![forbid(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod guardian;
pub mod headless;
pub mod mirror;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod space;
pub mod state;
pub mod submission;
pub mod types;

pub use adapter::{ActionBinder, GraphicsInterop, HmdSdk, SwapchainManager};
pub use config::RuntimeConfig;
pub use error::{result_code, BackendError, XrError, XrResult};
pub use headless::{HeadlessGraphics, HeadlessSdk, HeadlessSwapchains, NullActionBinder};
pub use mirror::{MirrorSurface, NullSurface};
pub use runtime::{Backends, Runtime, RuntimeEvent};
pub use session::Session;
pub use settings::{ForcedInteractionProfile, SettingsSnapshot};
pub use state::SessionState;
pub use types::{
    ControllerState, FrameCounters, FrameState, GraphicsApi, GraphicsBinding, HmdStatus,
    InstanceCreateInfo, Pose, SessionCreateInfo,
};

pub use openxr::sys;
