//! Interfaces to the subsystems the session core drives but does not own.

use std::path::Path;

use openxr::sys;

use crate::error::{BackendError, XrResult};
use crate::types::{
    FrameSubmission, GraphicsApi, GraphicsBinding, HmdStatus, SdkSwapchain, SwapchainDesc,
    TextureHandle, TextureInfo,
};

/// Per-API graphics initializers plus the shared submission device.
pub trait GraphicsInterop: Send {
    /// Validate the application's handles and bring up the submission device.
    /// A failure code is returned to the application unchanged.
    fn initialize(&mut self, binding: &GraphicsBinding) -> XrResult<()>;

    /// Release the resources of one API. Must be a no-op if it was never initialized.
    fn cleanup(&mut self, api: GraphicsApi);

    fn cleanup_submission_device(&mut self);

    /// Decode an image file into a texture on the submission device.
    fn load_texture(&mut self, path: &Path) -> Result<TextureInfo, BackendError>;

    fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle) -> Result<(), BackendError>;

    fn release_texture(&mut self, texture: TextureHandle);
}

/// The vendor HMD SDK. Shared with the submission thread.
pub trait HmdSdk: Send + Sync {
    /// SDK clock, in seconds.
    fn time_seconds(&self) -> f64;

    fn status(&self) -> HmdStatus;

    fn create_texture_swapchain(&self, desc: &SwapchainDesc) -> Result<SdkSwapchain, BackendError>;

    /// Texture backing the swap chain's current image.
    fn swapchain_texture(&self, swapchain: SdkSwapchain) -> Result<TextureHandle, BackendError>;

    fn commit_texture_swapchain(&self, swapchain: SdkSwapchain) -> Result<(), BackendError>;

    fn destroy_texture_swapchain(&self, swapchain: SdkSwapchain);

    fn submit_frame(&self, frame: &FrameSubmission) -> Result<(), BackendError>;
}

/// Application swapchain bookkeeping.
pub trait SwapchainManager: Send {
    fn live_swapchains(&self) -> Vec<sys::Swapchain>;

    /// Public destroy path; removes the swapchain from the live set.
    fn destroy_swapchain(&mut self, swapchain: sys::Swapchain) -> XrResult<()>;
}

/// Controller action bindings.
pub trait ActionBinder: Send {
    fn rebind_controller_actions(&mut self, side: usize);

    /// Forget the action sets the previous session synced.
    fn clear_active_action_sets(&mut self);
}
