//! Collaborators that run without a headset or GPU.
//!
//! Used by the command-line simulator and by tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use openxr::sys;
use tracing::{debug, info};

use crate::adapter::{ActionBinder, GraphicsInterop, HmdSdk, SwapchainManager};
use crate::error::{BackendError, XrError, XrResult};
use crate::runtime::Backends;
use crate::types::{
    FrameSubmission, GraphicsApi, GraphicsBinding, HmdStatus, SdkSwapchain, SwapchainDesc,
    TextureHandle, TextureInfo,
};

/// DXGI_FORMAT_R8G8B8A8_UNORM
const RGBA8_UNORM: u32 = 28;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Width and height from a PNG IHDR chunk.
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

#[derive(Debug, Default)]
pub struct HeadlessGraphics {
    initialized: HashSet<GraphicsApi>,
    submission_device: bool,
    next_texture: u64,
    textures: HashSet<TextureHandle>,
}

impl HeadlessGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_texture(&mut self) -> TextureHandle {
        self.next_texture += 1;
        let handle = TextureHandle(self.next_texture);
        self.textures.insert(handle);
        handle
    }
}

impl GraphicsInterop for HeadlessGraphics {
    fn initialize(&mut self, binding: &GraphicsBinding) -> XrResult<()> {
        let api = binding.api().ok_or(XrError::GraphicsDeviceInvalid)?;
        self.initialized.insert(api);
        self.submission_device = true;
        info!(api = api.as_str(), "headless graphics initialized");
        Ok(())
    }

    fn cleanup(&mut self, api: GraphicsApi) {
        if self.initialized.remove(&api) {
            debug!(api = api.as_str(), "headless graphics released");
        }
    }

    fn cleanup_submission_device(&mut self) {
        if self.submission_device {
            self.submission_device = false;
            self.textures.clear();
            debug!("headless submission device released");
        }
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureInfo, BackendError> {
        let bytes = std::fs::read(path)
            .map_err(|err| BackendError::new("load texture", format!("{}: {err}", path.display())))?;
        let (width, height) = png_dimensions(&bytes)
            .ok_or_else(|| BackendError::new("load texture", "not a PNG image"))?;
        Ok(TextureInfo {
            handle: self.allocate_texture(),
            width,
            height,
            mip_levels: 1,
            format: RGBA8_UNORM,
        })
    }

    fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle) -> Result<(), BackendError> {
        if !self.textures.contains(&src) {
            return Err(BackendError::new("copy texture", format!("unknown source {src:?}")));
        }
        debug!(?dst, ?src, "headless texture copy");
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }
}

/// Simulated headset. Visibility and mount state can be flipped at runtime.
#[derive(Debug)]
pub struct HeadlessSdk {
    epoch: Instant,
    visible: AtomicBool,
    mounted: AtomicBool,
    next_swapchain: AtomicU64,
    swapchains: Mutex<HashSet<SdkSwapchain>>,
    submitted: AtomicU64,
}

impl HeadlessSdk {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            visible: AtomicBool::new(true),
            mounted: AtomicBool::new(true),
            next_swapchain: AtomicU64::new(0),
            swapchains: Mutex::new(HashSet::new()),
            submitted: AtomicU64::new(0),
        }
    }

    pub fn set_status(&self, status: HmdStatus) {
        self.visible.store(status.visible, Ordering::Release);
        self.mounted.store(status.mounted, Ordering::Release);
    }

    pub fn submitted_frames(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn live_texture_swapchains(&self) -> usize {
        match self.swapchains.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn with_swapchains<R>(&self, f: impl FnOnce(&mut HashSet<SdkSwapchain>) -> R) -> R {
        let mut guard = match self.swapchains.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Default for HeadlessSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl HmdSdk for HeadlessSdk {
    fn time_seconds(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn status(&self) -> HmdStatus {
        HmdStatus {
            visible: self.visible.load(Ordering::Acquire),
            mounted: self.mounted.load(Ordering::Acquire),
        }
    }

    fn create_texture_swapchain(&self, desc: &SwapchainDesc) -> Result<SdkSwapchain, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::new("create texture swapchain", "empty extent"));
        }
        let swapchain = SdkSwapchain(self.next_swapchain.fetch_add(1, Ordering::Relaxed) + 1);
        self.with_swapchains(|live| live.insert(swapchain));
        Ok(swapchain)
    }

    fn swapchain_texture(&self, swapchain: SdkSwapchain) -> Result<TextureHandle, BackendError> {
        if !self.with_swapchains(|live| live.contains(&swapchain)) {
            return Err(BackendError::new("swapchain texture", "unknown swapchain"));
        }
        Ok(TextureHandle(u64::MAX - swapchain.0))
    }

    fn commit_texture_swapchain(&self, swapchain: SdkSwapchain) -> Result<(), BackendError> {
        if !self.with_swapchains(|live| live.contains(&swapchain)) {
            return Err(BackendError::new("commit texture swapchain", "unknown swapchain"));
        }
        Ok(())
    }

    fn destroy_texture_swapchain(&self, swapchain: SdkSwapchain) {
        self.with_swapchains(|live| live.remove(&swapchain));
    }

    fn submit_frame(&self, frame: &FrameSubmission) -> Result<(), BackendError> {
        self.submitted.fetch_add(1, Ordering::AcqRel);
        debug!(frame_id = frame.frame_id, layers = frame.layers.len(), "headless frame submitted");
        Ok(())
    }
}

/// Application swapchains tracked by handle only.
#[derive(Debug, Default)]
pub struct HeadlessSwapchains {
    live: HashSet<sys::Swapchain>,
    next: u64,
}

impl HeadlessSwapchains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> sys::Swapchain {
        self.next += 1;
        let swapchain = sys::Swapchain::from_raw(self.next);
        self.live.insert(swapchain);
        swapchain
    }
}

impl SwapchainManager for HeadlessSwapchains {
    fn live_swapchains(&self) -> Vec<sys::Swapchain> {
        self.live.iter().copied().collect()
    }

    fn destroy_swapchain(&mut self, swapchain: sys::Swapchain) -> XrResult<()> {
        if !self.live.remove(&swapchain) {
            return Err(XrError::HandleInvalid);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullActionBinder;

impl ActionBinder for NullActionBinder {
    fn rebind_controller_actions(&mut self, side: usize) {
        debug!(side, "controller actions rebound");
    }

    fn clear_active_action_sets(&mut self) {
        debug!("active action sets cleared");
    }
}

impl Backends {
    /// Headless collaborators sharing `sdk`.
    pub fn headless(sdk: Arc<HeadlessSdk>) -> Self {
        Backends::new(
            Box::new(HeadlessGraphics::new()),
            sdk,
            Box::new(HeadlessSwapchains::new()),
            Box::new(NullActionBinder),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        assert_eq!(png_dimensions(&png_header(512, 256)), Some((512, 256)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
    }

    #[test]
    fn test_load_texture_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&png_header(64, 32)).unwrap();

        let mut graphics = HeadlessGraphics::new();
        let texture = graphics.load_texture(file.path()).unwrap();
        assert_eq!((texture.width, texture.height), (64, 32));
        assert!(graphics.copy_texture(TextureHandle(99), texture.handle).is_ok());

        graphics.release_texture(texture.handle);
        assert!(graphics.copy_texture(TextureHandle(99), texture.handle).is_err());
    }

    #[test]
    fn test_sdk_swapchain_lifecycle() {
        let sdk = HeadlessSdk::new();
        let desc = SwapchainDesc {
            width: 4,
            height: 4,
            mip_levels: 1,
            array_size: 1,
            sample_count: 1,
            format: RGBA8_UNORM,
            static_image: true,
        };
        let swapchain = sdk.create_texture_swapchain(&desc).unwrap();
        assert_eq!(sdk.live_texture_swapchains(), 1);
        sdk.commit_texture_swapchain(swapchain).unwrap();
        sdk.destroy_texture_swapchain(swapchain);
        assert_eq!(sdk.live_texture_swapchains(), 0);
        assert!(sdk.commit_texture_swapchain(swapchain).is_err());
    }

    #[test]
    fn test_swapchain_manager_removes_on_destroy() {
        let mut swapchains = HeadlessSwapchains::new();
        let first = swapchains.create();
        swapchains.create();
        swapchains.destroy_swapchain(first).unwrap();
        assert_eq!(swapchains.live_swapchains().len(), 1);
        assert_eq!(swapchains.destroy_swapchain(first), Err(XrError::HandleInvalid));
    }
}
