//! Recording collaborators shared by the integration tests.
//!
//! Every double appends to one call log so tests can assert the order in which
//! the runtime drives its collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hmdxr_common::{MemorySettings, Settings};
use hmdxr_runtime::sys;
use hmdxr_runtime::types::{
    FrameSubmission, SdkSwapchain, SwapchainDesc, TextureHandle, TextureInfo,
};
use hmdxr_runtime::{
    ActionBinder, Backends, BackendError, GraphicsApi, GraphicsBinding, GraphicsInterop, HmdSdk,
    HmdStatus, InstanceCreateInfo, Runtime, RuntimeConfig, SessionCreateInfo, SwapchainManager,
    XrError, XrResult,
};

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct RecordingGraphics {
    pub log: CallLog,
    pub fail_initialize: Option<sys::Result>,
}

impl GraphicsInterop for RecordingGraphics {
    fn initialize(&mut self, binding: &GraphicsBinding) -> XrResult<()> {
        if let Some(code) = self.fail_initialize {
            self.log.push("initialize failed");
            return Err(XrError::Graphics(code));
        }
        let api = binding.api().ok_or(XrError::GraphicsDeviceInvalid)?;
        self.log.push(format!("initialize {}", api.as_str()));
        Ok(())
    }

    fn cleanup(&mut self, api: GraphicsApi) {
        self.log.push(format!("cleanup {}", api.as_str()));
    }

    fn cleanup_submission_device(&mut self) {
        self.log.push("cleanup submission device");
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureInfo, BackendError> {
        if !path.exists() {
            self.log.push("load texture missing");
            return Err(BackendError::new("load texture", "file not found"));
        }
        self.log.push("load texture");
        Ok(TextureInfo {
            handle: TextureHandle(500),
            width: 1024,
            height: 1024,
            mip_levels: 1,
            format: 29,
        })
    }

    fn copy_texture(&mut self, _dst: TextureHandle, _src: TextureHandle) -> Result<(), BackendError> {
        self.log.push("copy texture");
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.log.push(format!("release texture {}", texture.0));
    }
}

pub struct RecordingSdk {
    pub log: CallLog,
    visible: AtomicBool,
    mounted: AtomicBool,
    next_swapchain: AtomicU64,
    submit_delay: Duration,
    submit_started: Mutex<Option<Sender<u64>>>,
}

impl RecordingSdk {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            visible: AtomicBool::new(true),
            mounted: AtomicBool::new(true),
            next_swapchain: AtomicU64::new(0),
            submit_delay: Duration::ZERO,
            submit_started: Mutex::new(None),
        }
    }

    /// Make every submission take `delay` and report its start on the returned channel.
    pub fn with_slow_submission(mut self, delay: Duration) -> (Self, Receiver<u64>) {
        let (sender, receiver) = mpsc::channel();
        self.submit_delay = delay;
        self.submit_started = Mutex::new(Some(sender));
        (self, receiver)
    }

    pub fn set_status(&self, status: HmdStatus) {
        self.visible.store(status.visible, Ordering::SeqCst);
        self.mounted.store(status.mounted, Ordering::SeqCst);
    }
}

impl HmdSdk for RecordingSdk {
    fn time_seconds(&self) -> f64 {
        0.0
    }

    fn status(&self) -> HmdStatus {
        HmdStatus {
            visible: self.visible.load(Ordering::SeqCst),
            mounted: self.mounted.load(Ordering::SeqCst),
        }
    }

    fn create_texture_swapchain(&self, desc: &SwapchainDesc) -> Result<SdkSwapchain, BackendError> {
        let id = self.next_swapchain.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.push(format!(
            "create sdk swapchain {id} {}x{} static={}",
            desc.width, desc.height, desc.static_image
        ));
        Ok(SdkSwapchain(id))
    }

    fn swapchain_texture(&self, swapchain: SdkSwapchain) -> Result<TextureHandle, BackendError> {
        Ok(TextureHandle(1000 + swapchain.0))
    }

    fn commit_texture_swapchain(&self, swapchain: SdkSwapchain) -> Result<(), BackendError> {
        self.log.push(format!("commit sdk swapchain {}", swapchain.0));
        Ok(())
    }

    fn destroy_texture_swapchain(&self, swapchain: SdkSwapchain) {
        self.log.push(format!("destroy sdk swapchain {}", swapchain.0));
    }

    fn submit_frame(&self, frame: &FrameSubmission) -> Result<(), BackendError> {
        let thread = std::thread::current().name().unwrap_or("unnamed").to_string();
        self.log.push(format!("submit {} on {thread}", frame.frame_id));
        if let Some(sender) = self.submit_started.lock().unwrap().as_ref() {
            let _ = sender.send(frame.frame_id);
        }
        std::thread::sleep(self.submit_delay);
        self.log.push(format!("submitted {}", frame.frame_id));
        Ok(())
    }
}

pub struct RecordingSwapchains {
    pub log: CallLog,
    pub live: HashSet<sys::Swapchain>,
}

impl SwapchainManager for RecordingSwapchains {
    fn live_swapchains(&self) -> Vec<sys::Swapchain> {
        let mut live: Vec<_> = self.live.iter().copied().collect();
        live.sort_by_key(|swapchain| swapchain.into_raw());
        live
    }

    fn destroy_swapchain(&mut self, swapchain: sys::Swapchain) -> XrResult<()> {
        if !self.live.remove(&swapchain) {
            return Err(XrError::HandleInvalid);
        }
        self.log.push(format!("destroy swapchain {}", swapchain.into_raw()));
        Ok(())
    }
}

pub struct RecordingActions {
    pub log: CallLog,
}

impl ActionBinder for RecordingActions {
    fn rebind_controller_actions(&mut self, side: usize) {
        self.log.push(format!("rebind {side}"));
    }

    fn clear_active_action_sets(&mut self) {
        self.log.push("clear active action sets");
    }
}

pub struct Harness {
    pub runtime: Runtime,
    pub log: CallLog,
    pub sdk: Arc<RecordingSdk>,
    pub store: Arc<MemorySettings>,
    pub instance: sys::Instance,
    pub system: sys::SystemId,
}

pub struct HarnessBuilder {
    store: MemorySettings,
    live_swapchains: u64,
    fail_initialize: Option<sys::Result>,
    slow_submission: Option<Duration>,
    install_dir: PathBuf,
    mirror_timeout: Duration,
    max_spaces: Option<usize>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: MemorySettings::new(),
            live_swapchains: 0,
            fail_initialize: None,
            slow_submission: None,
            install_dir: PathBuf::from("/nonexistent/hmdxr"),
            mirror_timeout: Duration::from_secs(5),
            max_spaces: None,
        }
    }

    pub fn setting(mut self, key: &str, value: i64) -> Self {
        self.store = self.store.with(key, value);
        self
    }

    pub fn live_swapchains(mut self, count: u64) -> Self {
        self.live_swapchains = count;
        self
    }

    pub fn fail_initialize(mut self, code: sys::Result) -> Self {
        self.fail_initialize = Some(code);
        self
    }

    pub fn slow_submission(mut self, delay: Duration) -> Self {
        self.slow_submission = Some(delay);
        self
    }

    pub fn max_spaces(mut self, limit: usize) -> Self {
        self.max_spaces = Some(limit);
        self
    }

    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    pub fn build(self) -> (Harness, Option<Receiver<u64>>) {
        let log = CallLog::default();
        let (sdk, started) = match self.slow_submission {
            Some(delay) => {
                let (sdk, started) = RecordingSdk::new(log.clone()).with_slow_submission(delay);
                (sdk, Some(started))
            }
            None => (RecordingSdk::new(log.clone()), None),
        };
        let sdk = Arc::new(sdk);
        let store = Arc::new(self.store);

        let backends = Backends::new(
            Box::new(RecordingGraphics {
                log: log.clone(),
                fail_initialize: self.fail_initialize,
            }),
            sdk.clone(),
            Box::new(RecordingSwapchains {
                log: log.clone(),
                live: (1..=self.live_swapchains).map(sys::Swapchain::from_raw).collect(),
            }),
            Box::new(RecordingActions { log: log.clone() }),
        );
        let mut config =
            RuntimeConfig::new(self.install_dir).with_mirror_ready_timeout(self.mirror_timeout);
        if let Some(limit) = self.max_spaces {
            config = config.with_max_spaces(limit);
        }
        let mut runtime = Runtime::new(config, Settings::new(store.clone()), backends);

        let instance = runtime
            .create_instance(&InstanceCreateInfo {
                application_name: "hmdxr-tests".to_string(),
                engine_name: "none".to_string(),
                api_version: sys::Version::new(1, 0, 0),
                enabled_extensions: vec![
                    "XR_KHR_D3D11_enable".to_string(),
                    "XR_KHR_vulkan_enable2".to_string(),
                ],
            })
            .unwrap();
        let system = runtime
            .get_system(instance, sys::FormFactor::HEAD_MOUNTED_DISPLAY)
            .unwrap();

        (
            Harness {
                runtime,
                log,
                sdk,
                store,
                instance,
                system,
            },
            started,
        )
    }
}

impl Harness {
    pub fn new() -> Self {
        HarnessBuilder::new().build().0
    }

    pub fn create_info(&self) -> SessionCreateInfo {
        SessionCreateInfo {
            system_id: self.system,
            create_flags: 0,
            bindings: vec![GraphicsBinding::D3D11 { device: 0xd3d }],
        }
    }

    /// Query requirements and create a D3D11 session.
    pub fn create_session(&mut self) -> sys::Session {
        self.runtime
            .graphics_requirements(self.instance, self.system, GraphicsApi::D3D11)
            .unwrap();
        let info = self.create_info();
        self.runtime.create_session(self.instance, &info).unwrap()
    }

    pub fn begin(&mut self, session: sys::Session) {
        self.runtime
            .begin_session(session, sys::ViewConfigurationType::PRIMARY_STEREO)
            .unwrap();
    }

    pub fn run_frame(&mut self, session: sys::Session) {
        self.runtime.wait_frame(session).unwrap();
        self.runtime.begin_frame(session).unwrap();
        self.runtime
            .end_frame(session, sys::Time::from_nanos(0), Vec::new())
            .unwrap();
    }
}
