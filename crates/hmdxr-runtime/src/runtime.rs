//! The runtime context: instance, system and the single session.

use std::collections::HashSet;
use std::sync::Arc;

use hmdxr_common::Settings;
use openxr::sys;
use tracing::{debug, error, info, warn};

use crate::adapter::{ActionBinder, GraphicsInterop, HmdSdk, SwapchainManager};
use crate::config::RuntimeConfig;
use crate::error::{XrError, XrResult};
use crate::guardian::initialize_guardian;
use crate::mirror::{MirrorShutdown, MirrorSurface, MirrorWindow, NullSurface};
use crate::session::{OverlayResources, Session};
use crate::settings::SettingsSnapshot;
use crate::space::{is_supported_reference_space, Space, SpaceKind, SpaceRegistry};
use crate::state::SessionState;
use crate::types::{
    ControllerState, FrameState, FrameSubmission, GraphicsApi, GraphicsBinding,
    InstanceCreateInfo, Pose, SdkSwapchain, SessionCreateInfo, TextureHandle,
};

pub const KHR_D3D11_ENABLE: &str = "XR_KHR_D3D11_enable";
pub const KHR_D3D12_ENABLE: &str = "XR_KHR_D3D12_enable";
pub const KHR_VULKAN_ENABLE: &str = "XR_KHR_vulkan_enable";
pub const KHR_VULKAN_ENABLE2: &str = "XR_KHR_vulkan_enable2";
pub const KHR_OPENGL_ENABLE: &str = "XR_KHR_opengl_enable";

/// Extensions an application may enable.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    KHR_D3D11_ENABLE,
    KHR_D3D12_ENABLE,
    KHR_VULKAN_ENABLE,
    KHR_VULKAN_ENABLE2,
    KHR_OPENGL_ENABLE,
    "XR_KHR_composition_layer_depth",
    "XR_KHR_composition_layer_cylinder",
    "XR_KHR_win32_convert_performance_counter_time",
];

/// Number of tracked controllers (left, right).
pub const CONTROLLER_COUNT: usize = 2;

/// Frame duration assumed until the session has timing history (90 Hz).
const DEFAULT_FRAME_DURATION: f64 = 1.0 / 90.0;

/// Builds the window used when the mirror window setting is on.
pub type MirrorSurfaceFactory = Box<dyn FnMut() -> Box<dyn MirrorSurface> + Send>;

/// Native collaborators driven by the runtime.
pub struct Backends {
    pub graphics: Box<dyn GraphicsInterop>,
    pub sdk: Arc<dyn HmdSdk>,
    pub swapchains: Box<dyn SwapchainManager>,
    pub actions: Box<dyn ActionBinder>,
    pub mirror_surface: MirrorSurfaceFactory,
}

impl Backends {
    pub fn new(
        graphics: Box<dyn GraphicsInterop>,
        sdk: Arc<dyn HmdSdk>,
        swapchains: Box<dyn SwapchainManager>,
        actions: Box<dyn ActionBinder>,
    ) -> Self {
        Self {
            graphics,
            sdk,
            swapchains,
            actions,
            mirror_surface: Box::new(|| Box::new(NullSurface::default())),
        }
    }

    pub fn with_mirror_surface(mut self, factory: MirrorSurfaceFactory) -> Self {
        self.mirror_surface = factory;
        self
    }
}

// Only one instance, system and session exist at a time, so their handles are fixed.
fn instance_handle() -> sys::Instance {
    sys::Instance::from_raw(1)
}

fn system_handle() -> sys::SystemId {
    sys::SystemId::from_raw(1)
}

fn session_handle() -> sys::Session {
    sys::Session::from_raw(1)
}

/// Event returned by [`Runtime::poll_event`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeEvent {
    SessionStateChanged {
        session: sys::Session,
        state: SessionState,
        time: sys::Time,
    },
}

pub struct Runtime {
    config: RuntimeConfig,
    settings: Settings,
    snapshot: SettingsSnapshot,

    graphics: Box<dyn GraphicsInterop>,
    sdk: Arc<dyn HmdSdk>,
    swapchains: Box<dyn SwapchainManager>,
    actions: Box<dyn ActionBinder>,
    mirror_surface: MirrorSurfaceFactory,

    instance_created: bool,
    enabled_extensions: HashSet<&'static str>,
    application_name: String,
    system_created: bool,
    graphics_requirements_queried: HashSet<GraphicsApi>,
    time_reference: f64,

    session: Option<Session>,
    /// Graphics resources left behind by a create that failed after initialization.
    orphaned_graphics: bool,
    controllers: [ControllerState; CONTROLLER_COUNT],
}

impl Runtime {
    pub fn new(config: RuntimeConfig, settings: Settings, backends: Backends) -> Self {
        let snapshot = SettingsSnapshot::load(&settings);
        Self {
            config,
            settings,
            snapshot,
            graphics: backends.graphics,
            sdk: backends.sdk,
            swapchains: backends.swapchains,
            actions: backends.actions,
            mirror_surface: backends.mirror_surface,
            instance_created: false,
            enabled_extensions: HashSet::new(),
            application_name: String::new(),
            system_created: false,
            graphics_requirements_queried: HashSet::new(),
            time_reference: 0.0,
            session: None,
            orphaned_graphics: false,
            controllers: Default::default(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn settings_snapshot(&self) -> &SettingsSnapshot {
        &self.snapshot
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current session state, [`SessionState::Unknown`] without a session.
    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(Session::state)
            .unwrap_or(SessionState::Unknown)
    }

    pub fn controller(&self, side: usize) -> Option<&ControllerState> {
        self.controllers.get(side)
    }

    /// Record the interaction profile classification derived by the input subsystem.
    pub fn cache_controller_type(&mut self, side: usize, controller_type: impl Into<String>) {
        if let Some(controller) = self.controllers.get_mut(side) {
            controller.cached_type = Some(controller_type.into());
        }
    }

    pub fn is_extension_enabled(&self, name: &str) -> bool {
        self.enabled_extensions.contains(name)
    }

    fn binding_enabled(&self, api: GraphicsApi) -> bool {
        match api {
            GraphicsApi::D3D11 => self.is_extension_enabled(KHR_D3D11_ENABLE),
            GraphicsApi::D3D12 => self.is_extension_enabled(KHR_D3D12_ENABLE),
            GraphicsApi::Vulkan => {
                self.is_extension_enabled(KHR_VULKAN_ENABLE)
                    || self.is_extension_enabled(KHR_VULKAN_ENABLE2)
            }
            GraphicsApi::OpenGl => self.is_extension_enabled(KHR_OPENGL_ENABLE),
        }
    }

    fn now(&self) -> f64 {
        self.sdk.time_seconds()
    }

    fn to_xr_time(&self, seconds: f64) -> sys::Time {
        sys::Time::from_nanos(((seconds - self.time_reference) * 1e9) as i64)
    }

    fn check_instance(&self, instance: sys::Instance) -> XrResult<()> {
        if !self.instance_created || instance != instance_handle() {
            return Err(XrError::HandleInvalid);
        }
        Ok(())
    }

    fn check_system(&self, system_id: sys::SystemId) -> XrResult<()> {
        if !self.system_created || system_id != system_handle() {
            return Err(XrError::SystemInvalid);
        }
        Ok(())
    }

    fn session_mut(&mut self, handle: sys::Session) -> XrResult<&mut Session> {
        match self.session.as_mut() {
            Some(session) if session.handle() == handle => Ok(session),
            _ => Err(XrError::HandleInvalid),
        }
    }

    /// Re-run the transition table for the live session, if any.
    fn update_session_state(&mut self, force: bool) {
        let hmd = self.sdk.status();
        let now = self.now();
        if let Some(session) = self.session.as_mut() {
            session.update_state(force, hmd, now);
        }
    }

    pub fn create_instance(&mut self, info: &InstanceCreateInfo) -> XrResult<sys::Instance> {
        if info.application_name.is_empty() {
            return Err(XrError::ValidationFailure("application name is empty"));
        }
        if self.instance_created {
            return Err(XrError::LimitReached);
        }
        if info.api_version.major() != 1 {
            return Err(XrError::ApiVersionUnsupported);
        }

        let mut enabled = HashSet::new();
        for requested in &info.enabled_extensions {
            let supported = SUPPORTED_EXTENSIONS
                .iter()
                .find(|name| **name == requested.as_str())
                .ok_or_else(|| XrError::ExtensionNotPresent(requested.clone()))?;
            enabled.insert(*supported);
        }

        info!(
            application = %info.application_name,
            engine = %info.engine_name,
            extensions = ?info.enabled_extensions,
            "instance created"
        );
        self.enabled_extensions = enabled;
        self.application_name = info.application_name.clone();
        self.time_reference = self.now();
        self.instance_created = true;
        Ok(instance_handle())
    }

    /// Destroy the instance, tearing down a live session first.
    pub fn destroy_instance(&mut self, instance: sys::Instance) -> XrResult<()> {
        self.check_instance(instance)?;
        if self.session.is_some() {
            self.destroy_session(session_handle())?;
        }
        self.release_orphaned_graphics();

        info!(application = %self.application_name, "instance destroyed");
        self.instance_created = false;
        self.enabled_extensions.clear();
        self.application_name.clear();
        self.system_created = false;
        self.graphics_requirements_queried.clear();
        Ok(())
    }

    pub fn get_system(
        &mut self,
        instance: sys::Instance,
        form_factor: sys::FormFactor,
    ) -> XrResult<sys::SystemId> {
        self.check_instance(instance)?;
        if form_factor != sys::FormFactor::HEAD_MOUNTED_DISPLAY {
            return Err(XrError::FormFactorUnsupported);
        }
        self.system_created = true;
        Ok(system_handle())
    }

    /// Graphics requirements query; must precede session creation for `api`.
    pub fn graphics_requirements(
        &mut self,
        instance: sys::Instance,
        system_id: sys::SystemId,
        api: GraphicsApi,
    ) -> XrResult<()> {
        if !self.binding_enabled(api) {
            return Err(XrError::FunctionUnsupported);
        }
        self.check_instance(instance)?;
        self.check_system(system_id)?;

        debug!(api = api.as_str(), "graphics requirements queried");
        self.graphics_requirements_queried.insert(api);
        Ok(())
    }

    /// Pick the first binding in the chain whose extension is enabled.
    fn select_binding<'a>(
        &self,
        bindings: &'a [GraphicsBinding],
    ) -> XrResult<(GraphicsApi, &'a GraphicsBinding)> {
        for binding in bindings {
            let Some(api) = binding.api() else {
                continue;
            };
            if !self.binding_enabled(api) {
                continue;
            }
            if !self.graphics_requirements_queried.contains(&api) {
                return Err(XrError::GraphicsRequirementsCallMissing);
            }
            return Ok((api, binding));
        }
        Err(XrError::GraphicsDeviceInvalid)
    }

    fn release_graphics(&mut self) {
        for api in GraphicsApi::CLEANUP_ORDER {
            self.graphics.cleanup(api);
        }
        self.graphics.cleanup_submission_device();
        self.orphaned_graphics = false;
    }

    fn release_orphaned_graphics(&mut self) {
        if self.orphaned_graphics {
            warn!("releasing graphics resources of a failed session");
            self.release_graphics();
        }
    }

    pub fn create_session(
        &mut self,
        instance: sys::Instance,
        info: &SessionCreateInfo,
    ) -> XrResult<sys::Session> {
        self.check_instance(instance)?;
        self.check_system(info.system_id)?;
        if info.create_flags != 0 {
            return Err(XrError::ValidationFailure("unknown session create flags"));
        }
        if self.session.is_some() {
            return Err(XrError::LimitReached);
        }

        let (api, binding) = self.select_binding(&info.bindings)?;
        self.release_orphaned_graphics();
        self.graphics.initialize(binding)?;
        info!(api = api.as_str(), "graphics binding initialized");

        self.refresh_settings();

        let start_time = self.now();
        let mut session = Session::new(
            session_handle(),
            api,
            self.sdk.clone(),
            SpaceRegistry::with_limit(self.config.max_spaces),
            start_time,
        );
        session.update_state(true, self.sdk.status(), start_time);

        for (side, controller) in self.controllers.iter_mut().enumerate() {
            controller.reset();
            self.actions.rebind_controller_actions(side);
        }
        self.actions.clear_active_action_sets();

        if let Err(err) = session.spaces.create_session_spaces() {
            error!("failed to allocate session spaces: {err}");
            self.orphaned_graphics = true;
            return Err(err);
        }

        info!(api = api.as_str(), "session created");
        self.session = Some(session);
        Ok(session_handle())
    }

    /// Release everything the session owns. Teardown failures are logged, never returned.
    pub fn destroy_session(&mut self, handle: sys::Session) -> XrResult<()> {
        self.session_mut(handle)?;
        let Some(mut session) = self.session.take() else {
            return Err(XrError::HandleInvalid);
        };

        session.submission.stop();

        if let Some(mirror) = session.mirror.take() {
            if mirror.shutdown(self.config.mirror_ready_timeout) == MirrorShutdown::Detached {
                warn!("continuing teardown with the mirror window thread detached");
            }
        }

        session.spaces.clear();

        for swapchain in self.swapchains.live_swapchains() {
            if let Err(err) = self.swapchains.destroy_swapchain(swapchain) {
                warn!(?swapchain, "failed to destroy swapchain: {err}");
            }
        }
        if let Some(swapchain) = session.guardian.take().and_then(|guardian| guardian.swapchain) {
            self.sdk.destroy_texture_swapchain(swapchain);
        }
        if let Some(overlay) = session.overlay.take() {
            self.sdk.destroy_texture_swapchain(overlay.swapchain);
            if let Some(background) = overlay.background {
                self.graphics.release_texture(background);
            }
        }

        self.release_graphics();

        info!(
            begun = session.begun,
            stopping = session.stopping,
            exiting = session.exiting,
            loss_pending = session.loss_pending,
            frames = session.counters.total,
            last_state = %session.state(),
            "session destroyed"
        );
        Ok(())
    }

    pub fn begin_session(
        &mut self,
        handle: sys::Session,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<()> {
        let async_submission = self.settings.get_bool("async_submission", true);
        let session = self.session_mut(handle)?;
        if view_configuration != sys::ViewConfigurationType::PRIMARY_STEREO {
            return Err(XrError::ViewConfigurationTypeUnsupported);
        }
        if session.begun {
            return Err(XrError::SessionRunning);
        }
        if session.state() != SessionState::Ready {
            return Err(XrError::SessionNotReady);
        }

        // The thread starts on the first wait_frame.
        session.submission.configure(async_submission);
        session.begun = true;
        info!(async_submission, "session begun");
        self.update_session_state(false);
        Ok(())
    }

    pub fn end_session(&mut self, handle: sys::Session) -> XrResult<()> {
        let session = self.session_mut(handle)?;
        if !session.begun {
            return Err(XrError::SessionNotRunning);
        }
        if session.state() != SessionState::Stopping {
            return Err(XrError::SessionNotStopping);
        }

        session.exiting = true;
        info!("session ended");
        self.update_session_state(false);
        Ok(())
    }

    pub fn request_exit_session(&mut self, handle: sys::Session) -> XrResult<()> {
        let session = self.session_mut(handle)?;
        if !session.begun || matches!(session.state(), SessionState::Idle | SessionState::Exiting)
        {
            return Err(XrError::SessionNotRunning);
        }

        session.stopping = true;
        info!("session exit requested");
        self.update_session_state(false);
        Ok(())
    }

    /// Advance the state machine and pop the oldest queued state change.
    pub fn poll_event(&mut self, instance: sys::Instance) -> XrResult<Option<RuntimeEvent>> {
        self.check_instance(instance)?;
        self.update_session_state(false);

        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let handle = session.handle();
        let Some(event) = session.pop_event() else {
            return Ok(None);
        };
        debug!(state = %event.state, time = event.time, "session state event");
        Ok(Some(RuntimeEvent::SessionStateChanged {
            session: handle,
            state: event.state,
            time: self.to_xr_time(event.time),
        }))
    }

    pub fn wait_frame(&mut self, handle: sys::Session) -> XrResult<FrameState> {
        let use_mirror_window = self.snapshot.use_mirror_window;
        let now = self.now();
        let session = self.session_mut(handle)?;
        if !session.begun {
            return Err(XrError::SessionNotRunning);
        }

        session.submission.ensure_started()?;
        if use_mirror_window && session.mirror.is_none() {
            let surface = (self.mirror_surface)();
            let session = self.session_mut(handle)?;
            session.mirror = Some(MirrorWindow::spawn(surface)?);
        }

        let session = self.session_mut(handle)?;
        let frame_times = session.frame_times().collect::<Vec<_>>();
        let frame_duration = if frame_times.is_empty() {
            DEFAULT_FRAME_DURATION
        } else {
            frame_times.iter().sum::<f64>() / frame_times.len() as f64
        };
        session.counters.waited += 1;
        let frame_id = session.counters.waited;
        let should_render = matches!(
            session.state(),
            SessionState::Visible | SessionState::Focused
        );

        Ok(FrameState {
            frame_id,
            predicted_display_time: self.to_xr_time(now + frame_duration),
            should_render,
        })
    }

    pub fn begin_frame(&mut self, handle: sys::Session) -> XrResult<()> {
        let session = self.session_mut(handle)?;
        if !session.begun {
            return Err(XrError::SessionNotRunning);
        }
        if session.counters.begun >= session.counters.waited {
            return Err(XrError::CallOrderInvalid);
        }
        session.counters.begun += 1;
        Ok(())
    }

    pub fn end_frame(
        &mut self,
        handle: sys::Session,
        display_time: sys::Time,
        layers: Vec<sys::Swapchain>,
    ) -> XrResult<()> {
        let guardian_enabled = self.snapshot.guardian_enabled();
        let session = self.session_mut(handle)?;
        if !session.begun {
            return Err(XrError::SessionNotRunning);
        }
        if session.counters.completed >= session.counters.begun {
            return Err(XrError::CallOrderInvalid);
        }

        if guardian_enabled && session.guardian.is_none() {
            self.bootstrap_guardian(handle)?;
        }

        let session = self.session_mut(handle)?;
        let frame_id = session.counters.completed + 1;
        session.submission.submit(FrameSubmission {
            frame_id,
            display_time,
            layers,
        })?;
        if let Some(mirror) = &session.mirror {
            mirror.present(frame_id);
        }

        session.counters.completed = frame_id;
        session.counters.total += 1;
        let now = self.now();
        let session = self.session_mut(handle)?;
        session.record_frame_end(now);
        self.update_session_state(false);
        Ok(())
    }

    fn bootstrap_guardian(&mut self, handle: sys::Session) -> XrResult<()> {
        let Some(session) = self.session.as_mut().filter(|s| s.handle() == handle) else {
            return Err(XrError::HandleInvalid);
        };
        let resources = initialize_guardian(
            self.graphics.as_mut(),
            self.sdk.as_ref(),
            &mut session.spaces,
            &self.config.install_dir,
        )?;
        session.guardian = Some(resources);
        Ok(())
    }

    pub fn create_reference_space(
        &mut self,
        handle: sys::Session,
        reference_type: sys::ReferenceSpaceType,
        pose_in_space: Pose,
    ) -> XrResult<sys::Space> {
        let session = self.session_mut(handle)?;
        if !is_supported_reference_space(reference_type) {
            return Err(XrError::ReferenceSpaceUnsupported);
        }
        session
            .spaces
            .create_application_space(Space::reference(reference_type, pose_in_space))
    }

    pub fn create_action_space(
        &mut self,
        handle: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        pose_in_space: Pose,
    ) -> XrResult<sys::Space> {
        let session = self.session_mut(handle)?;
        session.spaces.create_application_space(Space {
            kind: SpaceKind::Action {
                action,
                subaction_path,
            },
            pose_in_space,
        })
    }

    pub fn destroy_space(&mut self, space: sys::Space) -> XrResult<()> {
        let session = self.session.as_mut().ok_or(XrError::HandleInvalid)?;
        session.spaces.destroy_application_space(space)
    }

    /// Hand the SDK overlay swapchain and its background to the session for teardown.
    pub fn install_overlay(
        &mut self,
        handle: sys::Session,
        swapchain: SdkSwapchain,
        background: Option<TextureHandle>,
    ) -> XrResult<()> {
        let session = self.session_mut(handle)?;
        let previous = session.overlay.replace(OverlayResources {
            swapchain,
            background,
        });
        if let Some(previous) = previous {
            self.sdk.destroy_texture_swapchain(previous.swapchain);
            if let Some(background) = previous.background {
                self.graphics.release_texture(background);
            }
        }
        Ok(())
    }

    /// Recompute the settings snapshot from the provider.
    pub fn refresh_settings(&mut self) {
        if self.snapshot.refresh(&self.settings) {
            debug!("controller offsets changed, dropping cached controller types");
            for controller in &mut self.controllers {
                controller.cached_type = None;
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.destroy_session(session_handle());
        }
        self.release_orphaned_graphics();
    }
}
