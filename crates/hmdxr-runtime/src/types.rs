use glam::{EulerRot, Quat, Vec3};
use openxr::sys;
use serde::Serialize;

/// Opaque native pointer value (device, queue, context) handed over by the application.
pub type RawHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    const EPSILON: f32 = 1e-5;

    /// Build a pose from rotations in degrees around X (pitch), Y (yaw) and Z (roll)
    /// and a translation in meters. Roll applies first, then pitch, then yaw.
    pub fn from_degrees(rotation_deg: Vec3, translation: Vec3) -> Self {
        Self {
            orientation: Quat::from_euler(
                EulerRot::YXZ,
                rotation_deg.y.to_radians(),
                rotation_deg.x.to_radians(),
                rotation_deg.z.to_radians(),
            ),
            position: translation,
        }
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        self.orientation.abs_diff_eq(other.orientation, Self::EPSILON)
            && self.position.abs_diff_eq(other.position, Self::EPSILON)
    }

    pub fn to_xr(self) -> sys::Posef {
        sys::Posef {
            orientation: sys::Quaternionf {
                x: self.orientation.x,
                y: self.orientation.y,
                z: self.orientation.z,
                w: self.orientation.w,
            },
            position: sys::Vector3f {
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
            },
        }
    }

    pub fn from_xr(pose: sys::Posef) -> Self {
        Self {
            orientation: Quat::from_xyzw(
                pose.orientation.x,
                pose.orientation.y,
                pose.orientation.z,
                pose.orientation.w,
            ),
            position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Headset presence as reported by the vendor SDK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HmdStatus {
    /// The compositor shows this application's content.
    pub visible: bool,
    /// The proximity sensor reports the headset on the user's head.
    pub mounted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub active: bool,
    pub aim_pose: Pose,
    pub grip_pose: Pose,
    /// Interaction profile classification derived by the input subsystem.
    pub cached_type: Option<String>,
}

impl ControllerState {
    pub(crate) fn reset(&mut self) {
        self.active = false;
        self.aim_pose = Pose::IDENTITY;
        self.grip_pose = Pose::IDENTITY;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    D3D11,
    D3D12,
    Vulkan,
    OpenGl,
}

impl GraphicsApi {
    /// Release order used at session teardown.
    pub const CLEANUP_ORDER: [GraphicsApi; 4] = [
        GraphicsApi::OpenGl,
        GraphicsApi::Vulkan,
        GraphicsApi::D3D12,
        GraphicsApi::D3D11,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D3D11 => "d3d11",
            Self::D3D12 => "d3d12",
            Self::Vulkan => "vulkan",
            Self::OpenGl => "opengl",
        }
    }
}

/// One entry of the session create chain.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsBinding {
    D3D11 {
        device: RawHandle,
    },
    D3D12 {
        device: RawHandle,
        queue: RawHandle,
    },
    Vulkan {
        instance: RawHandle,
        physical_device: RawHandle,
        device: RawHandle,
        queue_family_index: u32,
        queue_index: u32,
    },
    OpenGlWin32 {
        hdc: RawHandle,
        hglrc: RawHandle,
    },
    /// Any chained structure the runtime does not recognize.
    Other(sys::StructureType),
}

impl GraphicsBinding {
    pub fn api(&self) -> Option<GraphicsApi> {
        match self {
            Self::D3D11 { .. } => Some(GraphicsApi::D3D11),
            Self::D3D12 { .. } => Some(GraphicsApi::D3D12),
            Self::Vulkan { .. } => Some(GraphicsApi::Vulkan),
            Self::OpenGlWin32 { .. } => Some(GraphicsApi::OpenGl),
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceCreateInfo {
    pub application_name: String,
    pub engine_name: String,
    pub api_version: sys::Version,
    pub enabled_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionCreateInfo {
    pub system_id: sys::SystemId,
    pub create_flags: u64,
    pub bindings: Vec<GraphicsBinding>,
}

/// Texture swap chain owned by the vendor SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdkSwapchain(pub u64);

/// Texture on the shared submission device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    /// DXGI format of the decoded image.
    pub format: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub sample_count: u32,
    pub format: u32,
    /// Committed once and never re-rendered.
    pub static_image: bool,
}

/// A completed frame on its way to the compositor.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSubmission {
    pub frame_id: u64,
    pub display_time: sys::Time,
    pub layers: Vec<sys::Swapchain>,
}

/// Returned by `wait_frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub frame_id: u64,
    pub predicted_display_time: sys::Time,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub waited: u64,
    pub begun: u64,
    pub completed: u64,
    pub total: u64,
}
