//! Boundary visualization resources.

use std::path::Path;

use glam::Vec3;
use openxr::sys;
use tracing::{error, info, warn};

use crate::adapter::{GraphicsInterop, HmdSdk};
use crate::error::{BackendError, XrResult};
use crate::space::SpaceRegistry;
use crate::types::{Pose, SdkSwapchain, SwapchainDesc, TextureInfo};

/// Image asset shipped next to the runtime binary.
pub const GUARDIAN_IMAGE: &str = "guardian.png";

/// 1 m below eye level, laid flat on the floor.
pub fn guardian_pose() -> Pose {
    Pose::from_degrees(Vec3::new(-90.0, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardianExtent {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardianResources {
    /// `None` when the image could not be loaded or uploaded.
    pub swapchain: Option<SdkSwapchain>,
    pub extent: Option<GuardianExtent>,
    pub space: sys::Space,
}

/// Upload the guardian image into a static swapchain and create the guardian space.
///
/// Image or swapchain failures are logged and leave the session without guardian
/// visuals. Only a failure to allocate the space is returned.
pub fn initialize_guardian(
    graphics: &mut dyn GraphicsInterop,
    sdk: &dyn HmdSdk,
    spaces: &mut SpaceRegistry,
    install_dir: &Path,
) -> XrResult<GuardianResources> {
    let path = install_dir.join(GUARDIAN_IMAGE);
    let (swapchain, extent) = match graphics.load_texture(&path) {
        Ok(image) => {
            let uploaded = upload_static_image(graphics, sdk, &image);
            graphics.release_texture(image.handle);
            match uploaded {
                Ok(swapchain) => {
                    info!(width = image.width, height = image.height, "guardian image uploaded");
                    (
                        Some(swapchain),
                        Some(GuardianExtent {
                            width: image.width,
                            height: image.height,
                        }),
                    )
                }
                Err(err) => {
                    error!("failed to create guardian swapchain: {err}");
                    (None, None)
                }
            }
        }
        Err(err) => {
            error!(path = %path.display(), "failed to load guardian image: {err}");
            (None, None)
        }
    };

    let space = spaces.create_guardian(guardian_pose())?;
    Ok(GuardianResources {
        swapchain,
        extent,
        space,
    })
}

fn upload_static_image(
    graphics: &mut dyn GraphicsInterop,
    sdk: &dyn HmdSdk,
    image: &TextureInfo,
) -> Result<SdkSwapchain, BackendError> {
    let desc = SwapchainDesc {
        width: image.width,
        height: image.height,
        mip_levels: image.mip_levels,
        array_size: 1,
        sample_count: 1,
        format: image.format,
        static_image: true,
    };
    let swapchain = sdk.create_texture_swapchain(&desc)?;

    let copied = sdk
        .swapchain_texture(swapchain)
        .and_then(|target| graphics.copy_texture(target, image.handle))
        .and_then(|()| sdk.commit_texture_swapchain(swapchain));
    if let Err(err) = copied {
        warn!("destroying partially initialized guardian swapchain");
        sdk.destroy_texture_swapchain(swapchain);
        return Err(err);
    }
    Ok(swapchain)
}
