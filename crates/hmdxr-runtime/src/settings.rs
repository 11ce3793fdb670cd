//! Policy values derived from the settings store.

use glam::Vec3;
use hmdxr_common::Settings;
use serde::Serialize;
use tracing::info;

use crate::types::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForcedInteractionProfile {
    OculusTouchController,
    MicrosoftMotionController,
}

impl ForcedInteractionProfile {
    fn from_setting(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::OculusTouchController),
            2 => Some(Self::MicrosoftMotionController),
            _ => None,
        }
    }
}

/// Cached result of the last settings refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSnapshot {
    pub forced_interaction_profile: Option<ForcedInteractionProfile>,
    /// Meters; `INFINITY` when the guardian is disabled.
    pub guardian_threshold: f32,
    /// Meters.
    pub guardian_radius: f32,
    pub controller_aim_offset: Pose,
    pub controller_grip_offset: Pose,
    pub use_mirror_window: bool,
    pub use_running_start: bool,
    pub sync_gpu_work_in_end_frame: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            forced_interaction_profile: None,
            guardian_threshold: 1.1,
            guardian_radius: 1.6,
            controller_aim_offset: Pose::IDENTITY,
            controller_grip_offset: Pose::IDENTITY,
            use_mirror_window: false,
            use_running_start: true,
            sync_gpu_work_in_end_frame: false,
        }
    }
}

impl SettingsSnapshot {
    pub fn load(settings: &Settings) -> Self {
        let mut snapshot = Self::default();
        snapshot.refresh(settings);
        snapshot
    }

    pub fn guardian_enabled(&self) -> bool {
        self.guardian_threshold.is_finite()
    }

    /// Recompute every value from `settings`.
    ///
    /// Returns `true` when the aim or grip offset changed, in which case
    /// callers must drop their cached controller classification.
    pub fn refresh(&mut self, settings: &Settings) -> bool {
        self.forced_interaction_profile =
            ForcedInteractionProfile::from_setting(settings.get_i64("force_interaction_profile", 0));

        if settings.get_bool("guardian", true) {
            self.guardian_threshold = settings.get_f32("guardian_threshold", 1100.0) / 1e3;
            self.guardian_radius = settings.get_f32("guardian_radius", 1600.0) / 1e3;
        } else {
            self.guardian_threshold = f32::INFINITY;
        }

        let aim_offset = controller_offset(settings, "aim");
        let grip_offset = controller_offset(settings, "grip");
        let offsets_changed = !self.controller_aim_offset.approx_eq(&aim_offset)
            || !self.controller_grip_offset.approx_eq(&grip_offset);
        self.controller_aim_offset = aim_offset;
        self.controller_grip_offset = grip_offset;

        self.use_mirror_window = settings.get_bool("mirror_window", false);
        self.use_running_start = !settings.get_bool("quirk_disable_running_start", false);
        self.sync_gpu_work_in_end_frame =
            settings.get_bool("quirk_sync_gpu_work_in_end_frame", false);

        info!(
            forced_interaction_profile = ?self.forced_interaction_profile,
            guardian_threshold = self.guardian_threshold,
            guardian_radius = self.guardian_radius,
            mirror_window = self.use_mirror_window,
            use_running_start = self.use_running_start,
            sync_gpu_work_in_end_frame = self.sync_gpu_work_in_end_frame,
            offsets_changed,
            "settings refreshed"
        );
        offsets_changed
    }
}

/// `<prefix>_pose_rot_{x,y,z}` in degrees, `<prefix>_pose_offset_{x,y,z}` in millimeters.
fn controller_offset(settings: &Settings, prefix: &str) -> Pose {
    let read = |kind: &str, axis: &str| settings.get_f32(&format!("{prefix}_pose_{kind}_{axis}"), 0.0);
    Pose::from_degrees(
        Vec3::new(read("rot", "x"), read("rot", "y"), read("rot", "z")),
        Vec3::new(read("offset", "x"), read("offset", "y"), read("offset", "z")) / 1000.0,
    )
}
