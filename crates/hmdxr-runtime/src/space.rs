//! Reference frames owned by the session.

use std::collections::{HashMap, HashSet};

use openxr::sys;
use tracing::{debug, warn};

use crate::error::{XrError, XrResult};
use crate::types::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    Reference(sys::ReferenceSpaceType),
    Action {
        action: sys::Action,
        subaction_path: sys::Path,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Space {
    pub kind: SpaceKind,
    pub pose_in_space: Pose,
}

impl Space {
    pub fn reference(ty: sys::ReferenceSpaceType, pose_in_space: Pose) -> Self {
        Self {
            kind: SpaceKind::Reference(ty),
            pose_in_space,
        }
    }
}

/// Reference space types the runtime can resolve.
pub fn is_supported_reference_space(ty: sys::ReferenceSpaceType) -> bool {
    ty == sys::ReferenceSpaceType::VIEW
        || ty == sys::ReferenceSpaceType::LOCAL
        || ty == sys::ReferenceSpaceType::STAGE
}

/// All spaces of one session.
///
/// Origin and view spaces live for the whole session, the guardian space is
/// created on demand, and application spaces come and go through the public
/// entry points. Everything is released by [`SpaceRegistry::clear`].
#[derive(Debug, Default)]
pub struct SpaceRegistry {
    /// Upper bound on live spaces; `None` is unbounded.
    limit: Option<usize>,
    next_handle: u64,
    spaces: HashMap<sys::Space, Space>,
    application: HashSet<sys::Space>,
    origin: Option<sys::Space>,
    view: Option<sys::Space>,
    guardian: Option<sys::Space>,
}

impl SpaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn allocate(&mut self, space: Space) -> XrResult<sys::Space> {
        if let Some(limit) = self.limit {
            if self.spaces.len() >= limit {
                warn!(limit, "space limit reached");
                return Err(XrError::OutOfMemory);
            }
        }
        self.spaces.try_reserve(1)?;
        self.next_handle += 1;
        let handle = sys::Space::from_raw(self.next_handle);
        self.spaces.insert(handle, space);
        Ok(handle)
    }

    /// Create the LOCAL origin and the VIEW space.
    pub fn create_session_spaces(&mut self) -> XrResult<()> {
        let origin = self.allocate(Space::reference(
            sys::ReferenceSpaceType::LOCAL,
            Pose::IDENTITY,
        ))?;
        self.origin = Some(origin);
        let view = self.allocate(Space::reference(
            sys::ReferenceSpaceType::VIEW,
            Pose::IDENTITY,
        ))?;
        self.view = Some(view);
        Ok(())
    }

    pub fn create_guardian(&mut self, pose_in_space: Pose) -> XrResult<sys::Space> {
        if let Some(existing) = self.guardian {
            return Ok(existing);
        }
        let handle = self.allocate(Space::reference(
            sys::ReferenceSpaceType::LOCAL,
            pose_in_space,
        ))?;
        self.guardian = Some(handle);
        Ok(handle)
    }

    pub fn create_application_space(&mut self, space: Space) -> XrResult<sys::Space> {
        self.application.try_reserve(1)?;
        let handle = self.allocate(space)?;
        self.application.insert(handle);
        Ok(handle)
    }

    pub fn destroy_application_space(&mut self, handle: sys::Space) -> XrResult<()> {
        if !self.application.remove(&handle) {
            return Err(XrError::HandleInvalid);
        }
        self.spaces.remove(&handle);
        Ok(())
    }

    pub fn get(&self, handle: sys::Space) -> Option<&Space> {
        self.spaces.get(&handle)
    }

    pub fn origin(&self) -> Option<sys::Space> {
        self.origin
    }

    pub fn view(&self) -> Option<sys::Space> {
        self.view
    }

    pub fn guardian(&self) -> Option<sys::Space> {
        self.guardian
    }

    pub fn application_space_count(&self) -> usize {
        self.application.len()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Destroy application spaces, then the guardian, then origin and view.
    /// Returns how many spaces were released.
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        for handle in self.application.drain() {
            if self.spaces.remove(&handle).is_some() {
                released += 1;
            }
        }
        for slot in [&mut self.guardian, &mut self.origin, &mut self.view] {
            if let Some(handle) = slot.take() {
                if self.spaces.remove(&handle).is_some() {
                    released += 1;
                }
            }
        }
        debug!(released, leftover = self.spaces.len(), "released session spaces");
        self.spaces.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_session_spaces() {
        let mut registry = SpaceRegistry::new();
        registry.create_session_spaces().unwrap();

        let origin = registry.get(registry.origin().unwrap()).unwrap();
        assert_eq!(
            origin.kind,
            SpaceKind::Reference(sys::ReferenceSpaceType::LOCAL)
        );
        assert_eq!(origin.pose_in_space, Pose::IDENTITY);

        let view = registry.get(registry.view().unwrap()).unwrap();
        assert_eq!(view.kind, SpaceKind::Reference(sys::ReferenceSpaceType::VIEW));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_guardian_created_once() {
        let mut registry = SpaceRegistry::new();
        let pose = Pose::from_degrees(Vec3::new(-90.0, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let first = registry.create_guardian(pose).unwrap();
        let second = registry.create_guardian(Pose::IDENTITY).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.get(first).unwrap().pose_in_space, pose);
    }

    #[test]
    fn test_application_space_lifecycle() {
        let mut registry = SpaceRegistry::new();
        let handle = registry
            .create_application_space(Space::reference(
                sys::ReferenceSpaceType::STAGE,
                Pose::IDENTITY,
            ))
            .unwrap();
        assert_eq!(registry.application_space_count(), 1);

        registry.destroy_application_space(handle).unwrap();
        assert!(registry.is_empty());
        assert_eq!(
            registry.destroy_application_space(handle),
            Err(XrError::HandleInvalid)
        );
    }

    #[test]
    fn test_session_spaces_cannot_be_destroyed_by_application() {
        let mut registry = SpaceRegistry::new();
        registry.create_session_spaces().unwrap();
        let origin = registry.origin().unwrap();
        assert_eq!(
            registry.destroy_application_space(origin),
            Err(XrError::HandleInvalid)
        );
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut registry = SpaceRegistry::new();
        registry.create_session_spaces().unwrap();
        registry.create_guardian(Pose::IDENTITY).unwrap();
        for _ in 0..3 {
            registry
                .create_application_space(Space {
                    kind: SpaceKind::Action {
                        action: sys::Action::from_raw(7),
                        subaction_path: sys::Path::from_raw(0),
                    },
                    pose_in_space: Pose::IDENTITY,
                })
                .unwrap();
        }

        assert_eq!(registry.clear(), 6);
        assert!(registry.is_empty());
        assert_eq!(registry.origin(), None);
        assert_eq!(registry.view(), None);
        assert_eq!(registry.guardian(), None);
        assert_eq!(registry.application_space_count(), 0);
    }

    #[test]
    fn test_limit_rejects_allocation() {
        let mut registry = SpaceRegistry::with_limit(Some(1));
        assert_eq!(registry.create_session_spaces(), Err(XrError::OutOfMemory));
        assert!(registry.origin().is_some());
        assert_eq!(registry.view(), None);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert_eq!(
            registry.create_application_space(Space::reference(
                sys::ReferenceSpaceType::STAGE,
                Pose::IDENTITY,
            )),
            Ok(sys::Space::from_raw(2))
        );
    }

    #[test]
    fn test_handles_are_unique() {
        let mut registry = SpaceRegistry::new();
        registry.create_session_spaces().unwrap();
        assert_ne!(registry.origin(), registry.view());
    }
}
