//! Tracking ids: short-lived integer handles that stand in for a path while
//! a hash request is in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::RegistryError;

/// Bidirectional path/id lookup.
///
/// An id must stay resolvable from the moment its hash request is sent until
/// the matching result has been processed; when it is reclaimed is up to the
/// owner, who calls [`TrackingRegistry::release`].
pub trait TrackingRegistry: Send + Sync {
    /// Allocate a fresh id for `path`.
    fn assign(&self, path: &Path) -> i32;

    /// Path behind `tracking_id`.
    fn resolve(&self, tracking_id: i32) -> Result<PathBuf, RegistryError>;

    /// Reclaim `tracking_id`, returning the path it tracked.
    fn release(&self, tracking_id: i32) -> Result<PathBuf, RegistryError>;
}

/// Registry held in process memory.
///
/// Ids count up and wrap; an id still in flight is never handed out twice.
#[derive(Default)]
pub struct InMemoryTrackingRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    next_id: i32,
    paths: HashMap<i32, PathBuf>,
}

impl InMemoryTrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().paths.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TrackingRegistry for InMemoryTrackingRegistry {
    fn assign(&self, path: &Path) -> i32 {
        let mut state = self.lock();
        let mut id = state.next_id;
        while state.paths.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        state.next_id = id.wrapping_add(1);
        state.paths.insert(id, path.to_path_buf());
        tracing::trace!("Tracking {:?} as {}", path, id);
        id
    }

    fn resolve(&self, tracking_id: i32) -> Result<PathBuf, RegistryError> {
        self.lock()
            .paths
            .get(&tracking_id)
            .cloned()
            .ok_or(RegistryError::NotFound(tracking_id))
    }

    fn release(&self, tracking_id: i32) -> Result<PathBuf, RegistryError> {
        self.lock()
            .paths
            .remove(&tracking_id)
            .ok_or(RegistryError::NotFound(tracking_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_and_resolve() {
        let registry = InMemoryTrackingRegistry::new();
        let a = registry.assign(Path::new("/a.jpg"));
        let b = registry.assign(Path::new("/b.jpg"));

        assert_ne!(a, b);
        assert_eq!(registry.resolve(a).unwrap(), PathBuf::from("/a.jpg"));
        assert_eq!(registry.resolve(b).unwrap(), PathBuf::from("/b.jpg"));
    }

    #[test]
    fn test_resolve_unknown_id() {
        let registry = InMemoryTrackingRegistry::new();
        assert_eq!(registry.resolve(12), Err(RegistryError::NotFound(12)));
    }

    #[test]
    fn test_released_id_no_longer_resolves() {
        let registry = InMemoryTrackingRegistry::new();
        let id = registry.assign(Path::new("/a.jpg"));

        assert_eq!(registry.release(id).unwrap(), PathBuf::from("/a.jpg"));
        assert_eq!(registry.resolve(id), Err(RegistryError::NotFound(id)));
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_wrapping_skips_ids_in_flight() {
        let registry = InMemoryTrackingRegistry::new();
        let zero = registry.assign(Path::new("/held.jpg"));
        assert_eq!(zero, 0);

        registry.lock().next_id = i32::MAX;
        let max = registry.assign(Path::new("/max.jpg"));
        assert_eq!(max, i32::MAX);

        let wrapped = registry.assign(Path::new("/wrapped.jpg"));
        assert_eq!(wrapped, i32::MIN);

        registry.lock().next_id = 0;
        let next = registry.assign(Path::new("/next.jpg"));
        assert_eq!(next, 1);
        assert_eq!(registry.resolve(zero).unwrap(), PathBuf::from("/held.jpg"));
    }
}
