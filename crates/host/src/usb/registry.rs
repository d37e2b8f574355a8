//! Set of devices with a running read session

use protocol::DeviceId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Tracks which devices currently have a session
///
/// Registering hands out a [`SessionGuard`]; the device stays registered until the guard is
/// dropped, whichever way the session ends.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<DeviceId>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device_id`, or return None if it already has a session
    pub fn try_register(&self, device_id: &DeviceId) -> Option<SessionGuard> {
        if !self.lock().insert(device_id.clone()) {
            return None;
        }
        trace!("Registered session for {}", device_id);
        Some(SessionGuard {
            registry: self.clone(),
            device_id: device_id.clone(),
        })
    }

    pub fn is_active(&self, device_id: &DeviceId) -> bool {
        self.lock().contains(device_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<DeviceId>> {
        // The set stays consistent even if a holder panicked
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration of one session, released on drop
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    device_id: DeviceId,
}

impl SessionGuard {
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.device_id);
        trace!("Released session for {}", self.device_id);
    }
}
