//! Collaborator bundle handed to every membership operation.

use std::fmt;
use std::sync::Arc;

use crate::driver::ForwardingDriver;
use crate::notify::ModeNotifier;
use crate::os_mirror::OsMirror;
use crate::registry::InterfaceRegistry;

/// The external collaborators of the membership core.
///
/// Constructed once at startup with the platform implementations and
/// owned by the [`crate::manager::MembershipManager`]; tests substitute
/// recording doubles.
#[derive(Clone)]
pub struct Services {
    /// Interface identity, registration, and mode-master bookkeeping.
    pub registry: Arc<dyn InterfaceRegistry>,
    /// Switch ASIC programming.
    pub driver: Arc<dyn ForwardingDriver>,
    /// Kernel bridge topology mirror.
    pub os: Arc<dyn OsMirror>,
    /// Advisory cross-subsystem notifications.
    pub notifier: Arc<dyn ModeNotifier>,
}

impl Services {
    /// Bundles the four collaborators.
    pub fn new(
        registry: Arc<dyn InterfaceRegistry>,
        driver: Arc<dyn ForwardingDriver>,
        os: Arc<dyn OsMirror>,
        notifier: Arc<dyn ModeNotifier>,
    ) -> Self {
        Self {
            registry,
            driver,
            os,
            notifier,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
