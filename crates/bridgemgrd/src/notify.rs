//! Mode/notification bridge.
//!
//! Propagates L2/L3 mode transitions and L2-multicast cleanup to
//! cooperating subsystems (routing, multicast). Both calls are
//! best-effort: they inform collaborators rather than gating the
//! membership transaction, so failures are logged and never escalated.

use tracing::warn;

use crate::types::{IfIndex, InterfaceMode, VlanId};

/// Cross-subsystem notification surface.
pub trait ModeNotifier: Send + Sync {
    /// Informs collaborators that `if_index` moved to `new_mode`.
    /// Returns false if the notification could not be delivered.
    fn notify_mode_change(&self, if_index: IfIndex, new_mode: InterfaceMode) -> bool;

    /// Requests cleanup of the member's L2-multicast group state for
    /// the given VLAN. Returns false on failure.
    fn cleanup_l2_multicast(&self, if_index: IfIndex, vlan_id: VlanId) -> bool;
}

/// Best-effort mode-change notification; failure is logged only.
pub fn advise_mode_change(notifier: &dyn ModeNotifier, if_index: IfIndex, new_mode: InterfaceMode) {
    if !notifier.notify_mode_change(if_index, new_mode) {
        warn!(if_index, ?new_mode, "interface mode change notification failed");
    }
}

/// Best-effort L2-multicast cleanup; failure is logged only.
pub fn advise_l2mc_cleanup(notifier: &dyn ModeNotifier, if_index: IfIndex, vlan_id: VlanId) {
    if !notifier.cleanup_l2_multicast(if_index, vlan_id) {
        warn!(if_index, vlan_id, "L2 multicast cleanup request failed");
    }
}
