//! Membership manager: owns the bridge and LAG-VLAN tables.
//!
//! All mutating operations on a bridge domain run under the bridge-table
//! lock; all LAG-VLAN operations run under the LAG-VLAN lock. Operations
//! that touch both acquire the bridge lock first, never the reverse;
//! the order is enforced by a debug-mode runtime check in the lock
//! helpers. Within a lock holder every collaborator call is synchronous
//! and blocking; partial application is handled exclusively through the
//! rollback mechanics of the bridge and LAG-VLAN layers.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use l2_orch_common::{SyncMap, TaskStatus};
use tracing::{info, warn};

use crate::bridge::VlanBridge;
use crate::error::{MembershipError, MembershipResult};
use crate::lag_vlan::LagVlanMap;
use crate::notify::advise_mode_change;
use crate::services::Services;
use crate::types::{
    BridgeSubType, HwPort, IfIndex, InterfaceMode, MembershipRollback, NpuId, PortMode, VlanId,
    DEFAULT_VLAN_ID,
};

#[cfg(debug_assertions)]
thread_local! {
    static HOLDING_LAG_LOCK: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Guard for the LAG-VLAN table that participates in the debug-mode
/// lock-order check.
pub struct LagTableGuard<'a> {
    guard: MutexGuard<'a, LagVlanMap>,
}

impl Deref for LagTableGuard<'_> {
    type Target = LagVlanMap;

    fn deref(&self) -> &LagVlanMap {
        &self.guard
    }
}

impl DerefMut for LagTableGuard<'_> {
    fn deref_mut(&mut self) -> &mut LagVlanMap {
        &mut self.guard
    }
}

impl Drop for LagTableGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        HOLDING_LAG_LOCK.with(|f| f.set(false));
    }
}

/// An OS-observed bridge topology event.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A bridge appeared in the OS.
    Created {
        name: String,
        if_index: IfIndex,
        npu: NpuId,
    },
    /// A bridge disappeared from the OS. Members are expected to have
    /// been removed by preceding events.
    Deleted { name: String },
}

/// An OS-observed LAG topology event.
#[derive(Debug, Clone)]
pub enum LagEvent {
    /// A LAG was created.
    Created { lag_index: IfIndex, name: String },
    /// A LAG was deleted.
    Deleted { lag_index: IfIndex },
    /// A LAG's port membership changed; `ports` is the full new set.
    MembersChanged {
        lag_index: IfIndex,
        ports: BTreeSet<IfIndex>,
    },
}

/// Owns the membership tables and dispatches every operation of the
/// core. One instance per process, created at startup with the platform
/// collaborators.
pub struct MembershipManager {
    services: Services,
    bridges: Mutex<SyncMap<String, VlanBridge>>,
    lag_vlan: Mutex<LagVlanMap>,
}

impl MembershipManager {
    /// Creates a manager with empty tables.
    pub fn new(services: Services) -> Self {
        Self {
            services,
            bridges: Mutex::new(SyncMap::new()),
            lag_vlan: Mutex::new(LagVlanMap::new()),
        }
    }

    /// The collaborator bundle.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Locks the bridge table. Must never be requested while the
    /// LAG-VLAN table is held.
    fn bridge_table(&self) -> MutexGuard<'_, SyncMap<String, VlanBridge>> {
        #[cfg(debug_assertions)]
        HOLDING_LAG_LOCK.with(|f| {
            debug_assert!(
                !f.get(),
                "lock order violation: bridge table requested while holding the LAG-VLAN table"
            );
        });
        self.bridges.lock().expect("bridge table lock poisoned")
    }

    /// Locks the LAG-VLAN table.
    fn lag_table(&self) -> LagTableGuard<'_> {
        let guard = self.lag_vlan.lock().expect("LAG-VLAN table lock poisoned");
        #[cfg(debug_assertions)]
        HOLDING_LAG_LOCK.with(|f| f.set(true));
        LagTableGuard { guard }
    }

    fn with_bridge<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut VlanBridge, &Services) -> MembershipResult<T>,
    ) -> MembershipResult<T> {
        let mut bridges = self.bridge_table();
        let bridge = bridges
            .get_mut(&name.to_string())
            .ok_or_else(|| MembershipError::not_found(format!("bridge {name}")))?;
        f(bridge, &self.services)
    }

    // ============ Bridge lifecycle ============

    /// Creates a bridge domain. With an explicit VLAN id the hardware
    /// VLAN is created immediately; otherwise it is created lazily on
    /// the first tagged attach.
    pub fn create_bridge(
        &self,
        name: &str,
        if_index: IfIndex,
        npu: NpuId,
        vlan_id: Option<VlanId>,
        sub_type: BridgeSubType,
    ) -> MembershipResult<()> {
        let mut bridges = self.bridge_table();
        if bridges.contains_key(&name.to_string()) {
            return Err(MembershipError::invalid_parameter(format!(
                "bridge {name} already exists"
            )));
        }

        let bridge = match vlan_id {
            Some(v) => VlanBridge::with_vlan(name, if_index, npu, sub_type, v),
            None => VlanBridge::new(name, if_index, npu, sub_type),
        };
        bridge.create_hw_vlan(&self.services)?;
        bridges.insert(name.to_string(), bridge);
        info!(bridge = name, if_index, ?vlan_id, "bridge created");
        Ok(())
    }

    /// Deletes a bridge domain. The caller is expected to have removed
    /// the members already.
    pub fn delete_bridge(&self, name: &str) -> MembershipResult<()> {
        let mut bridges = self.bridge_table();
        self.delete_bridge_locked(&mut bridges, name)
    }

    fn delete_bridge_locked(
        &self,
        bridges: &mut SyncMap<String, VlanBridge>,
        name: &str,
    ) -> MembershipResult<()> {
        let bridge = bridges
            .get_mut(&name.to_string())
            .ok_or_else(|| MembershipError::not_found(format!("bridge {name}")))?;

        if bridge.member_count() > 0 {
            warn!(bridge = name, members = bridge.member_count(),
                "bridge deleted with members still present");
        }

        if let Some(vlan_id) = bridge.vlan_id() {
            if vlan_id != DEFAULT_VLAN_ID {
                // Scrub the VLAN from every LAG while it still exists in
                // hardware. Bridge lock held; LAG lock taken second.
                let mut lag_table = self.lag_table();
                lag_table.detach_vlan_everywhere(vlan_id, &self.services);
            }
        }

        bridge.delete_hw_vlan(&self.services)?;
        bridges.remove(&name.to_string());
        info!(bridge = name, "bridge deleted");
        Ok(())
    }

    // ============ Single and batch membership ============

    /// Adds one member to a bridge, OS layer included.
    pub fn add_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| {
            b.add_or_remove_member_with_os(member, mode, true, svc)
        })
    }

    /// Removes one member from a bridge, OS layer included.
    pub fn remove_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| {
            b.add_or_remove_member_with_os(member, mode, false, svc)
        })
    }

    /// Adds a list of members; rolled back as a whole on failure.
    pub fn add_member_list(
        &self,
        bridge: &str,
        members: &[String],
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| {
            b.add_or_remove_member_list(members, mode, true, svc)
        })
    }

    /// Removes a list of members; rolled back as a whole on failure.
    pub fn remove_member_list(
        &self,
        bridge: &str,
        members: &[String],
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| {
            b.add_or_remove_member_list(members, mode, false, svc)
        })
    }

    /// Mirrors the learning-disable flag of a bridge into hardware.
    pub fn set_learning_disable(&self, bridge: &str, disable: bool) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| b.set_learning_disable(disable, svc))
    }

    /// Hardware-only association for a port handle obtained out of band.
    pub fn associate_hw_port(
        &self,
        bridge: &str,
        member: &str,
        port: &HwPort,
        mode: PortMode,
        associate: bool,
    ) -> MembershipResult<()> {
        self.with_bridge(bridge, |b, svc| {
            b.associate_hw_port(member, port, mode, associate, svc)
        })
    }

    // ============ Queries ============

    /// Membership presence check. The snapshot may be stale by the time
    /// the caller acts on it.
    pub fn is_member(&self, bridge: &str, member: &str) -> bool {
        self.bridge_table()
            .get(&bridge.to_string())
            .map(|b| b.is_member(member))
            .unwrap_or(false)
    }

    /// The bridge's assigned VLAN id, if the bridge exists and has one.
    pub fn bridge_vlan_id(&self, bridge: &str) -> Option<VlanId> {
        self.bridge_table()
            .get(&bridge.to_string())
            .and_then(|b| b.vlan_id())
    }

    /// Snapshot of a LAG's VLAN attachment state.
    pub fn lag_entry(&self, lag_index: IfIndex) -> Option<crate::lag_vlan::LagVlanEntry> {
        self.lag_table().entry(lag_index).cloned()
    }

    // ============ LAG attachment ============

    /// Attaches a LAG to a bridge's VLAN (bridge lock, then LAG lock).
    pub fn attach_lag_to_vlan(
        &self,
        bridge: &str,
        lag_index: IfIndex,
        mode: PortMode,
        via_os: bool,
        rollback: Option<&mut MembershipRollback>,
    ) -> MembershipResult<()> {
        let bridges = self.bridge_table();
        let bridge = bridges
            .get(&bridge.to_string())
            .ok_or_else(|| MembershipError::not_found(format!("bridge {bridge}")))?;
        let mut lag_table = self.lag_table();
        lag_table.attach_lag_to_vlan(lag_index, bridge, mode, via_os, rollback, &self.services)
    }

    /// Detaches a LAG from a bridge's VLAN.
    pub fn detach_lag_from_vlan(
        &self,
        bridge: &str,
        lag_index: IfIndex,
        mode: PortMode,
        via_os: bool,
        rollback: Option<&mut MembershipRollback>,
    ) -> MembershipResult<()> {
        let bridges = self.bridge_table();
        let bridge = bridges
            .get(&bridge.to_string())
            .ok_or_else(|| MembershipError::not_found(format!("bridge {bridge}")))?;
        let mut lag_table = self.lag_table();
        lag_table.detach_lag_from_vlan(lag_index, bridge, mode, via_os, rollback, &self.services)
    }

    /// Detaches every LAG attached to the bridge's VLAN in `mode` that
    /// is absent from `requested`.
    pub fn reconcile_lag_members(
        &self,
        bridge: &str,
        requested: &BTreeSet<IfIndex>,
        mode: PortMode,
        rollback: Option<&mut MembershipRollback>,
    ) -> MembershipResult<()> {
        let bridges = self.bridge_table();
        let bridge = bridges
            .get(&bridge.to_string())
            .ok_or_else(|| MembershipError::not_found(format!("bridge {bridge}")))?;
        let mut lag_table = self.lag_table();
        lag_table.reconcile_against_requested(bridge, requested, mode, rollback, &self.services)
    }

    // ============ OS event dispatch ============

    /// Handles an OS-observed bridge create/delete event.
    pub fn handle_bridge_event(&self, event: BridgeEvent) -> MembershipResult<TaskStatus> {
        match event {
            BridgeEvent::Created {
                name,
                if_index,
                npu,
            } => {
                let mut bridges = self.bridge_table();
                if bridges.contains_key(&name) {
                    warn!(bridge = %name, "bridge object already exists");
                    return Ok(TaskStatus::Ignore);
                }
                bridges.insert(
                    name.clone(),
                    VlanBridge::new(&name, if_index, npu, BridgeSubType::Vlan),
                );
                advise_mode_change(self.services.notifier.as_ref(), if_index, InterfaceMode::None);
                info!(bridge = %name, if_index, "bridge created from OS event");
                Ok(TaskStatus::Success)
            }
            BridgeEvent::Deleted { name } => {
                let mut bridges = self.bridge_table();
                let Some(if_index) = bridges.get(&name).map(|b| b.if_index()) else {
                    warn!(bridge = %name, "bridge object already deleted or does not exist");
                    return Ok(TaskStatus::Ignore);
                };
                advise_mode_change(self.services.notifier.as_ref(), if_index, InterfaceMode::L2);
                self.delete_bridge_locked(&mut bridges, &name)?;
                Ok(TaskStatus::Success)
            }
        }
    }

    /// Handles an OS-observed LAG create/delete/member-set event.
    pub fn handle_lag_event(&self, event: LagEvent) -> MembershipResult<TaskStatus> {
        let mut lag_table = self.lag_table();
        match event {
            LagEvent::Created { lag_index, name } => match lag_table.create_lag(lag_index, name) {
                Ok(()) => Ok(TaskStatus::Success),
                Err(e) => {
                    warn!(lag_index, %e, "LAG already tracked");
                    Ok(TaskStatus::Ignore)
                }
            },
            LagEvent::Deleted { lag_index } => match lag_table.delete_lag(lag_index) {
                Ok(()) => Ok(TaskStatus::Success),
                Err(e) => {
                    warn!(lag_index, %e, "LAG not tracked");
                    Ok(TaskStatus::Ignore)
                }
            },
            LagEvent::MembersChanged { lag_index, ports } => {
                match lag_table.on_lag_membership_changed(lag_index, &ports, &self.services) {
                    Ok(()) => Ok(TaskStatus::Success),
                    // OS LAG events legitimately race LAG deletion.
                    Err(MembershipError::NotFound { .. }) => Ok(TaskStatus::Ignore),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

impl std::fmt::Debug for MembershipManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipManager").finish_non_exhaustive()
    }
}
