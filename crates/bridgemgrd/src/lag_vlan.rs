//! LAG-to-VLAN mapping table.
//!
//! Link-aggregation groups are dynamic: their port membership changes
//! independently of VLAN configuration. This table tracks, per LAG,
//! which VLANs it is attached to (tagged or untagged) and which physical
//! ports currently belong to it, and replays hardware programming in
//! both directions:
//!
//! - attaching a LAG to a VLAN programs every current member port
//! - a LAG membership change replays every attached VLAN against the
//!   ports that joined or left

use std::collections::{BTreeMap, BTreeSet};

use l2_orch_common::SyncMap;
use tracing::{debug, error, info, warn};

use crate::bridge::VlanBridge;
use crate::driver::{add_remove_port, ForwardingDriver};
use crate::error::{MembershipError, MembershipResult};
use crate::notify::advise_mode_change;
use crate::services::Services;
use crate::types::{
    HwPort, IfIndex, InterfaceKind, MasterInfo, MembershipRollback, PortMode, VlanId,
};

/// Per-LAG VLAN attachment and member-port state.
#[derive(Debug, Clone)]
pub struct LagVlanEntry {
    lag_index: IfIndex,
    /// OS-visible name, used for OS-mirror membership calls.
    lag_name: String,
    /// Derived: true iff either VLAN set below is non-empty.
    vlan_enable: bool,
    tagged_vlans: BTreeSet<VlanId>,
    untagged_vlans: BTreeSet<VlanId>,
    /// Member ports with forwarding-plane presence; virtual member
    /// ports are never tracked here.
    members: BTreeMap<IfIndex, HwPort>,
}

impl LagVlanEntry {
    fn new(lag_index: IfIndex, lag_name: String) -> Self {
        Self {
            lag_index,
            lag_name,
            vlan_enable: false,
            tagged_vlans: BTreeSet::new(),
            untagged_vlans: BTreeSet::new(),
            members: BTreeMap::new(),
        }
    }

    /// The LAG's interface index.
    pub fn lag_index(&self) -> IfIndex {
        self.lag_index
    }

    /// True iff the LAG participates in at least one VLAN.
    pub fn vlan_enable(&self) -> bool {
        self.vlan_enable
    }

    /// VLANs the LAG is tagged in.
    pub fn tagged_vlans(&self) -> &BTreeSet<VlanId> {
        &self.tagged_vlans
    }

    /// VLANs the LAG is untagged in.
    pub fn untagged_vlans(&self) -> &BTreeSet<VlanId> {
        &self.untagged_vlans
    }

    /// Current member ports, keyed by interface index.
    pub fn members(&self) -> &BTreeMap<IfIndex, HwPort> {
        &self.members
    }

    /// True if the LAG is attached to `vlan_id` in `mode`.
    pub fn is_attached(&self, vlan_id: VlanId, mode: PortMode) -> bool {
        self.vlan_set(mode).contains(&vlan_id)
    }

    fn vlan_set(&self, mode: PortMode) -> &BTreeSet<VlanId> {
        match mode {
            PortMode::Tagged => &self.tagged_vlans,
            PortMode::Untagged => &self.untagged_vlans,
        }
    }

    fn vlan_set_mut(&mut self, mode: PortMode) -> &mut BTreeSet<VlanId> {
        match mode {
            PortMode::Tagged => &mut self.tagged_vlans,
            PortMode::Untagged => &mut self.untagged_vlans,
        }
    }

    fn recompute_vlan_enable(&mut self) {
        self.vlan_enable = !(self.tagged_vlans.is_empty() && self.untagged_vlans.is_empty());
    }
}

/// Table of every LAG that may participate in VLANs.
#[derive(Debug, Default)]
pub struct LagVlanMap {
    lags: SyncMap<IfIndex, LagVlanEntry>,
}

impl LagVlanMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a newly created LAG.
    pub fn create_lag(&mut self, lag_index: IfIndex, lag_name: impl Into<String>) -> MembershipResult<()> {
        let lag_name = lag_name.into();
        info!(lag_index, lag = %lag_name, "tracking LAG");
        self.lags
            .insert_new(lag_index, LagVlanEntry::new(lag_index, lag_name))
            .map_err(|_| {
                MembershipError::invalid_parameter(format!("LAG {lag_index} already tracked"))
            })
    }

    /// Drops a deleted LAG.
    pub fn delete_lag(&mut self, lag_index: IfIndex) -> MembershipResult<()> {
        info!(lag_index, "dropping LAG");
        self.lags
            .remove(&lag_index)
            .map(|_| ())
            .ok_or_else(|| MembershipError::not_found(format!("LAG {lag_index}")))
    }

    /// True if the LAG is tracked.
    pub fn contains(&self, lag_index: IfIndex) -> bool {
        self.lags.contains_key(&lag_index)
    }

    /// Snapshot accessor for a LAG entry.
    pub fn entry(&self, lag_index: IfIndex) -> Option<&LagVlanEntry> {
        self.lags.get(&lag_index)
    }

    /// Attaches a LAG to the bridge's VLAN.
    ///
    /// A no-op when already attached in the requested mode. With
    /// `via_os` the LAG is first added to the bridge in the OS mirror.
    /// Every current member port is then programmed in member order;
    /// if one fails and `rollback` is provided, ports already programmed
    /// in this call are unprogrammed and the OS-layer add is undone
    /// before the failure returns.
    pub fn attach_lag_to_vlan(
        &mut self,
        lag_index: IfIndex,
        bridge: &VlanBridge,
        mode: PortMode,
        via_os: bool,
        rollback: Option<&mut MembershipRollback>,
        services: &Services,
    ) -> MembershipResult<()> {
        let vlan_id = require_vlan(bridge)?;
        let entry = self.lags.get_mut(&lag_index).ok_or_else(|| {
            warn!(lag_index, vlan_id, "unknown LAG being added to VLAN");
            MembershipError::not_found(format!("LAG {lag_index}"))
        })?;

        if entry.is_attached(vlan_id, mode) {
            info!(lag_index, vlan_id, mode = mode.as_str(), "LAG already attached to VLAN");
            return Ok(());
        }
        let rollback_capable = rollback.is_some();

        if via_os {
            services
                .os
                .add_member(bridge.name(), &entry.lag_name, mode)
                .map_err(|e| {
                    error!(lag = %entry.lag_name, bridge = %bridge.name(), %e,
                        "failed to add LAG to bridge in OS");
                    e
                })?;
        }

        let master = MasterInfo {
            owner_kind: InterfaceKind::VlanBridge,
            port_mode: Some(mode),
            owner_index: bridge.if_index(),
        };
        match services.registry.set_master(lag_index, master) {
            Ok(t) if t.changed => {
                advise_mode_change(services.notifier.as_ref(), lag_index, t.new_mode)
            }
            Ok(_) => {}
            Err(e) => warn!(lag_index, %e, "failed to add master for VLAN member LAG"),
        }

        if let Err(e) = program_members(
            entry,
            services.driver.as_ref(),
            vlan_id,
            mode,
            true,
            rollback_capable,
        ) {
            if rollback_capable && via_os {
                if let Err(os_err) = services.os.remove_member(bridge.name(), &entry.lag_name, mode)
                {
                    error!(lag = %entry.lag_name, bridge = %bridge.name(), %os_err,
                        "failed to undo OS-layer add during rollback");
                }
            }
            return Err(e);
        }

        entry.vlan_set_mut(mode).insert(vlan_id);
        entry.vlan_enable = true;
        if let Some(rb) = rollback {
            debug!(lag_index, vlan_id, "recording LAG attach in rollback list");
            rb.lag_added.insert(lag_index, mode);
        }
        Ok(())
    }

    /// Detaches a LAG from the bridge's VLAN: symmetric unwind of
    /// [`LagVlanMap::attach_lag_to_vlan`].
    ///
    /// If the OS-layer removal fails after the hardware detach and
    /// `rollback` is provided, hardware membership is reprogrammed to
    /// restore the pre-call state.
    pub fn detach_lag_from_vlan(
        &mut self,
        lag_index: IfIndex,
        bridge: &VlanBridge,
        mode: PortMode,
        via_os: bool,
        rollback: Option<&mut MembershipRollback>,
        services: &Services,
    ) -> MembershipResult<()> {
        let vlan_id = require_vlan(bridge)?;
        let entry = self.lags.get_mut(&lag_index).ok_or_else(|| {
            warn!(lag_index, vlan_id, "unknown LAG being removed from VLAN");
            MembershipError::not_found(format!("LAG {lag_index}"))
        })?;
        let rollback_capable = rollback.is_some();

        info!(lag_index, vlan_id, mode = mode.as_str(), "detaching LAG from VLAN");
        program_members(
            entry,
            services.driver.as_ref(),
            vlan_id,
            mode,
            false,
            rollback_capable,
        )?;

        let master = MasterInfo {
            owner_kind: InterfaceKind::VlanBridge,
            port_mode: Some(mode),
            owner_index: bridge.if_index(),
        };
        match services.registry.clear_master(lag_index, master) {
            Ok(t) if t.changed => {
                advise_mode_change(services.notifier.as_ref(), lag_index, t.new_mode)
            }
            Ok(_) => {}
            Err(e) => warn!(lag_index, %e, "failed to delete master for VLAN member LAG"),
        }

        if via_os {
            if let Err(e) = services.os.remove_member(bridge.name(), &entry.lag_name, mode) {
                error!(lag = %entry.lag_name, bridge = %bridge.name(), %e,
                    "failed to delete LAG from bridge in OS");
                if rollback_capable {
                    // Restore hardware membership so the layers stay aligned.
                    if let Err(hw_err) = program_members(
                        entry,
                        services.driver.as_ref(),
                        vlan_id,
                        mode,
                        true,
                        true,
                    ) {
                        error!(lag_index, vlan_id, %hw_err,
                            "failed to restore hardware membership after OS failure");
                    }
                }
                return Err(e);
            }
        }

        entry.vlan_set_mut(mode).remove(&vlan_id);
        entry.recompute_vlan_enable();
        if let Some(rb) = rollback {
            debug!(lag_index, vlan_id, "recording LAG detach in rollback list");
            rb.lag_removed.insert(lag_index, mode);
        }
        Ok(())
    }

    /// Reconciles a LAG's tracked member ports against the current OS
    /// port set.
    ///
    /// Removals are processed before additions so a port moving between
    /// LAGs cannot transiently appear in two VLANs. Removed ports are
    /// unprogrammed from every attached VLAN before they are dropped;
    /// added ports are resolved, inserted, and programmed into every
    /// attached VLAN. Virtual ports never reach the forwarding plane.
    pub fn on_lag_membership_changed(
        &mut self,
        lag_index: IfIndex,
        new_ports: &BTreeSet<IfIndex>,
        services: &Services,
    ) -> MembershipResult<()> {
        let entry = self.lags.get_mut(&lag_index).ok_or_else(|| {
            warn!(lag_index, "membership update for unknown LAG");
            MembershipError::not_found(format!("LAG {lag_index}"))
        })?;
        info!(lag_index, "LAG received member update");

        let removed: Vec<IfIndex> = entry
            .members
            .keys()
            .filter(|&p| !new_ports.contains(p))
            .copied()
            .collect();
        for if_index in removed {
            debug!(port = if_index, lag_index, "port deleted from LAG");
            if entry.vlan_enable {
                if let Some(port) = entry.members.get(&if_index).copied() {
                    replay_all_vlans(entry, services.driver.as_ref(), &port, false);
                }
            }
            entry.members.remove(&if_index);
        }

        for if_index in new_ports {
            if entry.members.contains_key(if_index) {
                continue;
            }
            debug!(port = if_index, lag_index, "new port added to LAG");

            let info = services.registry.resolve_index(*if_index).map_err(|e| {
                error!(port = if_index, %e, "failed to resolve new LAG member port");
                e
            })?;
            if info.virtual_port {
                debug!(port = if_index, "virtual port, no forwarding-plane programming");
                continue;
            }
            let Some(hw) = info.hw_port else {
                debug!(port = if_index, "no hardware location for LAG member port");
                continue;
            };

            entry.members.insert(*if_index, hw);
            if entry.vlan_enable {
                replay_all_vlans(entry, services.driver.as_ref(), &hw, true);
            }
        }
        Ok(())
    }

    /// Detaches from the bridge's VLAN every tracked LAG that is absent
    /// from `requested`: used when a VLAN's configured LAG-member list
    /// changes wholesale.
    pub fn reconcile_against_requested(
        &mut self,
        bridge: &VlanBridge,
        requested: &BTreeSet<IfIndex>,
        mode: PortMode,
        mut rollback: Option<&mut MembershipRollback>,
        services: &Services,
    ) -> MembershipResult<()> {
        let vlan_id = require_vlan(bridge)?;
        let stale: Vec<IfIndex> = self
            .lags
            .iter()
            .filter(|&(idx, entry)| {
                entry.vlan_enable
                    && entry.vlan_set(mode).contains(&vlan_id)
                    && !requested.contains(idx)
            })
            .map(|(idx, _)| *idx)
            .collect();

        for lag_index in stale {
            info!(lag_index, vlan_id, "LAG absent from requested list, detaching from VLAN");
            self.detach_lag_from_vlan(
                lag_index,
                bridge,
                mode,
                true,
                rollback.as_deref_mut(),
                services,
            )?;
        }
        Ok(())
    }

    /// Scrubs a VLAN from every LAG entry that carries it, unprogramming
    /// member ports while the VLAN still exists in hardware.
    ///
    /// Run during bridge teardown; per-LAG hardware failures are logged
    /// and the sweep continues.
    pub fn detach_vlan_everywhere(&mut self, vlan_id: VlanId, services: &Services) {
        for entry in self.lags.values_mut() {
            if !entry.vlan_enable {
                continue;
            }
            if entry.tagged_vlans.contains(&vlan_id) {
                if let Err(e) =
                    program_members(entry, services.driver.as_ref(), vlan_id, PortMode::Tagged, false, false)
                {
                    error!(lag_index = entry.lag_index, vlan_id, %e,
                        "error detaching tagged LAG from VLAN during teardown");
                }
                entry.tagged_vlans.remove(&vlan_id);
            }
            if entry.untagged_vlans.contains(&vlan_id) {
                if let Err(e) =
                    program_members(entry, services.driver.as_ref(), vlan_id, PortMode::Untagged, false, false)
                {
                    error!(lag_index = entry.lag_index, vlan_id, %e,
                        "error detaching untagged LAG from VLAN during teardown");
                }
                entry.untagged_vlans.remove(&vlan_id);
            }
            entry.recompute_vlan_enable();
        }
    }
}

fn require_vlan(bridge: &VlanBridge) -> MembershipResult<VlanId> {
    bridge.vlan_id().ok_or_else(|| {
        MembershipError::invalid_parameter(format!("bridge {} has no VLAN id", bridge.name()))
    })
}

/// Walks the LAG's member ports and adds/removes each to/from the VLAN.
///
/// With `rollback_capable`, a member failure unprograms every port
/// already touched in this call (in apply order, best-effort) before the
/// hardware error is returned.
fn program_members(
    entry: &LagVlanEntry,
    driver: &dyn ForwardingDriver,
    vlan_id: VlanId,
    mode: PortMode,
    add: bool,
    rollback_capable: bool,
) -> MembershipResult<()> {
    let mut applied: Vec<HwPort> = Vec::new();

    for (if_index, port) in &entry.members {
        if let Err(e) = add_remove_port(driver, port, vlan_id, mode, add) {
            error!(port = if_index, lag_index = entry.lag_index, vlan_id, add, %e,
                "failure updating LAG member port in VLAN");
            if rollback_capable {
                debug!(lag_index = entry.lag_index, vlan_id, "rolling back LAG member ports");
                for p in &applied {
                    if let Err(revert_err) = add_remove_port(driver, p, vlan_id, mode, !add) {
                        error!(npu = p.npu, port = p.port, vlan_id, %revert_err,
                            "rollback failure updating LAG member port in VLAN");
                    }
                }
            }
            return Err(e);
        }
        if rollback_capable {
            applied.push(*port);
        }
    }
    Ok(())
}

/// Replays every attached VLAN of the LAG against one member port.
/// Per-VLAN failures are logged and the replay continues.
fn replay_all_vlans(entry: &LagVlanEntry, driver: &dyn ForwardingDriver, port: &HwPort, add: bool) {
    for vlan_id in &entry.tagged_vlans {
        if let Err(e) = add_remove_port(driver, port, *vlan_id, PortMode::Tagged, add) {
            error!(npu = port.npu, port = port.port, vlan_id, add, %e,
                "error replaying tagged VLAN on LAG member update");
        }
    }
    for vlan_id in &entry.untagged_vlans {
        if let Err(e) = add_remove_port(driver, port, *vlan_id, PortMode::Untagged, add) {
            error!(npu = port.npu, port = port.port, vlan_id, add, %e,
                "error replaying untagged VLAN on LAG member update");
        }
    }
}
