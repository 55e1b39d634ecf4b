//! VLAN-backed bridge domain entity.
//!
//! A `VlanBridge` owns the member sets of one bridge domain and drives
//! the OS mirror, the forwarding driver, and the interface registry
//! through every membership change. The layers are touched in a fixed
//! order (OS first, then registry bookkeeping, then hardware) and any
//! layer already mutated is reverted best-effort when a later step
//! fails.
//!
//! The hardware VLAN is created lazily: a bridge may exist, and collect
//! untagged members, before any VLAN id is known. The first tagged
//! sub-interface attach assigns the VLAN id, creates the VLAN in
//! hardware, and replays all pending untagged members into it.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::driver::{add_remove_lag, add_remove_port};
use crate::error::{MembershipError, MembershipResult};
use crate::notify::{advise_l2mc_cleanup, advise_mode_change};
use crate::os_mirror;
use crate::services::Services;
use crate::types::{
    BridgeSubType, HwPort, IfIndex, InterfaceKind, InterfaceMode, MasterInfo, NpuId, PortMode,
    RegistryEntry, VlanId, DEFAULT_VLAN_ID,
};

/// One VLAN-backed bridge domain.
#[derive(Debug, Clone)]
pub struct VlanBridge {
    name: String,
    if_index: IfIndex,
    npu: NpuId,
    /// `None` until the first tagged attach (or explicit create) assigns
    /// a VLAN id; `None` again only on full deletion.
    vlan_id: Option<VlanId>,
    tagged_members: BTreeSet<String>,
    untagged_members: BTreeSet<String>,
    learning_disabled: bool,
    sub_type: BridgeSubType,
}

impl VlanBridge {
    /// Creates a bridge with no VLAN id assigned yet.
    pub fn new(name: impl Into<String>, if_index: IfIndex, npu: NpuId, sub_type: BridgeSubType) -> Self {
        Self {
            name: name.into(),
            if_index,
            npu,
            vlan_id: None,
            tagged_members: BTreeSet::new(),
            untagged_members: BTreeSet::new(),
            learning_disabled: false,
            sub_type,
        }
    }

    /// Creates a bridge with an explicit VLAN id.
    pub fn with_vlan(
        name: impl Into<String>,
        if_index: IfIndex,
        npu: NpuId,
        sub_type: BridgeSubType,
        vlan_id: VlanId,
    ) -> Self {
        let mut bridge = Self::new(name, if_index, npu, sub_type);
        bridge.vlan_id = Some(vlan_id);
        bridge
    }

    /// The bridge's OS-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bridge's interface index.
    pub fn if_index(&self) -> IfIndex {
        self.if_index
    }

    /// The assigned VLAN id, if any.
    pub fn vlan_id(&self) -> Option<VlanId> {
        self.vlan_id
    }

    /// True if MAC learning is disabled on the bridge's VLAN.
    pub fn learning_disabled(&self) -> bool {
        self.learning_disabled
    }

    /// The tagged member set (sub-interface names).
    pub fn tagged_members(&self) -> &BTreeSet<String> {
        &self.tagged_members
    }

    /// The untagged member set (port and LAG names).
    pub fn untagged_members(&self) -> &BTreeSet<String> {
        &self.untagged_members
    }

    /// True if `member` is in either member set.
    pub fn is_member(&self, member: &str) -> bool {
        self.tagged_members.contains(member) || self.untagged_members.contains(member)
    }

    /// Total member count across both sets.
    pub fn member_count(&self) -> usize {
        self.tagged_members.len() + self.untagged_members.len()
    }

    /// Creates the bridge's VLAN in the forwarding plane.
    ///
    /// A no-op while no VLAN id is assigned: the VLAN is created when the
    /// first tagged member arrives. On success the bridge is registered
    /// with the interface registry and an advisory mode notification is
    /// sent for the bridge's own index. A hardware failure skips the
    /// registry step.
    pub fn create_hw_vlan(&self, services: &Services) -> MembershipResult<()> {
        let Some(vlan_id) = self.vlan_id else {
            debug!(bridge = %self.name, "no VLAN id associated with the bridge yet");
            return Ok(());
        };

        info!(bridge = %self.name, vlan_id, npu = self.npu, "creating VLAN in the forwarding plane");
        services.driver.create_vlan(self.npu, vlan_id).map_err(|e| {
            error!(bridge = %self.name, vlan_id, npu = self.npu, %e, "failed to create VLAN");
            e
        })?;
        if self.learning_disabled {
            services.driver.set_vlan_learning(self.npu, vlan_id, true)?;
        }

        services
            .registry
            .register(&RegistryEntry {
                name: self.name.clone(),
                if_index: self.if_index,
                kind: InterfaceKind::VlanBridge,
                vlan_id: Some(vlan_id),
                sub_type: self.sub_type,
            })
            .map_err(|e| {
                error!(bridge = %self.name, vlan_id, %e, "failed to register VLAN bridge");
                e
            })?;

        advise_mode_change(services.notifier.as_ref(), self.if_index, InterfaceMode::None);
        Ok(())
    }

    /// Deletes the bridge's VLAN from the forwarding plane.
    ///
    /// A no-op while no VLAN id is assigned and for the reserved default
    /// VLAN. On hardware failure the registry deregistration and the
    /// VLAN id reset are skipped so a retried delete remains safe.
    pub fn delete_hw_vlan(&mut self, services: &Services) -> MembershipResult<()> {
        let Some(vlan_id) = self.vlan_id else {
            return Ok(());
        };
        if vlan_id == DEFAULT_VLAN_ID {
            debug!(bridge = %self.name, "reserved default VLAN is never deleted from hardware");
            return Ok(());
        }

        services.driver.delete_vlan(self.npu, vlan_id).map_err(|e| {
            error!(bridge = %self.name, vlan_id, %e, "failed to delete VLAN");
            e
        })?;
        services.registry.deregister(&self.name).map_err(|e| {
            error!(bridge = %self.name, vlan_id, %e, "failed to deregister VLAN bridge");
            e
        })?;
        self.vlan_id = None;
        Ok(())
    }

    /// Programs every currently-known untagged member into the bridge's
    /// VLAN.
    ///
    /// Run after the VLAN id is assigned: untagged members accepted
    /// while the bridge had no VLAN were held in the member set only.
    pub fn program_untagged_members(&self, services: &Services) -> MembershipResult<()> {
        let Some(vlan_id) = self.vlan_id else {
            return Err(MembershipError::invalid_parameter(format!(
                "bridge {} has no VLAN id",
                self.name
            )));
        };

        for member in &self.untagged_members {
            let info = services.registry.resolve(member).map_err(|e| {
                error!(bridge = %self.name, member = %member, %e, "failed to resolve untagged member");
                e
            })?;

            let master = MasterInfo {
                owner_kind: InterfaceKind::VlanBridge,
                port_mode: Some(PortMode::Untagged),
                owner_index: self.if_index,
            };
            match services.registry.set_master(info.if_index, master) {
                Ok(t) if t.changed => {
                    advise_mode_change(services.notifier.as_ref(), info.if_index, t.new_mode)
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(bridge = %self.name, member = %member, %e, "failed to add master for untagged member");
                }
            }

            match info.kind {
                InterfaceKind::Lag => {
                    let lag = require_lag_handle(&info)?;
                    add_remove_lag(services.driver.as_ref(), lag, vlan_id, PortMode::Untagged, true)?;
                }
                InterfaceKind::PhysicalPort if !info.virtual_port => {
                    let port = require_hw_port(&info)?;
                    add_remove_port(services.driver.as_ref(), &port, vlan_id, PortMode::Untagged, true)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Adds or removes a single member, hardware and registry layers
    /// only (the OS mirror is the caller's concern, see
    /// [`VlanBridge::add_or_remove_member_with_os`]).
    ///
    /// A tagged sub-interface resolves to its backing port/LAG and its
    /// VLAN id; the first tagged attach assigns the bridge's VLAN id and
    /// replays pending untagged members. An untagged member on a bridge
    /// with no VLAN id is accepted and deferred. The member set is
    /// updated only after every mandatory step succeeded.
    pub fn add_or_remove_member(
        &mut self,
        member_name: &str,
        kind: InterfaceKind,
        add: bool,
        services: &Services,
    ) -> MembershipResult<()> {
        let (target_name, port_mode, vlan_id) = match kind {
            InterfaceKind::VlanSubInterface => {
                let sub = services.registry.resolve(member_name)?;
                let member_vlan = sub.vlan_id.ok_or_else(|| {
                    MembershipError::invalid_parameter(format!(
                        "VLAN sub-interface {member_name} carries no VLAN id"
                    ))
                })?;
                let parent = sub.parent.ok_or_else(|| {
                    MembershipError::invalid_parameter(format!(
                        "VLAN sub-interface {member_name} has no backing interface"
                    ))
                })?;

                let vlan_id = match self.vlan_id {
                    None if !add => {
                        // Nothing was ever programmed for this bridge.
                        self.tagged_members.remove(member_name);
                        return Ok(());
                    }
                    None => {
                        // First tagged attach assigns the bridge's VLAN.
                        self.vlan_id = Some(member_vlan);
                        self.create_hw_vlan(services).map_err(|e| {
                            error!(bridge = %self.name, vlan_id = member_vlan, %e,
                                "failed to create VLAN for first tagged member");
                            e
                        })?;
                        self.program_untagged_members(services).map_err(|e| {
                            error!(bridge = %self.name, vlan_id = member_vlan, %e,
                                "failed to program pending untagged members");
                            e
                        })?;
                        member_vlan
                    }
                    Some(bridge_vlan) if bridge_vlan != member_vlan => {
                        warn!(bridge = %self.name, member = member_name, bridge_vlan, member_vlan,
                            "member rejected, a bridge may back only one VLAN id");
                        return Err(MembershipError::VlanMismatch {
                            bridge: self.name.clone(),
                            bridge_vlan,
                            member_vlan,
                        });
                    }
                    Some(bridge_vlan) => bridge_vlan,
                };
                (parent, PortMode::Tagged, vlan_id)
            }
            InterfaceKind::PhysicalPort | InterfaceKind::Lag => match self.vlan_id {
                None => {
                    // Accepted but deferred: programmed once a VLAN id is
                    // assigned via the first tagged attach.
                    debug!(bridge = %self.name, member = member_name, add,
                        "bridge has no VLAN id, membership change deferred");
                    if add {
                        self.untagged_members.insert(member_name.to_string());
                    } else {
                        self.untagged_members.remove(member_name);
                    }
                    return Ok(());
                }
                Some(v) => (member_name.to_string(), PortMode::Untagged, v),
            },
            InterfaceKind::VlanBridge | InterfaceKind::Other => {
                return Err(MembershipError::invalid_parameter(format!(
                    "interface {member_name} of kind {kind:?} cannot be a bridge member"
                )));
            }
        };

        let info = services.registry.resolve(&target_name)?;

        let master = MasterInfo {
            owner_kind: InterfaceKind::VlanBridge,
            port_mode: Some(port_mode),
            owner_index: self.if_index,
        };
        let transition = if add {
            match services.registry.set_master(info.if_index, master) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(bridge = %self.name, member = %target_name, %e,
                        "failed to add master for member");
                    None
                }
            }
        } else {
            let t = match services.registry.clear_master(info.if_index, master) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(bridge = %self.name, member = %target_name, %e,
                        "failed to delete master for member");
                    None
                }
            };
            advise_l2mc_cleanup(services.notifier.as_ref(), info.if_index, vlan_id);
            t
        };
        if let Some(t) = transition {
            if t.changed {
                advise_mode_change(services.notifier.as_ref(), info.if_index, t.new_mode);
            }
        }

        match info.kind {
            InterfaceKind::Lag => {
                let lag = require_lag_handle(&info)?;
                add_remove_lag(services.driver.as_ref(), lag, vlan_id, port_mode, add).map_err(
                    |e| {
                        error!(bridge = %self.name, member = %target_name, vlan_id, add, %e,
                            "failed to update LAG membership in the forwarding plane");
                        e
                    },
                )?;
            }
            InterfaceKind::PhysicalPort if !info.virtual_port => {
                let port = require_hw_port(&info)?;
                add_remove_port(services.driver.as_ref(), &port, vlan_id, port_mode, add).map_err(
                    |e| {
                        error!(bridge = %self.name, member = %target_name, vlan_id, add, %e,
                            "failed to update port membership in the forwarding plane");
                        e
                    },
                )?;
            }
            _ => {}
        }

        self.update_member_set(member_name, port_mode, add);
        Ok(())
    }

    /// Caller-facing single-member operation: OS mirror first, then
    /// hardware and registry. If the latter fails, the OS-layer change
    /// is reverted before the error is returned.
    pub fn add_or_remove_member_with_os(
        &mut self,
        member_name: &str,
        port_mode: PortMode,
        add: bool,
        services: &Services,
    ) -> MembershipResult<()> {
        os_mirror::add_or_remove(services.os.as_ref(), &self.name, member_name, port_mode, add)?;

        let kind = if port_mode == PortMode::Tagged {
            InterfaceKind::VlanSubInterface
        } else {
            match services.registry.resolve(member_name) {
                Ok(info) => info.kind,
                Err(e) => {
                    warn!(bridge = %self.name, member = member_name, %e,
                        "failed to resolve member type");
                    self.revert_os_change(member_name, port_mode, add, services);
                    return Err(e);
                }
            }
        };

        if let Err(e) = self.add_or_remove_member(member_name, kind, add, services) {
            error!(bridge = %self.name, member = member_name, add, %e,
                "membership update failed, reverting OS-layer change");
            self.revert_os_change(member_name, port_mode, add, services);
            return Err(e);
        }
        Ok(())
    }

    /// Batch membership change, applied in order and stopped at the
    /// first failure. Already-processed members are rolled back by
    /// replaying the opposite operation; rollback failures are logged
    /// and do not abort the unwind. Returns the original failure.
    pub fn add_or_remove_member_list(
        &mut self,
        members: &[String],
        port_mode: PortMode,
        add: bool,
        services: &Services,
    ) -> MembershipResult<()> {
        let mut processed: Vec<&String> = Vec::new();
        let mut failure = None;
        for member in members {
            if let Err(e) = self.add_or_remove_member_with_os(member, port_mode, add, services) {
                failure = Some(e);
                break;
            }
            processed.push(member);
        }

        let Some(err) = failure else {
            return Ok(());
        };

        for member in processed {
            if let Err(revert_err) =
                self.add_or_remove_member_with_os(member, port_mode, !add, services)
            {
                error!(bridge = %self.name, member = %member, %revert_err,
                    "failed to roll back member update");
            }
        }
        Err(err)
    }

    /// Hardware-only membership call for a port whose hardware handle
    /// arrived out of band. Member-set bookkeeping stays with the
    /// caller.
    pub fn associate_hw_port(
        &self,
        member_name: &str,
        port: &HwPort,
        port_mode: PortMode,
        associate: bool,
        services: &Services,
    ) -> MembershipResult<()> {
        let Some(vlan_id) = self.vlan_id else {
            return Err(MembershipError::invalid_parameter(format!(
                "bridge {} has no VLAN id",
                self.name
            )));
        };
        debug!(bridge = %self.name, member = member_name, vlan_id, associate,
            "hardware port association");
        add_remove_port(services.driver.as_ref(), port, vlan_id, port_mode, associate)
    }

    /// Mirrors the learning-disable flag into hardware. Cached until the
    /// hardware VLAN exists; applied by [`VlanBridge::create_hw_vlan`].
    pub fn set_learning_disable(
        &mut self,
        disable: bool,
        services: &Services,
    ) -> MembershipResult<()> {
        if let Some(vlan_id) = self.vlan_id {
            services
                .driver
                .set_vlan_learning(self.npu, vlan_id, disable)
                .map_err(|e| {
                    error!(bridge = %self.name, vlan_id, disable, %e,
                        "failed to set learning state");
                    e
                })?;
        } else {
            debug!(bridge = %self.name, disable, "learning state cached until the hardware VLAN exists");
        }
        self.learning_disabled = disable;
        Ok(())
    }

    fn update_member_set(&mut self, member_name: &str, port_mode: PortMode, add: bool) {
        let set = match port_mode {
            PortMode::Tagged => &mut self.tagged_members,
            PortMode::Untagged => &mut self.untagged_members,
        };
        if add {
            set.insert(member_name.to_string());
        } else {
            set.remove(member_name);
        }
    }

    fn revert_os_change(&self, member_name: &str, port_mode: PortMode, add: bool, services: &Services) {
        if let Err(revert_err) =
            os_mirror::add_or_remove(services.os.as_ref(), &self.name, member_name, port_mode, !add)
        {
            error!(bridge = %self.name, member = member_name, %revert_err,
                "failed to revert OS-layer membership change");
        }
    }
}

fn require_lag_handle(info: &crate::types::InterfaceInfo) -> MembershipResult<crate::types::LagHandle> {
    info.lag_handle.ok_or_else(|| {
        MembershipError::invalid_parameter(format!("LAG {} has no hardware handle", info.name))
    })
}

fn require_hw_port(info: &crate::types::InterfaceInfo) -> MembershipResult<HwPort> {
    info.hw_port.ok_or_else(|| {
        MembershipError::invalid_parameter(format!("port {} has no hardware location", info.name))
    })
}
