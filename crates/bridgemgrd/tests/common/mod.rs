//! Recording test doubles for the collaborator contracts.
//!
//! Each mock keeps a journal of the calls it received and applies the
//! change to an in-memory state snapshot, so tests can assert both the
//! call sequence and the net layer state. Failures are injected per
//! call key.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use l2_bridgemgrd::{
    ForwardingDriver, HwPort, IfIndex, InterfaceInfo, InterfaceKind, InterfaceMode,
    InterfaceRegistry, LagHandle, MasterInfo, MembershipError, MembershipManager,
    MembershipResult, ModeNotifier, ModeTransition, NpuId, OsMirror, PortMode, RegistryEntry,
    Services, VlanId,
};

// ============ Interface registry ============

#[derive(Default)]
pub struct MockRegistry {
    interfaces: Mutex<HashMap<String, InterfaceInfo>>,
    pub masters: Mutex<HashMap<IfIndex, Vec<MasterInfo>>>,
    pub registered: Mutex<HashMap<String, RegistryEntry>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interface(&self, info: InterfaceInfo) {
        self.interfaces
            .lock()
            .unwrap()
            .insert(info.name.clone(), info);
    }

    pub fn master_count(&self, if_index: IfIndex) -> usize {
        self.masters
            .lock()
            .unwrap()
            .get(&if_index)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.lock().unwrap().contains_key(name)
    }
}

impl InterfaceRegistry for MockRegistry {
    fn resolve(&self, name: &str) -> MembershipResult<InterfaceInfo> {
        self.interfaces
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| MembershipError::not_found(format!("interface {name}")))
    }

    fn resolve_index(&self, if_index: IfIndex) -> MembershipResult<InterfaceInfo> {
        self.interfaces
            .lock()
            .unwrap()
            .values()
            .find(|i| i.if_index == if_index)
            .cloned()
            .ok_or_else(|| MembershipError::not_found(format!("interface index {if_index}")))
    }

    fn register(&self, entry: &RegistryEntry) -> MembershipResult<()> {
        self.registered
            .lock()
            .unwrap()
            .insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    fn deregister(&self, name: &str) -> MembershipResult<()> {
        self.registered.lock().unwrap().remove(name);
        Ok(())
    }

    fn set_master(
        &self,
        member: IfIndex,
        master: MasterInfo,
    ) -> MembershipResult<ModeTransition> {
        let mut masters = self.masters.lock().unwrap();
        let claims = masters.entry(member).or_default();
        let was_unclaimed = claims.is_empty();
        claims.push(master);
        Ok(ModeTransition {
            changed: was_unclaimed,
            new_mode: InterfaceMode::L2,
        })
    }

    fn clear_master(
        &self,
        member: IfIndex,
        master: MasterInfo,
    ) -> MembershipResult<ModeTransition> {
        let mut masters = self.masters.lock().unwrap();
        let claims = masters.entry(member).or_default();
        if let Some(pos) = claims.iter().position(|m| *m == master) {
            claims.remove(pos);
        }
        let unclaimed = claims.is_empty();
        Ok(ModeTransition {
            changed: unclaimed,
            new_mode: if unclaimed {
                InterfaceMode::None
            } else {
                InterfaceMode::L2
            },
        })
    }
}

// ============ Forwarding driver ============

#[derive(Default)]
pub struct MockDriver {
    pub calls: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
    pub memberships: Mutex<BTreeSet<String>>,
    pub vlans: Mutex<BTreeSet<(NpuId, VlanId)>>,
}

fn port_key(port: &HwPort, vlan_id: VlanId, mode: PortMode) -> String {
    format!("port {}:{} vlan {} {}", port.npu, port.port, vlan_id, mode.as_str())
}

fn lag_key(lag: LagHandle, vlan_id: VlanId, mode: PortMode) -> String {
    format!("lag {lag:#x} vlan {vlan_id} {}", mode.as_str())
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the call with the given journal key fail.
    pub fn fail(&self, op: impl Into<String>) {
        self.fail_on.lock().unwrap().insert(op.into());
    }

    /// Clears every injected failure.
    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    fn exec(&self, op: String) -> MembershipResult<()> {
        self.calls.lock().unwrap().push(op.clone());
        if self.fail_on.lock().unwrap().contains(&op) {
            return Err(MembershipError::hardware(op, "injected failure"));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn membership_snapshot(&self) -> BTreeSet<String> {
        self.memberships.lock().unwrap().clone()
    }

    pub fn has_membership(&self, key: &str) -> bool {
        self.memberships.lock().unwrap().contains(key)
    }
}

impl ForwardingDriver for MockDriver {
    fn create_vlan(&self, npu: NpuId, vlan_id: VlanId) -> MembershipResult<()> {
        self.exec(format!("create_vlan {npu} {vlan_id}"))?;
        self.vlans.lock().unwrap().insert((npu, vlan_id));
        Ok(())
    }

    fn delete_vlan(&self, npu: NpuId, vlan_id: VlanId) -> MembershipResult<()> {
        self.exec(format!("delete_vlan {npu} {vlan_id}"))?;
        self.vlans.lock().unwrap().remove(&(npu, vlan_id));
        Ok(())
    }

    fn add_port_to_vlan(
        &self,
        port: &HwPort,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.exec(format!("add_{}", port_key(port, vlan_id, mode)))?;
        self.memberships
            .lock()
            .unwrap()
            .insert(port_key(port, vlan_id, mode));
        Ok(())
    }

    fn remove_port_from_vlan(
        &self,
        port: &HwPort,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.exec(format!("remove_{}", port_key(port, vlan_id, mode)))?;
        self.memberships
            .lock()
            .unwrap()
            .remove(&port_key(port, vlan_id, mode));
        Ok(())
    }

    fn add_lag_to_vlan(
        &self,
        lag: LagHandle,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.exec(format!("add_{}", lag_key(lag, vlan_id, mode)))?;
        self.memberships
            .lock()
            .unwrap()
            .insert(lag_key(lag, vlan_id, mode));
        Ok(())
    }

    fn remove_lag_from_vlan(
        &self,
        lag: LagHandle,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()> {
        self.exec(format!("remove_{}", lag_key(lag, vlan_id, mode)))?;
        self.memberships
            .lock()
            .unwrap()
            .remove(&lag_key(lag, vlan_id, mode));
        Ok(())
    }

    fn set_port_pvid(&self, port: &HwPort, vlan_id: VlanId) -> MembershipResult<()> {
        self.exec(format!("set_port_pvid {}:{} {}", port.npu, port.port, vlan_id))
    }

    fn set_lag_pvid(&self, lag: LagHandle, vlan_id: VlanId) -> MembershipResult<()> {
        self.exec(format!("set_lag_pvid {lag:#x} {vlan_id}"))
    }

    fn set_vlan_learning(
        &self,
        npu: NpuId,
        vlan_id: VlanId,
        disabled: bool,
    ) -> MembershipResult<()> {
        self.exec(format!("set_vlan_learning {npu} {vlan_id} {disabled}"))
    }
}

// ============ OS mirror ============

#[derive(Default)]
pub struct MockOsMirror {
    pub calls: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
    pub members: Mutex<BTreeSet<String>>,
}

fn os_key(bridge: &str, member: &str, mode: PortMode) -> String {
    format!("{bridge}/{member} {}", mode.as_str())
}

impl MockOsMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: impl Into<String>) {
        self.fail_on.lock().unwrap().insert(op.into());
    }

    fn exec(&self, op: String) -> MembershipResult<()> {
        self.calls.lock().unwrap().push(op.clone());
        if self.fail_on.lock().unwrap().contains(&op) {
            return Err(MembershipError::os_sync(op, "injected failure"));
        }
        Ok(())
    }

    pub fn members_snapshot(&self) -> BTreeSet<String> {
        self.members.lock().unwrap().clone()
    }
}

impl OsMirror for MockOsMirror {
    fn add_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()> {
        self.exec(format!("add {}", os_key(bridge, member, mode)))?;
        self.members.lock().unwrap().insert(os_key(bridge, member, mode));
        Ok(())
    }

    fn remove_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()> {
        self.exec(format!("remove {}", os_key(bridge, member, mode)))?;
        self.members.lock().unwrap().remove(&os_key(bridge, member, mode));
        Ok(())
    }
}

// ============ Mode notifier ============

#[derive(Default)]
pub struct MockNotifier {
    pub mode_changes: Mutex<Vec<(IfIndex, InterfaceMode)>>,
    pub l2mc_cleanups: Mutex<Vec<(IfIndex, VlanId)>>,
    pub reject: std::sync::atomic::AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeNotifier for MockNotifier {
    fn notify_mode_change(&self, if_index: IfIndex, new_mode: InterfaceMode) -> bool {
        self.mode_changes.lock().unwrap().push((if_index, new_mode));
        !self.reject.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn cleanup_l2_multicast(&self, if_index: IfIndex, vlan_id: VlanId) -> bool {
        self.l2mc_cleanups.lock().unwrap().push((if_index, vlan_id));
        !self.reject.load(std::sync::atomic::Ordering::SeqCst)
    }
}

// ============ Fixture ============

pub struct Fixture {
    pub registry: Arc<MockRegistry>,
    pub driver: Arc<MockDriver>,
    pub os: Arc<MockOsMirror>,
    pub notifier: Arc<MockNotifier>,
    pub manager: MembershipManager,
}

fn port(name: &str, if_index: IfIndex, npu_port: u32) -> InterfaceInfo {
    InterfaceInfo {
        name: name.to_string(),
        if_index,
        kind: InterfaceKind::PhysicalPort,
        npu: 0,
        hw_port: Some(HwPort { npu: 0, port: npu_port }),
        lag_handle: None,
        vlan_id: None,
        parent: None,
        virtual_port: false,
        vrf: None,
    }
}

fn virtual_port(name: &str, if_index: IfIndex) -> InterfaceInfo {
    InterfaceInfo {
        name: name.to_string(),
        if_index,
        kind: InterfaceKind::PhysicalPort,
        npu: 0,
        hw_port: None,
        lag_handle: None,
        vlan_id: None,
        parent: None,
        virtual_port: true,
        vrf: None,
    }
}

fn lag(name: &str, if_index: IfIndex, handle: LagHandle) -> InterfaceInfo {
    InterfaceInfo {
        name: name.to_string(),
        if_index,
        kind: InterfaceKind::Lag,
        npu: 0,
        hw_port: None,
        lag_handle: Some(handle),
        vlan_id: None,
        parent: None,
        virtual_port: false,
        vrf: None,
    }
}

fn subintf(name: &str, if_index: IfIndex, vlan_id: VlanId, parent: &str) -> InterfaceInfo {
    InterfaceInfo {
        name: name.to_string(),
        if_index,
        kind: InterfaceKind::VlanSubInterface,
        npu: 0,
        hw_port: None,
        lag_handle: None,
        vlan_id: Some(vlan_id),
        parent: Some(parent.to_string()),
        virtual_port: false,
        vrf: None,
    }
}

/// Builds a manager over recording mocks with a standard interface
/// inventory.
pub fn fixture() -> Fixture {
    let registry = Arc::new(MockRegistry::new());
    let driver = Arc::new(MockDriver::new());
    let os = Arc::new(MockOsMirror::new());
    let notifier = Arc::new(MockNotifier::new());

    registry.add_interface(port("e101-001-0", 101, 1));
    registry.add_interface(port("e101-002-0", 102, 2));
    registry.add_interface(port("e101-003-0", 103, 3));
    registry.add_interface(virtual_port("vport0", 150));
    registry.add_interface(lag("bond1", 201, 0x9001));
    registry.add_interface(lag("bond2", 202, 0x9002));
    registry.add_interface(subintf("e101-001-0.10", 301, 10, "e101-001-0"));
    registry.add_interface(subintf("e101-002-0.10", 302, 10, "e101-002-0"));
    registry.add_interface(subintf("e101-002-0.20", 303, 20, "e101-002-0"));
    registry.add_interface(subintf("bond1.10", 310, 10, "bond1"));

    let manager = MembershipManager::new(Services::new(
        registry.clone(),
        driver.clone(),
        os.clone(),
        notifier.clone(),
    ));

    Fixture {
        registry,
        driver,
        os,
        notifier,
        manager,
    }
}
