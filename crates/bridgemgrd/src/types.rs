//! Type definitions for the bridge membership manager.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// VLAN identifier (1..=4094).
pub type VlanId = u16;

/// Interface index as reported by the OS network layer.
pub type IfIndex = u32;

/// Forwarding-plane unit (switch ASIC) identifier.
pub type NpuId = u32;

/// Opaque hardware handle for a link-aggregation group object.
pub type LagHandle = u64;

/// The reserved default VLAN. Never deleted from hardware.
pub const DEFAULT_VLAN_ID: VlanId = 1;

/// Resolved hardware location of a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwPort {
    /// Forwarding-plane unit the port belongs to.
    pub npu: NpuId,
    /// Port number local to the unit.
    pub port: u32,
}

/// Whether a member carries the VLAN tag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortMode {
    /// Frames carry the VLAN tag.
    Tagged,
    /// Frames are untagged; the VLAN becomes the port's PVID.
    Untagged,
}

impl PortMode {
    /// String form used in logs and OS-layer calls.
    pub fn as_str(&self) -> &'static str {
        match self {
            PortMode::Tagged => "tagged",
            PortMode::Untagged => "untagged",
        }
    }
}

impl FromStr for PortMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tagged" => Ok(PortMode::Tagged),
            "untagged" => Ok(PortMode::Untagged),
            _ => Err(()),
        }
    }
}

/// Kind of an interface as recorded in the interface registry.
///
/// Resolved once per operation via [`crate::registry::InterfaceRegistry`];
/// the membership paths dispatch on this instead of re-inspecting the
/// interface at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// A front-panel physical port.
    PhysicalPort,
    /// A link-aggregation group.
    Lag,
    /// A VLAN sub-interface carrying a tag on a port or LAG.
    VlanSubInterface,
    /// A VLAN-backed bridge domain interface.
    VlanBridge,
    /// Any other interface kind; never a bridge member.
    Other,
}

/// Forwarding ownership mode of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceMode {
    /// No subsystem owns the interface's forwarding behavior.
    None,
    /// Bridged: the L2 subsystem owns forwarding.
    L2,
    /// Routed / standalone.
    L3,
}

/// Externally visible kind of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeSubType {
    /// VLAN-backed (802.1Q) bridge domain.
    Vlan,
    /// Port-based (802.1D) bridge.
    Dot1d,
}

/// Registry view of an interface, returned by `resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// OS-visible interface name.
    pub name: String,
    /// OS interface index.
    pub if_index: IfIndex,
    /// Interface kind.
    pub kind: InterfaceKind,
    /// Forwarding-plane unit hosting the interface.
    pub npu: NpuId,
    /// Hardware port handle; `None` for virtual ports and non-port kinds.
    pub hw_port: Option<HwPort>,
    /// Hardware LAG object; set for `Lag` interfaces.
    pub lag_handle: Option<LagHandle>,
    /// VLAN id carried by a `VlanSubInterface`.
    pub vlan_id: Option<VlanId>,
    /// Backing interface of a `VlanSubInterface`.
    pub parent: Option<String>,
    /// True for software-only ports with no forwarding-plane presence.
    pub virtual_port: bool,
    /// VRF the interface is bound to, if any.
    pub vrf: Option<String>,
}

/// Registration record for an interface this core owns (bridge domains).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub if_index: IfIndex,
    pub kind: InterfaceKind,
    pub vlan_id: Option<VlanId>,
    pub sub_type: BridgeSubType,
}

/// A mode-master claim recorded against a member interface.
///
/// Adding a claim pushes the member's mode toward L2-bridged; removing
/// it pulls the mode back when no other master claims the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MasterInfo {
    /// Kind of the owning interface (bridge or LAG).
    pub owner_kind: InterfaceKind,
    /// Mode the member participates with, when applicable.
    pub port_mode: Option<PortMode>,
    /// Interface index of the owner.
    pub owner_index: IfIndex,
}

/// Outcome of a master set/clear call on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    /// True if the member's effective mode changed.
    pub changed: bool,
    /// The member's mode after the call.
    pub new_mode: InterfaceMode,
}

/// Rollback record for a compound VLAN configuration operation.
///
/// Owned by the operation's call frame and never persisted. Records
/// which LAG attachments and detachments succeeded so an enclosing
/// operation can replay the opposite calls on failure.
#[derive(Debug, Clone, Default)]
pub struct MembershipRollback {
    /// LAGs attached during the operation, with the mode used.
    pub lag_added: HashMap<IfIndex, PortMode>,
    /// LAGs detached during the operation, with the mode used.
    pub lag_removed: HashMap<IfIndex, PortMode>,
}

impl MembershipRollback {
    /// Creates an empty rollback record.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.lag_added.is_empty() && self.lag_removed.is_empty()
    }
}
