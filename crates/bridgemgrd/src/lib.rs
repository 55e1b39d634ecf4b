//! bridgemgrd - L2 bridge membership manager daemon
//!
//! Manages membership of interfaces (physical ports, LAGs, VLAN
//! sub-interfaces) in VLAN-backed bridge domains, keeping the OS network
//! mirror, the hardware forwarding plane, and the interface registry
//! mutually consistent under partial failure.

mod bridge;
mod driver;
mod error;
mod lag_vlan;
mod manager;
mod notify;
mod os_mirror;
mod registry;
mod services;
mod types;

pub use bridge::VlanBridge;
pub use driver::{add_remove_lag, add_remove_port, ForwardingDriver};
pub use error::{MembershipError, MembershipResult};
pub use lag_vlan::{LagVlanEntry, LagVlanMap};
pub use manager::{BridgeEvent, LagEvent, MembershipManager};
pub use notify::{advise_l2mc_cleanup, advise_mode_change, ModeNotifier};
pub use os_mirror::OsMirror;
pub use registry::InterfaceRegistry;
pub use services::Services;
pub use types::*;

// Re-export commonly used infrastructure types
pub use l2_orch_common::{SyncMap, TaskStatus};
